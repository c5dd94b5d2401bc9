//! Dual-grammar request dispatcher
//!
//! Every `/graphql` request first goes through the legacy pipeline:
//!
//! ```text
//! method guard -> extract -> classify -> bridge -> reconcile
//! ```
//!
//! A successful legacy execution answers the request directly. Anything
//! else is rebuilt into an [`OutboundRequest`] and handed to the native
//! engine's own dispatch, so clients of the native grammar only ever see
//! native error messages.

use axum::body::{Body, Bytes};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use tracing::{debug, info};

pub mod bridge;
pub mod classify;
pub mod extract;
pub mod reconcile;
pub mod translate;

use crate::native;
use bridge::ExecutionBridge;
use reconcile::Reconciled;

/// Content type of every JSON response
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Last value of a parameter in an ordered multi-map
fn last_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .rev()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// An inbound HTTP request, as seen by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRequest {
    pub method: Method,
    pub body: String,
    /// URL parameters in arrival order, duplicates permitted
    pub params: Vec<(String, String)>,
}

impl IncomingRequest {
    pub fn new(method: Method, body: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            method,
            body: body.into(),
            params,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        last_param(&self.params, name)
    }
}

/// The request handed to the native engine after legacy recovery failed
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub body: String,
    pub params: Vec<(String, String)>,
}

impl OutboundRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        last_param(&self.params, name)
    }
}

impl From<IncomingRequest> for OutboundRequest {
    fn from(request: IncomingRequest) -> Self {
        Self {
            method: request.method,
            body: request.body,
            params: request.params,
        }
    }
}

/// Final HTTP outcome of a dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    /// `Allow` header value, set on 405 responses
    pub allow: Option<&'static str>,
    pub body: Bytes,
}

impl GatewayResponse {
    pub fn bytes(status: StatusCode, content_type: &'static str, body: Bytes) -> Self {
        Self {
            status,
            content_type,
            allow: None,
            body,
        }
    }

    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self::bytes(status, JSON_CONTENT_TYPE, Bytes::from(value.to_string()))
    }

    /// `{"errors": [{"message": ...}, ...]}`
    pub fn errors(status: StatusCode, messages: impl IntoIterator<Item = String>) -> Self {
        let errors: Vec<Value> = messages
            .into_iter()
            .map(|message| json!({ "message": message }))
            .collect();
        Self::json(status, &json!({ "errors": errors }))
    }

    /// Body parsed as JSON, for inspection
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl IntoResponse for GatewayResponse {
    fn into_response(self) -> Response {
        let mut builder = Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, self.content_type);
        if let Some(allow) = self.allow {
            builder = builder.header(header::ALLOW, allow);
        }
        match builder.body(Body::from(self.body)) {
            Ok(response) => response,
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Entry point for `/graphql`
#[derive(Clone)]
pub struct Dispatcher {
    bridge: ExecutionBridge,
}

impl Dispatcher {
    pub fn new(bridge: ExecutionBridge) -> Self {
        Self { bridge }
    }

    /// Answer a request through the legacy pipeline or the native fallback
    pub async fn handle(&self, request: IncomingRequest) -> GatewayResponse {
        if let Err(e) = reconcile::guard_method(&request.method) {
            debug!("Rejecting request: {}", e);
            return reconcile::method_not_allowed(&request.method);
        }

        let extraction = extract::extract(&request);
        debug!(
            source = ?extraction.candidate.as_ref().map(|c| c.source),
            clear_params = extraction.clear_params,
            "Extracted candidate query"
        );

        let classified = classify::classify(extraction.candidate.as_ref());
        let outcome = self.bridge.execute(&classified).await;

        match reconcile::reconcile(
            outcome,
            &request,
            extraction.clear_params,
            classified.trailing_text(),
        ) {
            Reconciled::Respond(response) => {
                info!("Answered legacy request ({} bytes)", response.body.len());
                response
            }
            Reconciled::Fallback(outbound) => {
                debug!("Falling back to native dispatch");
                native::dispatch(&self.bridge, &outbound).await
            }
        }
    }
}
