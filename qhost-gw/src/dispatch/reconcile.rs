//! Response reconciliation
//!
//! Turns an [`ExecutionOutcome`] into either a final response or the
//! request the native engine should see instead. The inbound request is
//! never modified; the outbound one is built from it.

use std::borrow::Cow;

use axum::http::{Method, StatusCode};
use once_cell::sync::Lazy;
use regex::Regex;

use super::bridge::ExecutionOutcome;
use super::{GatewayResponse, IncomingRequest, OutboundRequest};
use crate::error::{DispatchError, Result};

/// First character of a trailing native fragment
pub const CONTINUATION_MARKER: char = '#';

/// Methods the endpoint accepts
pub const ALLOWED_METHODS: &str = "GET, POST";

/// `"query":"` up to the first marker, plus one separator character
///
/// Anchored on the `query` key so earlier string fields such as
/// `variables` or `operationName` are left alone. Still assumes the marker
/// never occurs inside the query text itself; a body like
/// `{"query": "{ a } # note"}` would be cut as well.
static MARKER_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""query"\s*:\s*".*?#[^"]?"#).expect("marker pattern is valid")
});

/// Dispatch decision
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Final response; native processing does not run
    Respond(GatewayResponse),
    /// Hand this request to the native engine
    Fallback(OutboundRequest),
}

pub fn guard_method(method: &Method) -> Result<()> {
    if method == Method::GET || method == Method::POST {
        Ok(())
    } else {
        Err(DispatchError::MethodNotAllowed(method.to_string()))
    }
}

/// 405 with a single-element error list
pub fn method_not_allowed(method: &Method) -> GatewayResponse {
    let mut response = GatewayResponse::errors(
        StatusCode::METHOD_NOT_ALLOWED,
        [DispatchError::MethodNotAllowed(method.to_string()).to_string()],
    );
    response.allow = Some(ALLOWED_METHODS);
    response
}

pub fn reconcile(
    outcome: ExecutionOutcome,
    request: &IncomingRequest,
    clear_params: bool,
    trailing: &str,
) -> Reconciled {
    match outcome {
        ExecutionOutcome::Success {
            payload,
            content_kind,
        } => Reconciled::Respond(GatewayResponse::bytes(StatusCode::OK, content_kind, payload)),
        ExecutionOutcome::Invalid(_) => {
            Reconciled::Fallback(build_outbound(request, clear_params, trailing))
        }
    }
}

/// Native fragment carried after the legacy map, if any
///
/// The marker and the single separator character after it are dropped.
pub fn continuation_fragment(trailing: &str) -> Option<&str> {
    let rest = trailing.strip_prefix(CONTINUATION_MARKER)?;
    let mut chars = rest.chars();
    chars.next();
    Some(chars.as_str())
}

/// Remove every `"query":"...#` legacy prefix from a JSON body
pub fn strip_marker_suffix(body: &str) -> Cow<'_, str> {
    MARKER_SUFFIX.replace_all(body, r#""query":""#)
}

/// The request the native engine sees after a failed legacy attempt
pub fn build_outbound(
    request: &IncomingRequest,
    clear_params: bool,
    trailing: &str,
) -> OutboundRequest {
    let mut params = if clear_params {
        Vec::new()
    } else {
        request.params.clone()
    };
    let mut body = request.body.clone();

    if let Some(fragment) = continuation_fragment(trailing) {
        body = strip_marker_suffix(&request.body).into_owned();
        replace_param(&mut params, "query", fragment);
    }

    OutboundRequest {
        method: request.method.clone(),
        body,
        params,
    }
}

/// Set an existing parameter to one value, keeping its first position
fn replace_param(params: &mut Vec<(String, String)>, name: &str, value: &str) {
    let Some(first) = params.iter().position(|(key, _)| key == name) else {
        return;
    };
    params[first].1 = value.to_string();

    let mut idx = 0;
    params.retain(|(key, _)| {
        let keep = idx <= first || key != name;
        idx += 1;
        keep
    });
}
