//! Native query engine seam
//!
//! [`dispatch`] is the engine's own request handling: it reads the GraphQL
//! envelope from an [`OutboundRequest`], executes it through the execution
//! bridge, and formats the result or errors. The legacy dispatcher hands
//! every request it cannot answer itself to this function.

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::{json, Map, Value};

use crate::dispatch::bridge::{ExecutionBridge, ExecutionOutcome};
use crate::dispatch::classify::ClassifiedQuery;
use crate::dispatch::{GatewayResponse, OutboundRequest};
use crate::error::DispatchError;

pub mod schema;

pub use schema::StaticSchema;

/// A parsed native request
#[derive(Debug, Clone, PartialEq)]
pub struct NativeContext {
    pub query: String,
    pub variables: Option<Map<String, Value>>,
    pub operation_name: Option<String>,
}

/// Result of a native execution
#[derive(Debug, Clone, PartialEq)]
pub struct NativeResult {
    pub data: Option<Value>,
    pub errors: Vec<Value>,
    /// Request was rejected before execution (syntax, validation)
    pub invalid: bool,
}

impl NativeResult {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            invalid: false,
        }
    }

    pub fn invalid(messages: impl IntoIterator<Item = String>) -> Self {
        Self {
            data: None,
            errors: messages
                .into_iter()
                .map(|message| json!({ "message": message }))
                .collect(),
            invalid: true,
        }
    }

    /// Response body: `data` and/or `errors`, omitting whichever is empty
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        if let Some(data) = &self.data {
            body.insert("data".to_string(), data.clone());
        }
        if !self.errors.is_empty() {
            body.insert("errors".to_string(), Value::Array(self.errors.clone()));
        }
        Value::Object(body)
    }
}

/// Native query execution
#[async_trait]
pub trait NativeEngine: Send + Sync {
    async fn execute(&self, context: &NativeContext) -> NativeResult;
}

/// Read `query`, `variables` and `operationName` from a request
///
/// URL parameters take precedence over body fields. Only POST bodies are
/// read; they must be JSON objects.
pub fn parse_envelope(request: &OutboundRequest) -> Result<NativeContext, NativeResult> {
    let body = if request.method == Method::POST && !request.body.trim().is_empty() {
        match serde_json::from_str::<Value>(&request.body) {
            Ok(Value::Object(map)) => map,
            _ => return Err(NativeResult::invalid(["POST body sent invalid JSON.".to_string()])),
        }
    } else {
        Map::new()
    };

    let field = |name: &str| -> Option<Value> {
        request
            .param(name)
            .filter(|v| !v.is_empty())
            .map(|v| Value::String(v.to_string()))
            .or_else(|| body.get(name).cloned())
            .filter(|v| !v.is_null())
    };

    let query = match field("query") {
        Some(Value::String(q)) if !q.is_empty() => q,
        _ => return Err(NativeResult::invalid(["Must provide query string.".to_string()])),
    };

    let variables = match field("variables") {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Some(map),
            Ok(Value::Null) => None,
            _ => return Err(NativeResult::invalid(["Variables are invalid JSON.".to_string()])),
        },
        Some(_) => return Err(NativeResult::invalid(["Variables are invalid JSON.".to_string()])),
    };

    let operation_name = match field("operationName") {
        Some(Value::String(name)) if !name.is_empty() => Some(name),
        _ => None,
    };

    Ok(NativeContext {
        query,
        variables,
        operation_name,
    })
}

/// Native request handling: envelope parsing, execution, error formatting
pub async fn dispatch(bridge: &ExecutionBridge, request: &OutboundRequest) -> GatewayResponse {
    let context = match parse_envelope(request) {
        Ok(context) => context,
        Err(result) => return GatewayResponse::json(StatusCode::BAD_REQUEST, &result.to_body()),
    };

    match bridge.execute(&ClassifiedQuery::NativeGrammarText(context)).await {
        ExecutionOutcome::Success {
            payload,
            content_kind,
        } => GatewayResponse::bytes(StatusCode::OK, content_kind, payload),
        ExecutionOutcome::Invalid(DispatchError::NativeEngineError { errors }) => {
            GatewayResponse::json(StatusCode::BAD_REQUEST, &json!({ "errors": errors }))
        }
        ExecutionOutcome::Invalid(other) => GatewayResponse::errors(
            StatusCode::INTERNAL_SERVER_ERROR,
            [other.to_string()],
        ),
    }
}
