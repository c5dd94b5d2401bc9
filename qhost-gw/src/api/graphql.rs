//! `/graphql` endpoint
//!
//! Accepts any method so the dispatcher can answer disallowed ones with
//! its own error envelope.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, Uri},
};
use tracing::warn;

use crate::dispatch::{GatewayResponse, IncomingRequest};
use crate::AppState;

/// ANY /graphql
pub async fn graphql_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> GatewayResponse {
    let params = match Query::<Vec<(String, String)>>::try_from_uri(&uri) {
        Ok(Query(params)) => params,
        Err(e) => {
            warn!("Ignoring malformed query string: {}", e);
            Vec::new()
        }
    };

    let request = IncomingRequest::new(method, String::from_utf8_lossy(&body), params);
    state.dispatcher.handle(request).await
}
