//! qhost-gw library - dual-grammar query gateway
//!
//! Serves native GraphQL-style requests and legacy REST-style series
//! requests from the same `/graphql` endpoint.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod backend;
pub mod dispatch;
pub mod error;
pub mod native;

use backend::DataBackend;
use dispatch::bridge::ExecutionBridge;
use dispatch::translate::RoutingTags;
use dispatch::Dispatcher;
use native::NativeEngine;

/// Default request body limit
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub max_body_bytes: usize,
}

impl AppState {
    /// Create new application state
    pub fn new(
        backend: Arc<dyn DataBackend>,
        engine: Arc<dyn NativeEngine>,
        tags: RoutingTags,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(ExecutionBridge::new(backend, engine, tags)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{any, get};

    let max_body_bytes = state.max_body_bytes;

    Router::new()
        .route("/graphql", any(api::graphql_handler))
        .route("/", get(api::hello))
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
