//! HTTP API handlers for qhost-gw

pub mod graphql;
pub mod health;
pub mod hello;

pub use graphql::graphql_handler;
pub use health::health_routes;
pub use hello::hello;
