//! Index greeting

/// GET /
pub async fn hello() -> &'static str {
    "Hello, world. You're at the qhost index."
}
