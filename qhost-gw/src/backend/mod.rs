//! Data backend seam
//!
//! The dispatcher only ever talks to the data store through [`DataBackend`]:
//! one credential check and one series fetch per request. Implementations
//! must be safe to share between concurrent requests.

use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;

pub mod local;

pub use local::LocalDataBackend;

/// A fully translated series request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesRequest {
    pub symbol: String,
    /// Bucket width in seconds
    pub period_secs: u64,
    pub start: String,
    pub end: String,
    /// Data source tag
    pub source: String,
    /// Client interface dialect tag
    pub interface: String,
}

/// Backend failures
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend call timed out after {0} ms")]
    Timeout(u64),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Unsupported interface: {0}")]
    UnsupportedInterface(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Malformed data: {0}")]
    Format(String),

    #[error("Backend panicked")]
    Panicked,
}

/// Credential check and series assembly
#[async_trait]
pub trait DataBackend: Send + Sync {
    /// Check an API key for the given source and interface
    async fn validate_credential(
        &self,
        key: &str,
        source: &str,
        interface: &str,
    ) -> Result<bool, BackendError>;

    /// Assemble a series in the interface's dialect
    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Bytes, BackendError>;
}
