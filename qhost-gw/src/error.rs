//! Error types for qhost-gw
//!
//! `DispatchError` is the failure taxonomy of the request dispatcher. Apart
//! from `MethodNotAllowed`, every variant is recovered inside the dispatcher
//! and ends in the native fallback rather than reaching the client.

use thiserror::Error;

use crate::backend::BackendError;

/// Dispatcher failure taxonomy
#[derive(Error, Debug)]
pub enum DispatchError {
    /// HTTP method other than GET or POST
    #[error("{0} not allowed")]
    MethodNotAllowed(String),

    /// No candidate query text could be extracted from the request
    #[error("Extraction failure: {0}")]
    ExtractionFailure(String),

    /// Legacy text is not a flat JSON object
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// Required legacy field missing or malformed
    #[error("Translation failure: {0}")]
    TranslationFailure(String),

    /// Backend rejected the access credential
    #[error("Bad credential")]
    CredentialInvalid,

    /// Backend validate or fetch failed
    #[error("Backend failure: {0}")]
    BackendFailure(#[from] BackendError),

    /// Native engine reported the request invalid
    #[error("Native engine error")]
    NativeEngineError {
        /// GraphQL-style error objects, each with a `message`
        errors: Vec<serde_json::Value>,
    },
}

/// Convenience Result type for dispatcher stages
pub type Result<T> = std::result::Result<T, DispatchError>;
