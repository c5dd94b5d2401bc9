//! Execution bridge
//!
//! Runs a classified query and reports a tagged [`ExecutionOutcome`]. Native
//! queries go to the native engine untouched. Legacy candidates are
//! translated, the credential is checked, and the series is fetched; every
//! failure along that path becomes `Invalid` instead of an error.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::body::Bytes;
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, warn};

use super::classify::{ClassifiedQuery, LegacyCandidate};
use super::translate::{translate, RoutingTags};
use super::JSON_CONTENT_TYPE;
use crate::backend::{BackendError, DataBackend};
use crate::error::{DispatchError, Result};
use crate::native::{NativeContext, NativeEngine};

/// Exactly one of success or failure
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Opaque payload; not shaped like a native result
    Success {
        payload: Bytes,
        content_kind: &'static str,
    },
    Invalid(DispatchError),
}

/// Shared handle to the data backend and the native engine
#[derive(Clone)]
pub struct ExecutionBridge {
    backend: Arc<dyn DataBackend>,
    engine: Arc<dyn NativeEngine>,
    tags: RoutingTags,
}

impl ExecutionBridge {
    pub fn new(
        backend: Arc<dyn DataBackend>,
        engine: Arc<dyn NativeEngine>,
        tags: RoutingTags,
    ) -> Self {
        Self {
            backend,
            engine,
            tags,
        }
    }

    pub async fn execute(&self, query: &ClassifiedQuery) -> ExecutionOutcome {
        match query {
            ClassifiedQuery::NativeGrammarText(context) => self.execute_native(context).await,
            ClassifiedQuery::LegacyCandidateText(candidate) => {
                match self.execute_legacy(candidate).await {
                    Ok(payload) => ExecutionOutcome::Success {
                        payload,
                        content_kind: JSON_CONTENT_TYPE,
                    },
                    Err(e) => {
                        debug!("Legacy execution failed: {}", e);
                        ExecutionOutcome::Invalid(e)
                    }
                }
            }
            ClassifiedQuery::Unrecoverable => ExecutionOutcome::Invalid(
                DispatchError::ExtractionFailure("no candidate query text".to_string()),
            ),
        }
    }

    async fn execute_native(&self, context: &NativeContext) -> ExecutionOutcome {
        let result = self.engine.execute(context).await;
        if result.invalid {
            return ExecutionOutcome::Invalid(DispatchError::NativeEngineError {
                errors: result.errors,
            });
        }

        match serde_json::to_vec(&result.to_body()) {
            Ok(body) => ExecutionOutcome::Success {
                payload: Bytes::from(body),
                content_kind: JSON_CONTENT_TYPE,
            },
            Err(e) => ExecutionOutcome::Invalid(DispatchError::NativeEngineError {
                errors: vec![json!({ "message": e.to_string() })],
            }),
        }
    }

    /// At most one validate and one fetch call, in that order
    async fn execute_legacy(&self, candidate: &LegacyCandidate) -> Result<Bytes> {
        let call = translate(&candidate.js_portion, &self.tags)?;

        let valid = guarded(self.backend.validate_credential(
            &call.credential,
            &call.series.source,
            &call.series.interface,
        ))
        .await?;
        if !valid {
            warn!(symbol = %call.series.symbol, "Legacy request rejected: bad credential");
            return Err(DispatchError::CredentialInvalid);
        }

        let payload = guarded(self.backend.fetch_series(&call.series)).await?;
        debug!(
            symbol = %call.series.symbol,
            period = call.series.period_secs,
            bytes = payload.len(),
            "Fetched legacy series"
        );
        Ok(payload)
    }
}

/// Await a backend call, turning a panic into a backend failure
async fn guarded<T, F>(call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, BackendError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result.map_err(DispatchError::from),
        Err(_) => Err(DispatchError::BackendFailure(BackendError::Panicked)),
    }
}
