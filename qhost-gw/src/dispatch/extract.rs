//! Candidate query extraction
//!
//! Pulls "the query" out of a request without assuming its grammar. In
//! order: the `query` field of a JSON body, the `query` URL parameter, and
//! finally the whole URL parameter map serialized as one JSON object.

use serde_json::{Map, Value};
use tracing::debug;

use super::IncomingRequest;
use crate::error::{DispatchError, Result};

/// Where a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Body,
    QueryParam,
    /// Serialized URL parameter map; already well-formed JSON
    UrlParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub text: String,
    pub source: CandidateSource,
}

/// Extraction result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// `None` when nothing usable could be extracted
    pub candidate: Option<Candidate>,
    /// The native engine must not see the raw legacy parameters
    pub clear_params: bool,
}

pub fn extract(request: &IncomingRequest) -> Extraction {
    if !request.body.trim().is_empty() {
        match body_query(&request.body) {
            Some(text) => {
                return Extraction {
                    candidate: Some(Candidate {
                        text,
                        source: CandidateSource::Body,
                    }),
                    clear_params: false,
                }
            }
            None => debug!("Body carries no usable query field, ignoring it"),
        }
    }

    if let Some(query) = request.param("query").filter(|q| !q.is_empty()) {
        return Extraction {
            candidate: Some(Candidate {
                text: query.to_string(),
                source: CandidateSource::QueryParam,
            }),
            clear_params: false,
        };
    }

    match serialize_params(&request.params) {
        Ok(text) => Extraction {
            candidate: Some(Candidate {
                text,
                source: CandidateSource::UrlParams,
            }),
            clear_params: true,
        },
        Err(e) => {
            debug!("{}", e);
            Extraction {
                candidate: None,
                clear_params: false,
            }
        }
    }
}

/// `query` string of a JSON object body, with doubled backslashes collapsed
fn body_query(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let query = value.get("query")?.as_str()?;
    Some(query.replace("\\\\", "\\"))
}

/// Serialize a parameter multi-map as a flat JSON object
///
/// Keys keep their first-appearance order; the last value of a repeated key
/// wins.
pub fn serialize_params(params: &[(String, String)]) -> Result<String> {
    let mut map = Map::new();
    for (key, value) in params {
        map.insert(key.clone(), Value::String(value.clone()));
    }
    serde_json::to_string(&Value::Object(map))
        .map_err(|e| DispatchError::ExtractionFailure(format!("cannot serialize parameters: {}", e)))
}
