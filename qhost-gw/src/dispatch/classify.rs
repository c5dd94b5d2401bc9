//! Candidate splitting and repair
//!
//! Legacy producers send single-quoted maps and may append free text after
//! the map (for example a native query fragment). The candidate is cut at
//! its first top-level `}`; only the part before the cut is repaired and
//! translated.
//!
//! No grammar sniffing happens here. Whether a candidate is really legacy
//! is decided by attempting the translation.

use super::extract::{Candidate, CandidateSource};
use crate::native::NativeContext;

/// A candidate ready for legacy translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCandidate {
    /// Text up to and including the first top-level `}`, quotes repaired
    pub js_portion: String,
    /// Raw text after the cut, never parsed as legacy grammar
    pub trailing: String,
}

impl LegacyCandidate {
    /// Trailing text without surrounding whitespace
    pub fn trailing_text(&self) -> &str {
        self.trailing.trim()
    }
}

/// Classification of one request, produced once
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedQuery {
    /// Already parsed native request (native dispatch path)
    NativeGrammarText(NativeContext),
    LegacyCandidateText(LegacyCandidate),
    /// Nothing could be extracted
    Unrecoverable,
}

impl ClassifiedQuery {
    pub fn trailing_text(&self) -> &str {
        match self {
            ClassifiedQuery::LegacyCandidateText(candidate) => candidate.trailing_text(),
            _ => "",
        }
    }
}

pub fn classify(candidate: Option<&Candidate>) -> ClassifiedQuery {
    let Some(candidate) = candidate else {
        return ClassifiedQuery::Unrecoverable;
    };

    if candidate.source == CandidateSource::UrlParams {
        return ClassifiedQuery::LegacyCandidateText(LegacyCandidate {
            js_portion: candidate.text.clone(),
            trailing: String::new(),
        });
    }

    let (js, trailing) = split_at_closing_brace(&candidate.text);
    ClassifiedQuery::LegacyCandidateText(LegacyCandidate {
        js_portion: repair_quotes(js),
        trailing: trailing.to_string(),
    })
}

/// Split after the first `}` that closes the outermost brace
///
/// A `}` with no open brace before it also ends the first part. Without
/// any `}` the whole text is the first part.
pub fn split_at_closing_brace(text: &str) -> (&str, &str) {
    let mut depth: i64 = 0;
    for (idx, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth <= 0 {
                    return text.split_at(idx + 1);
                }
            }
            _ => {}
        }
    }
    (text, "")
}

/// Turn single quotes into double quotes
pub fn repair_quotes(js: &str) -> String {
    js.replace('\'', "\"")
}
