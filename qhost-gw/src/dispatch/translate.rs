//! Legacy parameter translation
//!
//! Maps a flat legacy parameter object onto the call the data backend
//! expects. Translation is pure: it never touches the backend.

use serde_json::{Map, Value};

use crate::backend::SeriesRequest;
use crate::error::{DispatchError, Result};

/// Period alias understood by the `av` dialect
pub const DAILY_PERIOD_ALIAS: &str = "TIME_SERIES_DAILY";

/// Seconds in the daily period
pub const DAILY_PERIOD_SECS: u64 = 86_400;

/// Dialect in which the daily alias is recognized
pub const AV_DIALECT: &str = "av";

/// Data source and client interface a translated call is routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTags {
    pub source: String,
    pub interface: String,
}

impl Default for RoutingTags {
    fn default() -> Self {
        Self {
            source: AV_DIALECT.to_string(),
            interface: AV_DIALECT.to_string(),
        }
    }
}

/// A validated legacy call description
#[derive(Clone, PartialEq, Eq)]
pub struct LegacyCall {
    pub credential: String,
    pub series: SeriesRequest,
}

impl std::fmt::Debug for LegacyCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LegacyCall")
            .field("credential", &"<redacted>")
            .field("series", &self.series)
            .finish()
    }
}

/// Parse the repaired legacy text as a flat JSON object
pub fn parse_params(js: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(js) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(DispatchError::ParseFailure(format!(
            "expected an object, found {}",
            kind_of(&other)
        ))),
        Err(e) => Err(DispatchError::ParseFailure(e.to_string())),
    }
}

pub fn translate(js: &str, tags: &RoutingTags) -> Result<LegacyCall> {
    let params = parse_params(js)?;

    let credential = required(&params, "apikey")?;
    let period = required(&params, "function")?;
    let symbol = required(&params, "symbol")?;
    let start = required(&params, "start")?;
    let end = required(&params, "end")?;

    Ok(LegacyCall {
        credential,
        series: SeriesRequest {
            symbol,
            period_secs: translate_period(&period, &tags.interface)?,
            start,
            end,
            source: tags.source.clone(),
            interface: tags.interface.clone(),
        },
    })
}

/// Period in seconds: the dialect alias or a positive integer
pub fn translate_period(value: &str, interface: &str) -> Result<u64> {
    if interface == AV_DIALECT && value == DAILY_PERIOD_ALIAS {
        return Ok(DAILY_PERIOD_SECS);
    }

    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(DispatchError::TranslationFailure(format!(
            "unsupported period {:?}",
            value
        ))),
    }
}

/// String field; numbers are accepted and rendered as decimal text
fn required(params: &Map<String, Value>, key: &str) -> Result<String> {
    match params.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(DispatchError::TranslationFailure(format!(
            "field {} must be a string, found {}",
            key,
            kind_of(other)
        ))),
        None => Err(DispatchError::TranslationFailure(format!(
            "missing field {}",
            key
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAILY: &str = r#"{"apikey":"k1","function":"TIME_SERIES_DAILY","symbol":"ABC","start":"1","end":"2"}"#;

    #[test]
    fn test_daily_alias() {
        let call = translate(DAILY, &RoutingTags::default()).unwrap();
        assert_eq!(call.credential, "k1");
        assert_eq!(
            call.series,
            SeriesRequest {
                symbol: "ABC".to_string(),
                period_secs: 86_400,
                start: "1".to_string(),
                end: "2".to_string(),
                source: "av".to_string(),
                interface: "av".to_string(),
            }
        );
    }

    #[test]
    fn test_numeric_period_and_numbers() {
        let call = translate(
            r#"{"apikey":"k","function":" 3600 ","symbol":"X","start":100,"end":200}"#,
            &RoutingTags::default(),
        )
        .unwrap();
        assert_eq!(call.series.period_secs, 3600);
        assert_eq!(call.series.start, "100");
        assert_eq!(call.series.end, "200");
    }

    #[test]
    fn test_alias_only_in_av_dialect() {
        let tags = RoutingTags {
            source: "av".to_string(),
            interface: "yf".to_string(),
        };
        let err = translate(DAILY, &tags).unwrap_err();
        assert!(matches!(err, DispatchError::TranslationFailure(_)));
    }

    #[test]
    fn test_bad_periods() {
        for period in ["0", "-5", "daily", "1.5", ""] {
            assert!(
                translate_period(period, "av").is_err(),
                "period {:?} should be rejected",
                period
            );
        }
    }

    #[test]
    fn test_missing_fields() {
        for key in ["apikey", "function", "symbol", "start", "end"] {
            let mut map: Map<String, Value> = serde_json::from_str(DAILY).unwrap();
            map.remove(key);
            let js = Value::Object(map).to_string();
            let err = translate(&js, &RoutingTags::default()).unwrap_err();
            assert!(
                matches!(err, DispatchError::TranslationFailure(ref m) if m.contains(key)),
                "missing {} gave {:?}",
                key,
                err
            );
        }
    }

    #[test]
    fn test_wrong_field_type() {
        let err = translate(
            r#"{"apikey":["k"],"function":"60","symbol":"X","start":"1","end":"2"}"#,
            &RoutingTags::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::TranslationFailure(_)));
    }

    #[test]
    fn test_parse_failures() {
        assert!(matches!(
            translate("{ hello }", &RoutingTags::default()),
            Err(DispatchError::ParseFailure(_))
        ));
        assert!(matches!(
            translate("[1]", &RoutingTags::default()),
            Err(DispatchError::ParseFailure(_))
        ));
    }

    #[test]
    fn test_debug_redacts_credential() {
        let call = translate(DAILY, &RoutingTags::default()).unwrap();
        let rendered = format!("{:?}", call);
        assert!(!rendered.contains("k1"));
        assert!(rendered.contains("ABC"));
    }
}
