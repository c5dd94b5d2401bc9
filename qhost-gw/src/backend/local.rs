//! File-backed tick data store
//!
//! Layout under the data root:
//!
//! ```text
//! <root>/<source>/apikeys        SHA-256 hex digests of accepted keys
//! <root>/<source>/<SYMBOL>.csv   timestamp,open,high,low,close,volume
//! ```
//!
//! Series are aggregated on demand into buckets of the requested period and
//! rendered in the `av` dialect.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::{DateTime, NaiveDate};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{BackendError, DataBackend, SeriesRequest};

/// The only interface dialect this store renders
pub const AV_INTERFACE: &str = "av";

const SECONDS_PER_DAY: u64 = 86_400;
const API_KEYS_FILE: &str = "apikeys";

/// Tick data store rooted at a directory
#[derive(Debug, Clone)]
pub struct LocalDataBackend {
    root: PathBuf,
    timeout: Duration,
}

impl LocalDataBackend {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| BackendError::Timeout(self.timeout.as_millis() as u64))?
    }

    fn source_dir(&self, source: &str) -> Result<PathBuf, BackendError> {
        if !is_safe_component(source) {
            return Err(BackendError::Format(format!("invalid source tag: {}", source)));
        }
        Ok(self.root.join(source))
    }
}

#[async_trait]
impl DataBackend for LocalDataBackend {
    async fn validate_credential(
        &self,
        key: &str,
        source: &str,
        interface: &str,
    ) -> Result<bool, BackendError> {
        if interface != AV_INTERFACE {
            return Err(BackendError::UnsupportedInterface(interface.to_string()));
        }
        if key.is_empty() {
            return Ok(false);
        }

        let path = self.source_dir(source)?.join(API_KEYS_FILE);
        let digest = key_digest(key);

        self.bounded(async move {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("No key file at {}", path.display());
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };
            Ok(text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .any(|line| line.eq_ignore_ascii_case(&digest)))
        })
        .await
    }

    async fn fetch_series(&self, request: &SeriesRequest) -> Result<Bytes, BackendError> {
        if request.interface != AV_INTERFACE {
            return Err(BackendError::UnsupportedInterface(request.interface.clone()));
        }
        if request.period_secs == 0 {
            return Err(BackendError::InvalidRange("period must be positive".to_string()));
        }
        if !is_safe_component(&request.symbol) {
            return Err(BackendError::UnknownSymbol(request.symbol.clone()));
        }

        let start = parse_bound(&request.start, false)?;
        let end = parse_bound(&request.end, true)?;
        if start > end {
            return Err(BackendError::InvalidRange(format!(
                "start {} is after end {}",
                request.start, request.end
            )));
        }

        let path = self
            .source_dir(&request.source)?
            .join(format!("{}.csv", request.symbol));

        let text = self
            .bounded(async {
                match tokio::fs::read_to_string(&path).await {
                    Ok(text) => Ok(text),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(BackendError::UnknownSymbol(request.symbol.clone()))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        let ticks = parse_ticks(&text)?;
        let bars = aggregate(&ticks, start, end, request.period_secs);
        debug!(
            "Aggregated {} ticks into {} bars for {}",
            ticks.len(),
            bars.len(),
            request.symbol
        );

        let rendered = render_av(&request.symbol, request.period_secs, &bars);
        let bytes = serde_json::to_vec(&rendered)
            .map_err(|e| BackendError::Format(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }
}

/// SHA-256 hex digest stored in the key file
pub fn key_digest(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Range bound: unix seconds, or a `YYYY-MM-DD` date (end dates are inclusive)
fn parse_bound(text: &str, is_end: bool) -> Result<i64, BackendError> {
    let text = text.trim();
    if let Ok(secs) = text.parse::<i64>() {
        return Ok(secs);
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| BackendError::InvalidRange(format!("unrecognized bound: {}", text)))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| BackendError::InvalidRange(text.to_string()))?
        .and_utc()
        .timestamp();

    if is_end {
        Ok(midnight + SECONDS_PER_DAY as i64 - 1)
    } else {
        Ok(midnight)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tick {
    ts: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn parse_ticks(text: &str) -> Result<Vec<Tick>, BackendError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut ticks = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| BackendError::Format(e.to_string()))?;
        let line = record.position().map(|p| p.line()).unwrap_or(idx as u64 + 1);

        let first = record.get(0).unwrap_or_default();
        let ts = match first.parse::<i64>() {
            Ok(ts) => ts,
            // Header row
            Err(_) if idx == 0 => continue,
            Err(_) => {
                return Err(BackendError::Format(format!(
                    "line {}: bad timestamp {:?}",
                    line, first
                )))
            }
        };
        if record.len() != 6 {
            return Err(BackendError::Format(format!(
                "line {}: expected 6 fields, found {}",
                line,
                record.len()
            )));
        }

        let num = |field: usize| -> Result<f64, BackendError> {
            let raw = record.get(field).unwrap_or_default();
            raw.parse::<f64>().map_err(|_| {
                BackendError::Format(format!("line {}: bad number {:?}", line, raw))
            })
        };

        ticks.push(Tick {
            ts,
            open: num(1)?,
            high: num(2)?,
            low: num(3)?,
            close: num(4)?,
            volume: num(5)?,
        });
    }

    Ok(ticks)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bar {
    first_ts: i64,
    last_ts: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Bucket ticks within `[start, end]` by `period` seconds, keyed by bucket start
fn aggregate(ticks: &[Tick], start: i64, end: i64, period: u64) -> BTreeMap<i64, Bar> {
    let period = period as i64;
    let mut bars: BTreeMap<i64, Bar> = BTreeMap::new();

    for tick in ticks.iter().filter(|t| t.ts >= start && t.ts <= end) {
        let bucket = tick.ts - tick.ts.rem_euclid(period);
        bars.entry(bucket)
            .and_modify(|bar| {
                if tick.ts < bar.first_ts {
                    bar.first_ts = tick.ts;
                    bar.open = tick.open;
                }
                if tick.ts >= bar.last_ts {
                    bar.last_ts = tick.ts;
                    bar.close = tick.close;
                }
                bar.high = bar.high.max(tick.high);
                bar.low = bar.low.min(tick.low);
                bar.volume += tick.volume;
            })
            .or_insert(Bar {
                first_ts: tick.ts,
                last_ts: tick.ts,
                open: tick.open,
                high: tick.high,
                low: tick.low,
                close: tick.close,
                volume: tick.volume,
            });
    }

    bars
}

fn bucket_label(bucket: i64, period: u64) -> String {
    let format = if period % SECONDS_PER_DAY == 0 {
        "%Y-%m-%d"
    } else {
        "%Y-%m-%d %H:%M:%S"
    };
    DateTime::from_timestamp(bucket, 0)
        .map(|dt| dt.format(format).to_string())
        .unwrap_or_else(|| bucket.to_string())
}

fn interval_label(period: u64) -> String {
    if period == SECONDS_PER_DAY {
        "Daily".to_string()
    } else {
        format!("{}s", period)
    }
}

/// Render bars newest first in the `av` dialect
fn render_av(symbol: &str, period: u64, bars: &BTreeMap<i64, Bar>) -> Value {
    let interval = interval_label(period);
    let last_refreshed = bars
        .keys()
        .next_back()
        .map(|bucket| bucket_label(*bucket, period))
        .unwrap_or_default();

    let mut series = Map::new();
    for (bucket, bar) in bars.iter().rev() {
        series.insert(
            bucket_label(*bucket, period),
            json!({
                "1. open": format!("{:.4}", bar.open),
                "2. high": format!("{:.4}", bar.high),
                "3. low": format!("{:.4}", bar.low),
                "4. close": format!("{:.4}", bar.close),
                "5. volume": format!("{:.0}", bar.volume),
            }),
        );
    }

    let mut root = Map::new();
    root.insert(
        "Meta Data".to_string(),
        json!({
            "1. Information": format!("{} Prices (open, high, low, close) and Volumes", interval),
            "2. Symbol": symbol,
            "3. Last Refreshed": last_refreshed,
            "4. Interval": interval,
            "5. Time Zone": "UTC",
        }),
    );
    root.insert(format!("Time Series ({})", interval), Value::Object(series));
    Value::Object(root)
}
