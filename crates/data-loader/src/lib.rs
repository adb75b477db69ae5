//! data-loader: read OHLCV bars from CSV into a validated [`PriceSeries`].
//!
//! Accepts the common export layouts:
//!   - Standard: timestamp/datetime/date, open, high, low, close, volume
//!   - Databento: ts_event, open, high, low, close, volume
//!   - CCXT: timestamp (unix ms), open, high, low, close, volume
//!
//! Header names are matched case-insensitively after trimming. `volume` is optional.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sigma_core::{EngineError, EngineResult, PriceBar, PriceSeries};
use tracing::{debug, info};

/// Accepted timestamp headers, in priority order.
const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "ts_event", "datetime", "date"];
/// Epoch values above this are milliseconds.
const MILLIS_THRESHOLD: f64 = 1e12;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Bar range to keep after loading. Out-of-range bounds clamp; negative ends count from the back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    pub start_bar: usize,
    /// Exclusive end. `-1` keeps everything; other negatives count from the end.
    pub end_bar: i64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            start_bar: 0,
            end_bar: -1,
        }
    }
}

impl LoadOptions {
    pub fn range(&self, len: usize) -> std::ops::Range<usize> {
        let end = match self.end_bar {
            -1 => len,
            e if e < 0 => len.saturating_sub(e.unsigned_abs() as usize),
            e => (e as usize).min(len),
        };
        let start = self.start_bar.min(end);
        start..end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EpochUnit {
    Seconds,
    Millis,
}

#[derive(Debug, Clone, Copy)]
enum TimestampKind {
    Epoch(EpochUnit),
    Text,
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> EngineResult<Self> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |name: &str| names.iter().position(|n| n == name);

        let missing: Vec<&str> = ["open", "high", "low", "close"]
            .into_iter()
            .filter(|c| find(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Data(format!(
                "Data CSV missing required columns: {}",
                missing.join(", ")
            )));
        }
        let required = |name: &str| {
            find(name).ok_or_else(|| EngineError::Data(format!("Data CSV missing required column: {name}")))
        };

        let timestamp = TIMESTAMP_COLUMNS
            .iter()
            .find_map(|c| find(c))
            .ok_or_else(|| {
                EngineError::Data(format!(
                    "Data CSV has no timestamp column (expected one of: {})",
                    TIMESTAMP_COLUMNS.join(", ")
                ))
            })?;

        Ok(Self {
            timestamp,
            open: required("open")?,
            high: required("high")?,
            low: required("low")?,
            close: required("close")?,
            volume: find("volume"),
        })
    }
}

/// Load and slice a CSV file.
pub fn load_csv(path: impl AsRef<Path>, options: &LoadOptions) -> EngineResult<PriceSeries> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let series = read_csv(file, options)?;
    info!(path = %path.display(), bars = series.len(), "Loaded price data");
    Ok(series)
}

/// Parse CSV from any reader. Rows must be in strictly increasing time order.
pub fn read_csv<R: Read>(reader: R, options: &LoadOptions) -> EngineResult<PriceSeries> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| EngineError::Data(format!("cannot read CSV header: {e}")))?
        .clone();
    let columns = Columns::resolve(&headers)?;

    let mut kind = None;
    let mut bars = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = i + 2;
        let record = result.map_err(|e| EngineError::Data(format!("CSV error at row {row}: {e}")))?;

        let raw_ts = field(&record, columns.timestamp, "timestamp", row)?;
        let ts_kind = *kind.get_or_insert_with(|| detect_kind(raw_ts));
        let timestamp = parse_timestamp(raw_ts, ts_kind)
            .ok_or_else(|| EngineError::Data(format!("row {row}: unparseable timestamp '{raw_ts}'")))?;

        let volume = match columns.volume.and_then(|c| record.get(c)) {
            Some(v) if !v.is_empty() => number(v, "volume", row)?,
            _ => 0.0,
        };

        let bar = PriceBar {
            timestamp,
            open: number(field(&record, columns.open, "open", row)?, "open", row)?,
            high: number(field(&record, columns.high, "high", row)?, "high", row)?,
            low: number(field(&record, columns.low, "low", row)?, "low", row)?,
            close: number(field(&record, columns.close, "close", row)?, "close", row)?,
            volume,
        };
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(EngineError::Data("Data CSV contains no rows".to_string()));
    }

    let total = bars.len();
    let range = options.range(total);
    if range.is_empty() {
        return Err(EngineError::Data(format!(
            "bar range {}..{} selects no bars out of {total}",
            options.start_bar, options.end_bar
        )));
    }
    debug!(total, start = range.start, end = range.end, "Slicing bars");

    let bars: Vec<PriceBar> = bars.drain(range).collect();
    PriceSeries::new(bars)
}

fn field<'r>(record: &'r csv::StringRecord, index: usize, name: &str, row: usize) -> EngineResult<&'r str> {
    match record.get(index) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(EngineError::Data(format!("row {row}: missing value for '{name}'"))),
    }
}

fn number(raw: &str, name: &str, row: usize) -> EngineResult<f64> {
    raw.parse::<f64>()
        .map_err(|_| EngineError::Data(format!("row {row}: '{name}' is not a number: '{raw}'")))
}

/// Numeric first cell means the whole column is epochs; its magnitude picks the unit.
fn detect_kind(first: &str) -> TimestampKind {
    match first.parse::<f64>() {
        Ok(v) if v > MILLIS_THRESHOLD => TimestampKind::Epoch(EpochUnit::Millis),
        Ok(_) => TimestampKind::Epoch(EpochUnit::Seconds),
        Err(_) => TimestampKind::Text,
    }
}

fn parse_timestamp(raw: &str, kind: TimestampKind) -> Option<DateTime<Utc>> {
    match kind {
        TimestampKind::Epoch(unit) => parse_epoch(raw.parse::<f64>().ok()?, unit),
        TimestampKind::Text => parse_text(raw),
    }
}

fn parse_epoch(value: f64, unit: EpochUnit) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    match unit {
        EpochUnit::Millis => DateTime::from_timestamp_millis(value.round() as i64),
        EpochUnit::Seconds => {
            let secs = value.floor();
            let nanos = ((value - secs) * 1e9).round().min(999_999_999.0) as u32;
            DateTime::from_timestamp(secs as i64, nanos)
        }
    }
}

fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
