use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Strategy parameters as passed on the command line or from a registry default.
pub type ParamMap = serde_json::Map<String, serde_json::Value>;

/// OHLCV bar data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl PriceBar {
    fn validate(&self, index: usize) -> EngineResult<()> {
        let prices = [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ];
        for (field, value) in prices {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::Data(format!(
                    "bar {index}: {field} must be positive and finite, got {value}"
                )));
            }
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(EngineError::Data(format!(
                "bar {index}: volume must be non-negative, got {}",
                self.volume
            )));
        }
        Ok(())
    }
}

/// Ordered, validated sequence of bars with strictly increasing timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(bars: Vec<PriceBar>) -> EngineResult<Self> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate(i)?;
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                return Err(EngineError::Data(format!(
                    "timestamps must be strictly increasing: bar {} ({}) follows bar {} ({})",
                    i,
                    bar.timestamp,
                    i - 1,
                    bars[i - 1].timestamp
                )));
            }
        }
        Ok(Self { bars })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn get(&self, index: usize) -> Option<&PriceBar> {
        self.bars.get(index)
    }

    /// Owned copy of the bars in `range`. Already-validated bars stay valid.
    pub fn slice(&self, range: Range<usize>) -> EngineResult<Self> {
        if range.start > range.end || range.end > self.bars.len() {
            return Err(EngineError::Data(format!(
                "slice {}..{} out of bounds for {} bars",
                range.start,
                range.end,
                self.bars.len()
            )));
        }
        Ok(Self {
            bars: self.bars[range].to_vec(),
        })
    }

    pub fn opens(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.first().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|b| b.timestamp)
    }
}

/// Desired position for a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    Short,
    #[default]
    Flat,
    Long,
}

impl Position {
    pub fn value(self) -> i8 {
        match self {
            Position::Short => -1,
            Position::Flat => 0,
            Position::Long => 1,
        }
    }

    /// Side of an open position, `None` when flat.
    pub fn side(self) -> Option<Side> {
        match self {
            Position::Long => Some(Side::Long),
            Position::Short => Some(Side::Short),
            Position::Flat => None,
        }
    }
}

impl TryFrom<i64> for Position {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Position::Short),
            0 => Ok(Position::Flat),
            1 => Ok(Position::Long),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// One position per bar. Only valid positions can be stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalSeries(Vec<Position>);

impl SignalSeries {
    pub fn from_positions(positions: Vec<Position>) -> Self {
        Self(positions)
    }

    /// Build from raw integers, rejecting anything outside {-1, 0, 1}.
    pub fn from_raw(raw: &[i64]) -> EngineResult<Self> {
        raw.iter()
            .enumerate()
            .map(|(index, &value)| {
                Position::try_from(value).map_err(|value| EngineError::InvalidSignal { index, value })
            })
            .collect::<EngineResult<Vec<_>>>()
            .map(Self)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Position] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<Position> {
        self.0.get(index).copied()
    }

    pub fn to_raw(&self) -> Vec<i8> {
        self.0.iter().map(|p| p.value()).collect()
    }
}

/// A price series plus named indicator columns aligned to it.
/// Warm-up values are stored as NaN.
#[derive(Debug, Clone, Default)]
pub struct EnrichedSeries {
    series: PriceSeries,
    columns: BTreeMap<String, Vec<f64>>,
}

impl EnrichedSeries {
    pub fn new(series: PriceSeries) -> Self {
        Self {
            series,
            columns: BTreeMap::new(),
        }
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> EngineResult<()> {
        let name = name.into();
        if values.len() != self.series.len() {
            return Err(EngineError::Data(format!(
                "column '{}' has {} values for {} bars",
                name,
                values.len(),
                self.series.len()
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Like [`column`](Self::column) but reports a missing indicator as a strategy error.
    pub fn require_column(&self, name: &str) -> EngineResult<&[f64]> {
        self.column(name)
            .ok_or_else(|| EngineError::Strategy(format!("missing indicator column '{name}'")))
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }
}
