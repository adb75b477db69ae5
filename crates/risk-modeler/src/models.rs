use serde::{Deserialize, Serialize};

/// Thresholds used by the assessment and emergency checks.
pub const EVT_VAR_SAFE: f64 = 0.05;
pub const EVT_VAR_CAUTION: f64 = 0.10;
pub const EVT_VAR_EMERGENCY: f64 = 0.15;
pub const CASCADE_SAFE: f64 = 0.3;
pub const CASCADE_CAUTION: f64 = 0.6;
pub const CASCADE_REDUCE: f64 = 0.7;
pub const CASCADE_TIGHTEN: f64 = 0.5;
pub const CRYPTO_MARGIN_BUFFER: f64 = 2.5;
pub const FUTURES_MARGIN_BUFFER: f64 = 1.5;
pub const MARGIN_BUFFER_CRITICAL: f64 = 2.0;
pub const MAX_LEVERAGE_CAP: f64 = 20.0;
pub const MIN_TAIL_OBSERVATIONS: usize = 10;
pub const MIN_EVT_SAMPLE: usize = 20;
pub const CORRELATION_STRESS: f64 = 0.95;
pub const CORRELATION_ELEVATED: f64 = 0.85;
pub const EXTREME_FUNDING_RATE: f64 = 0.0005;

/// Minimum margin buffer multiple required for an asset class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    #[default]
    Crypto,
    Futures,
}

impl AssetClass {
    pub fn margin_buffer(&self) -> f64 {
        match self {
            AssetClass::Crypto => CRYPTO_MARGIN_BUFFER,
            AssetClass::Futures => FUTURES_MARGIN_BUFFER,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Crypto => "crypto",
            AssetClass::Futures => "futures",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationRegime {
    #[default]
    Normal,
    Elevated,
    Stress,
}

impl CorrelationRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationRegime::Normal => "normal",
            CorrelationRegime::Elevated => "elevated",
            CorrelationRegime::Stress => "stress",
        }
    }
}

fn default_equity() -> f64 {
    100_000.0
}

/// Everything `assess_risk` needs about one strategy's live exposure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskInput {
    pub strategy: String,
    /// Per-period returns as fractions (-0.02 = -2%).
    pub returns: Vec<f64>,
    pub leverage: f64,
    pub position_size_usd: f64,
    #[serde(default)]
    pub oi_usd: f64,
    #[serde(default)]
    pub funding_rate_8h: f64,
    #[serde(default = "default_equity")]
    pub account_equity: f64,
    #[serde(default)]
    pub asset_class: AssetClass,
    /// Pairwise correlations of the assets held, when more than one.
    #[serde(default)]
    pub correlation_matrix: Option<Vec<Vec<f64>>>,
}

impl RiskInput {
    pub fn new(strategy: impl Into<String>, returns: Vec<f64>, leverage: f64, position_size_usd: f64) -> Self {
        Self {
            strategy: strategy.into(),
            returns,
            leverage,
            position_size_usd,
            oi_usd: 0.0,
            funding_rate_8h: 0.0,
            account_equity: default_equity(),
            asset_class: AssetClass::default(),
            correlation_matrix: None,
        }
    }
}

/// Risk assessment for one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub strategy: String,
    pub var_95: f64,
    pub var_99: f64,
    pub evt_var_99: f64,
    pub cvar_99: f64,
    pub cascade_risk: f64,
    pub margin_buffer_ok: bool,
    #[serde(with = "sigma_core::precision::serde_inf")]
    pub margin_buffer_multiple: f64,
    pub max_recommended_leverage: f64,
    pub max_position_usd: f64,
    pub correlation_regime: CorrelationRegime,
    pub risk_flags: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
    Emergency,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Emergency => "emergency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyActionKind {
    FlattenAll,
    HaltEntries,
    #[serde(rename = "REDUCE_50PCT")]
    Reduce50Pct,
    ReduceLeverage,
    TightenStops,
}

impl EmergencyActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyActionKind::FlattenAll => "FLATTEN_ALL",
            EmergencyActionKind::HaltEntries => "HALT_ENTRIES",
            EmergencyActionKind::Reduce50Pct => "REDUCE_50PCT",
            EmergencyActionKind::ReduceLeverage => "REDUCE_LEVERAGE",
            EmergencyActionKind::TightenStops => "TIGHTEN_STOPS",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            EmergencyActionKind::FlattenAll => "Close all positions immediately",
            EmergencyActionKind::HaltEntries => "No new positions. Tighten existing stops.",
            EmergencyActionKind::Reduce50Pct => "Cut all positions by 50%",
            EmergencyActionKind::ReduceLeverage => "Decrease leverage to restore 2.5x buffer",
            EmergencyActionKind::TightenStops => "Reduce stop distances by 25%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAction {
    pub strategy: String,
    pub trigger: String,
    pub action: EmergencyActionKind,
    pub severity: Severity,
}

impl EmergencyAction {
    /// `"ACTION: description"`, the form operators see in alerts.
    pub fn summary(&self) -> String {
        format!("{}: {}", self.action.as_str(), self.action.description())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[default]
    Low,
    Medium,
    High,
}

/// Contra-funding signal derived from a rate history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeanReversionSignal {
    pub symbol: String,
    pub current_rate: f64,
    pub z_score: f64,
    pub percentile: f64,
    pub signal: bool,
    pub direction: TradeDirection,
    pub confidence: Confidence,
}

/// Cross-exchange funding spread that survives taker fees on both legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryOpportunity {
    pub symbol: String,
    pub long_exchange: String,
    pub short_exchange: String,
    pub long_rate: f64,
    pub short_rate: f64,
    pub spread: f64,
    pub annualized_spread: f64,
    pub round_trip_fees: f64,
    pub net_annual_yield: f64,
}
