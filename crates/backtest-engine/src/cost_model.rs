use serde::{Deserialize, Serialize};
use serde_json::Value;
use sigma_core::{EngineError, EngineResult};

use crate::crypto_costs::{round_trip_breakdown, PerpCosts};

/// Per-contract futures costs. Independent of notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FuturesCosts {
    #[serde(default = "FuturesCosts::default_commission")]
    pub commission_per_side: f64,
    #[serde(default = "FuturesCosts::default_slippage_ticks")]
    pub slippage_ticks: f64,
    #[serde(default = "FuturesCosts::default_tick_value")]
    pub tick_value: f64,
}

impl FuturesCosts {
    fn default_commission() -> f64 {
        2.50
    }
    fn default_slippage_ticks() -> f64 {
        0.5
    }
    fn default_tick_value() -> f64 {
        12.50
    }
}

impl Default for FuturesCosts {
    fn default() -> Self {
        Self {
            commission_per_side: Self::default_commission(),
            slippage_ticks: Self::default_slippage_ticks(),
            tick_value: Self::default_tick_value(),
        }
    }
}

/// Centralized-exchange costs as fractions of notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CexCosts {
    #[serde(default = "default_maker_fee")]
    pub maker_fee: f64,
    #[serde(default = "default_taker_fee")]
    pub taker_fee: f64,
    #[serde(default = "CexCosts::default_slippage")]
    pub slippage_pct: f64,
}

impl CexCosts {
    fn default_slippage() -> f64 {
        0.0005
    }
}

impl Default for CexCosts {
    fn default() -> Self {
        Self {
            maker_fee: default_maker_fee(),
            taker_fee: default_taker_fee(),
            slippage_pct: Self::default_slippage(),
        }
    }
}

/// On-chain venue: CEX-style fees plus a flat gas charge per leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DexCosts {
    #[serde(default = "default_maker_fee")]
    pub maker_fee: f64,
    #[serde(default = "default_taker_fee")]
    pub taker_fee: f64,
    #[serde(default = "DexCosts::default_slippage")]
    pub slippage_pct: f64,
    #[serde(default = "DexCosts::default_gas")]
    pub gas_per_trade: f64,
}

impl DexCosts {
    fn default_slippage() -> f64 {
        0.001
    }
    fn default_gas() -> f64 {
        0.50
    }
}

impl Default for DexCosts {
    fn default() -> Self {
        Self {
            maker_fee: default_maker_fee(),
            taker_fee: default_taker_fee(),
            slippage_pct: Self::default_slippage(),
            gas_per_trade: Self::default_gas(),
        }
    }
}

fn default_maker_fee() -> f64 {
    0.0002
}

fn default_taker_fee() -> f64 {
    0.0005
}

/// Execution cost model, selected by the JSON `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CostModel {
    Futures(FuturesCosts),
    CryptoCex(CexCosts),
    CryptoDex(DexCosts),
    CryptoPerp(PerpCosts),
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel::Futures(FuturesCosts::default())
    }
}

const KNOWN_TYPES: &[&str] = &["futures", "crypto_cex", "crypto_dex", "crypto_perp"];

impl CostModel {
    /// Default profile for a type tag.
    pub fn default_for(kind: &str) -> EngineResult<Self> {
        match kind {
            "futures" => Ok(CostModel::Futures(FuturesCosts::default())),
            "crypto_cex" => Ok(CostModel::CryptoCex(CexCosts::default())),
            "crypto_dex" => Ok(CostModel::CryptoDex(DexCosts::default())),
            "crypto_perp" => Ok(CostModel::CryptoPerp(PerpCosts::default())),
            other => Err(unknown_type(other)),
        }
    }

    pub fn from_json(text: &str) -> EngineResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EngineError::Configuration(format!("cost model is not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    /// Parse a cost model object. A missing `type` means futures; missing
    /// fields take that type's defaults.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        let Some(object) = value.as_object() else {
            return Err(EngineError::Configuration(
                "cost model must be a JSON object".to_string(),
            ));
        };

        let kind = match object.get("type") {
            None => "futures",
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(EngineError::Configuration(format!(
                    "cost model type must be a string, got {other}"
                )))
            }
        };
        if !KNOWN_TYPES.contains(&kind) {
            return Err(unknown_type(kind));
        }

        let mut tagged = object.clone();
        tagged.insert("type".to_string(), Value::String(kind.to_string()));
        let model: CostModel = serde_json::from_value(Value::Object(tagged))
            .map_err(|e| EngineError::Configuration(format!("invalid {kind} cost model: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CostModel::Futures(_) => "futures",
            CostModel::CryptoCex(_) => "crypto_cex",
            CostModel::CryptoDex(_) => "crypto_dex",
            CostModel::CryptoPerp(_) => "crypto_perp",
        }
    }

    /// Reject negative or non-finite parameters. Perp maker rebates are the
    /// only negative input; their total is floored in the breakdown.
    pub fn validate(&self) -> EngineResult<()> {
        let fields: Vec<(&str, f64)> = match self {
            CostModel::Futures(c) => vec![
                ("commission_per_side", c.commission_per_side),
                ("slippage_ticks", c.slippage_ticks),
                ("tick_value", c.tick_value),
            ],
            CostModel::CryptoCex(c) => vec![
                ("maker_fee", c.maker_fee),
                ("taker_fee", c.taker_fee),
                ("slippage_pct", c.slippage_pct),
            ],
            CostModel::CryptoDex(c) => vec![
                ("maker_fee", c.maker_fee),
                ("taker_fee", c.taker_fee),
                ("slippage_pct", c.slippage_pct),
                ("gas_per_trade", c.gas_per_trade),
            ],
            CostModel::CryptoPerp(c) => {
                let mut fields = vec![
                    ("hold_hours", c.hold_hours),
                    ("funding_rate_8h", c.funding_rate_8h),
                ];
                if let Some(s) = c.slippage_override {
                    fields.push(("slippage_override", s));
                }
                if let Some(g) = c.gas_override {
                    fields.push(("gas_override", g));
                }
                fields
            }
        };

        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::Configuration(format!(
                    "{} cost model: {} must be a non-negative number, got {}",
                    self.kind(),
                    name,
                    value
                )));
            }
        }
        Ok(())
    }

    /// Cost of opening and closing one unit at `notional_usd`.
    pub fn round_trip_cost(&self, notional_usd: f64) -> f64 {
        match self {
            CostModel::Futures(c) => {
                2.0 * c.commission_per_side + 2.0 * c.slippage_ticks * c.tick_value
            }
            CostModel::CryptoCex(c) => {
                (c.maker_fee + c.taker_fee + 2.0 * c.slippage_pct) * notional_usd
            }
            CostModel::CryptoDex(c) => {
                (c.maker_fee + c.taker_fee + 2.0 * c.slippage_pct) * notional_usd
                    + 2.0 * c.gas_per_trade
            }
            CostModel::CryptoPerp(c) => round_trip_breakdown(c, notional_usd).total_cost_usd,
        }
    }
}

fn unknown_type(kind: &str) -> EngineError {
    EngineError::Configuration(format!(
        "Unknown cost model type: {kind} (expected one of {})",
        KNOWN_TYPES.join(", ")
    ))
}
