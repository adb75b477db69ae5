//! Presentation rounding and JSON helpers for non-finite floats.
//!
//! Computations stay in full `f64` precision; rounding is applied once when a
//! value leaves the engine in a report.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round half-to-even on the exact binary value of `value`.
///
/// Non-finite values and values outside the decimal range pass through unchanged.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

/// Dollar amounts: 2 decimal places.
pub fn round_usd(value: f64) -> f64 {
    round_dp(value, 2)
}

/// Ratios and fractions: 4 decimal places.
pub fn round_ratio(value: f64) -> f64 {
    round_dp(value, 4)
}

/// Serde adapter writing infinities as `"inf"` / `"-inf"` strings, since JSON
/// numbers cannot represent them. Finite values are written as plain numbers.
pub mod serde_inf {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "inf" } else { "-inf" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => match s.to_ascii_lowercase().as_str() {
                "inf" | "infinity" | "+inf" => Ok(f64::INFINITY),
                "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!("invalid float '{other}'"))),
            },
        }
    }
}
