//! Parameter maps: defaults merged with JSON overrides, read back as typed values.

use serde_json::Value;
use sigma_core::{EngineError, EngineResult, ParamMap};

/// Overlay `overrides` onto `defaults`, key by key.
///
/// Every override must name a known parameter and carry a number.
pub fn merge_params(strategy: &str, defaults: ParamMap, overrides: Option<&ParamMap>) -> EngineResult<ParamMap> {
    let mut merged = defaults;
    let Some(overrides) = overrides else {
        return Ok(merged);
    };

    for (key, value) in overrides {
        if !merged.contains_key(key) {
            return Err(EngineError::Configuration(format!(
                "unknown parameter '{key}' for strategy '{strategy}'"
            )));
        }
        if !value.is_number() {
            return Err(EngineError::Configuration(format!(
                "parameter '{key}' for strategy '{strategy}' must be numeric, got {value}"
            )));
        }
        merged.insert(key.clone(), value.clone());
    }
    Ok(merged)
}

pub fn get_f64(params: &ParamMap, key: &str) -> EngineResult<f64> {
    params
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or_else(|| EngineError::Configuration(format!("parameter '{key}' missing or not a number")))
}

/// A window length: a positive integer, also accepted as an integral float (`10.0`).
pub fn get_period(params: &ParamMap, key: &str) -> EngineResult<usize> {
    let value = get_f64(params, key)?;
    if value < 1.0 || value.fract() != 0.0 {
        return Err(EngineError::Configuration(format!(
            "parameter '{key}' must be a positive integer, got {value}"
        )));
    }
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("period".into(), json!(10));
        map.insert("threshold".into(), json!(2.0));
        map
    }

    #[test]
    fn test_merge_overrides_single_key() {
        let mut overrides = ParamMap::new();
        overrides.insert("period".into(), json!(5));
        let merged = merge_params("demo", defaults(), Some(&overrides)).unwrap();
        assert_eq!(get_period(&merged, "period").unwrap(), 5);
        assert_eq!(get_f64(&merged, "threshold").unwrap(), 2.0);
    }

    #[test]
    fn test_merge_rejects_unknown_and_non_numeric() {
        let mut unknown = ParamMap::new();
        unknown.insert("lookback".into(), json!(5));
        assert!(matches!(
            merge_params("demo", defaults(), Some(&unknown)),
            Err(EngineError::Configuration(_))
        ));

        let mut text = ParamMap::new();
        text.insert("period".into(), json!("five"));
        assert!(matches!(
            merge_params("demo", defaults(), Some(&text)),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_period_validation() {
        let mut map = ParamMap::new();
        map.insert("a".into(), json!(10.0));
        map.insert("b".into(), json!(2.5));
        map.insert("c".into(), json!(0));
        assert_eq!(get_period(&map, "a").unwrap(), 10);
        assert!(get_period(&map, "b").is_err());
        assert!(get_period(&map, "c").is_err());
        assert!(get_period(&map, "missing").is_err());
    }
}
