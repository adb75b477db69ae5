use serde_json::json;
use sigma_core::{
    EngineError, EngineResult, EnrichedSeries, ParamMap, Position, PriceSeries, SignalSeries,
    StrategyProducer,
};

use crate::indicators::rolling_zscore;
use crate::params::{get_f64, get_period, merge_params};

pub const NAME: &str = "zscore_reversion";

/// Rolling z-score mean reversion.
///
/// Enters long when the close is `entry_z` standard deviations below its
/// trailing mean, short when it is `entry_z` above, and holds until the
/// z-score reverts inside `exit_z`.
#[derive(Debug, Clone)]
pub struct ZScoreReversion {
    params: ParamMap,
    lookback: usize,
    entry_z: f64,
    exit_z: f64,
}

impl ZScoreReversion {
    pub fn new(overrides: Option<&ParamMap>) -> EngineResult<Self> {
        let params = merge_params(NAME, Self::defaults(), overrides)?;
        let lookback = get_period(&params, "lookback")?;
        let entry_z = get_f64(&params, "entry_z")?;
        let exit_z = get_f64(&params, "exit_z")?;

        if lookback < 2 {
            return Err(EngineError::Configuration(
                "lookback must be at least 2".to_string(),
            ));
        }
        if entry_z <= 0.0 || exit_z < 0.0 || exit_z >= entry_z {
            return Err(EngineError::Configuration(format!(
                "need 0 <= exit_z < entry_z, got exit_z={exit_z}, entry_z={entry_z}"
            )));
        }

        Ok(Self {
            params,
            lookback,
            entry_z,
            exit_z,
        })
    }

    fn defaults() -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("lookback".into(), json!(20));
        map.insert("entry_z".into(), json!(2.0));
        map.insert("exit_z".into(), json!(0.5));
        map
    }

    fn next_position(&self, current: Position, z: f64) -> Position {
        if z.is_nan() {
            return Position::Flat;
        }
        match current {
            Position::Long if z < -self.exit_z => Position::Long,
            Position::Short if z > self.exit_z => Position::Short,
            _ if z <= -self.entry_z => Position::Long,
            _ if z >= self.entry_z => Position::Short,
            _ => Position::Flat,
        }
    }
}

impl StrategyProducer for ZScoreReversion {
    fn name(&self) -> &str {
        NAME
    }

    fn default_params(&self) -> ParamMap {
        Self::defaults()
    }

    fn params(&self) -> &ParamMap {
        &self.params
    }

    fn indicators(&self, series: &PriceSeries) -> EngineResult<EnrichedSeries> {
        let mut enriched = EnrichedSeries::new(series.clone());
        enriched.add_column("zscore", rolling_zscore(&series.closes(), self.lookback))?;
        Ok(enriched)
    }

    fn signals(&self, enriched: &EnrichedSeries) -> EngineResult<SignalSeries> {
        let zscores = enriched.require_column("zscore")?;
        let mut current = Position::Flat;
        let positions = zscores
            .iter()
            .map(|&z| {
                current = self.next_position(current, z);
                current
            })
            .collect();
        Ok(SignalSeries::from_positions(positions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> ZScoreReversion {
        ZScoreReversion::new(None).unwrap()
    }

    #[test]
    fn test_entry_and_hold_until_exit() {
        let s = strategy();
        let mut pos = Position::Flat;
        pos = s.next_position(pos, -2.5);
        assert_eq!(pos, Position::Long);
        // Still below -exit_z: keep holding.
        pos = s.next_position(pos, -1.0);
        assert_eq!(pos, Position::Long);
        pos = s.next_position(pos, -0.2);
        assert_eq!(pos, Position::Flat);
    }

    #[test]
    fn test_short_side_and_flip() {
        let s = strategy();
        let pos = s.next_position(Position::Flat, 2.0);
        assert_eq!(pos, Position::Short);
        // A reading beyond the opposite band flips directly.
        assert_eq!(s.next_position(pos, -3.0), Position::Long);
    }

    #[test]
    fn test_nan_is_flat() {
        assert_eq!(strategy().next_position(Position::Long, f64::NAN), Position::Flat);
    }

    #[test]
    fn test_invalid_bands() {
        let mut overrides = ParamMap::new();
        overrides.insert("exit_z".into(), json!(3.0));
        assert!(matches!(
            ZScoreReversion::new(Some(&overrides)),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_produces_aligned_signals() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + ((i as f64) * 0.7).sin() * 5.0)
            .collect();
        let series = crate::tests::series_from_closes(&closes);
        let signals = strategy().produce(&series).unwrap();
        assert_eq!(signals.len(), 60);
        assert!(signals.as_slice()[..19].iter().all(|p| *p == Position::Flat));
    }
}
