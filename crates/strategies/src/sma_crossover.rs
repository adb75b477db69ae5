use serde_json::json;
use sigma_core::{
    EngineError, EngineResult, EnrichedSeries, ParamMap, Position, PriceSeries, SignalSeries,
    StrategyProducer,
};

use crate::indicators::{atr, sma};
use crate::params::{get_f64, get_period, merge_params};

pub const NAME: &str = "sma_crossover";

/// Fast/slow simple moving average crossover.
///
/// Long while the fast SMA is above the slow SMA, short while it is below,
/// flat when they are equal or either is still warming up. An ATR column is
/// published alongside for stop placement.
#[derive(Debug, Clone)]
pub struct SmaCrossover {
    params: ParamMap,
    fast_period: usize,
    slow_period: usize,
    atr_period: usize,
}

impl SmaCrossover {
    pub fn new(overrides: Option<&ParamMap>) -> EngineResult<Self> {
        let params = merge_params(NAME, Self::defaults(), overrides)?;
        let fast_period = get_period(&params, "fast_period")?;
        let slow_period = get_period(&params, "slow_period")?;
        let atr_period = get_period(&params, "atr_period")?;
        let atr_multiplier = get_f64(&params, "atr_multiplier")?;

        if fast_period >= slow_period {
            return Err(EngineError::Configuration(format!(
                "fast_period ({fast_period}) must be less than slow_period ({slow_period})"
            )));
        }
        if atr_multiplier <= 0.0 {
            return Err(EngineError::Configuration(
                "atr_multiplier must be positive".to_string(),
            ));
        }

        Ok(Self {
            params,
            fast_period,
            slow_period,
            atr_period,
        })
    }

    fn defaults() -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("fast_period".into(), json!(10));
        map.insert("slow_period".into(), json!(30));
        map.insert("atr_period".into(), json!(14));
        map.insert("atr_multiplier".into(), json!(2.0));
        map
    }
}

impl StrategyProducer for SmaCrossover {
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
        let closes = series.closes();
        let mut enriched = EnrichedSeries::new(series.clone());
        enriched.add_column("sma_fast", sma(&closes, self.fast_period))?;
        enriched.add_column("sma_slow", sma(&closes, self.slow_period))?;
        enriched.add_column("atr", atr(series, self.atr_period))?;
        Ok(enriched)
    }

    fn signals(&self, enriched: &EnrichedSeries) -> EngineResult<SignalSeries> {
        let fast = enriched.require_column("sma_fast")?;
        let slow = enriched.require_column("sma_slow")?;

        // NaN comparisons are false, so warm-up bars stay flat.
        let positions = fast
            .iter()
            .zip(slow)
            .map(|(f, s)| {
                if f > s {
                    Position::Long
                } else if f < s {
                    Position::Short
                } else {
                    Position::Flat
                }
            })
            .collect();
        Ok(SignalSeries::from_positions(positions))
    }
}
