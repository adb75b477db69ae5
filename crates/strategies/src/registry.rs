use sigma_core::{EngineError, EngineResult, ParamMap, StrategyProducer};
use tracing::debug;

use crate::sma_crossover::{self, SmaCrossover};
use crate::zscore_reversion::{self, ZScoreReversion};

/// Names accepted by [`create_strategy`].
pub fn available_strategies() -> &'static [&'static str] {
    &[sma_crossover::NAME, zscore_reversion::NAME]
}

/// Builds a fresh strategy instance by name. `params` override the strategy's
/// defaults key by key.
pub fn create_strategy(
    name: &str,
    params: Option<&ParamMap>,
) -> EngineResult<Box<dyn StrategyProducer>> {
    let strategy: Box<dyn StrategyProducer> = match name.trim().to_ascii_lowercase().as_str() {
        sma_crossover::NAME => Box::new(SmaCrossover::new(params)?),
        zscore_reversion::NAME => Box::new(ZScoreReversion::new(params)?),
        other => {
            return Err(EngineError::Configuration(format!(
                "Unknown strategy '{other}' (available: {})",
                available_strategies().join(", ")
            )))
        }
    };
    debug!(strategy = strategy.name(), params = ?strategy.params(), "Strategy created");
    Ok(strategy)
}
