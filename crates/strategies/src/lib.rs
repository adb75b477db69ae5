//! Reference strategies for the backtest engine and the name-keyed registry
//! the runner resolves them through.

pub mod indicators;
pub mod params;
pub mod registry;
pub mod sma_crossover;
pub mod zscore_reversion;


pub use registry::{available_strategies, create_strategy};
pub use sma_crossover::SmaCrossover;
pub use zscore_reversion::ZScoreReversion;
