use crate::error::{EngineError, EngineResult};
use crate::types::{EnrichedSeries, ParamMap, PriceSeries, SignalSeries};

/// A strategy turns a price series into one desired position per bar.
///
/// Implementations compute indicator columns first, then derive signals from
/// them. Both stages must only look at data up to and including the bar they
/// produce a value for; the simulator adds the one-bar execution lag.
pub trait StrategyProducer: Send {
    fn name(&self) -> &str;

    fn default_params(&self) -> ParamMap;

    /// Effective parameters (defaults merged with overrides).
    fn params(&self) -> &ParamMap;

    fn indicators(&self, series: &PriceSeries) -> EngineResult<EnrichedSeries>;

    fn signals(&self, enriched: &EnrichedSeries) -> EngineResult<SignalSeries>;

    /// Run both stages and check the output is aligned with the input.
    fn produce(&self, series: &PriceSeries) -> EngineResult<SignalSeries> {
        let enriched = self.indicators(series)?;
        let signals = self.signals(&enriched)?;
        if signals.len() != series.len() {
            return Err(EngineError::Data(format!(
                "strategy '{}' produced {} signals for {} bars",
                self.name(),
                signals.len(),
                series.len()
            )));
        }
        Ok(signals)
    }
}
