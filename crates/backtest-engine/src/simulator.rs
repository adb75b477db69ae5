use sigma_core::{EngineError, EngineResult, Position, PriceBar, PriceSeries, Side, SignalSeries};
use tracing::debug;

use crate::cost_model::CostModel;
use crate::models::Trade;

/// Position held between an entry fill and its exit.
#[derive(Debug, Clone)]
struct OpenPosition {
    side: Side,
    entry_bar: usize,
    entry_price: f64,
    mfe: f64,
    mae: f64,
}

impl OpenPosition {
    fn new(side: Side, entry_bar: usize, entry_price: f64) -> Self {
        Self {
            side,
            entry_bar,
            entry_price,
            mfe: 0.0,
            mae: 0.0,
        }
    }

    fn position(&self) -> Position {
        match self.side {
            Side::Long => Position::Long,
            Side::Short => Position::Short,
        }
    }

    fn update_excursions(&mut self, bar: &PriceBar) {
        let (favourable, adverse) = match self.side {
            Side::Long => (bar.high - self.entry_price, bar.low - self.entry_price),
            Side::Short => (self.entry_price - bar.low, self.entry_price - bar.high),
        };
        self.mfe = self.mfe.max(favourable);
        self.mae = self.mae.min(adverse);
    }

    fn close(self, exit_bar: usize, exit_price: f64, cost_model: &CostModel) -> Trade {
        let raw = match self.side {
            Side::Long => exit_price - self.entry_price,
            Side::Short => self.entry_price - exit_price,
        };
        let cost = cost_model.round_trip_cost(self.entry_price.abs());
        Trade {
            entry_bar: self.entry_bar,
            exit_bar,
            side: self.side,
            entry_price: self.entry_price,
            exit_price,
            pnl: raw - cost,
            mfe: self.mfe,
            mae: self.mae,
        }
    }
}

/// Convert a per-bar position series into closed trades.
///
/// Execution model:
/// - The signal on bar `i-1` is acted on at the OPEN of bar `i`, never on the
///   bar that produced it.
/// - A change of desired position first closes any open position at that
///   open, then opens the new one at the same price (reversals are two fills).
/// - MFE/MAE track each bar's high/low while the position is open, starting
///   with the entry bar.
/// - A position still open after the last bar is closed at that bar's CLOSE.
/// - Each trade pays one round-trip cost on a notional of one unit at the
///   entry price.
pub fn simulate(
    series: &PriceSeries,
    signals: &SignalSeries,
    cost_model: &CostModel,
) -> EngineResult<Vec<Trade>> {
    if signals.len() != series.len() {
        return Err(EngineError::Data(format!(
            "signal length {} does not match price series length {}",
            signals.len(),
            series.len()
        )));
    }

    let bars = series.bars();
    let desired = signals.as_slice();
    let n = bars.len();
    let mut trades = Vec::new();
    if n < 2 {
        return Ok(trades);
    }

    let mut open: Option<OpenPosition> = None;

    for i in 1..n {
        let target = desired[i - 1];
        let current = open.as_ref().map_or(Position::Flat, OpenPosition::position);

        if target != current {
            let fill = bars[i].open;
            if let Some(position) = open.take() {
                trades.push(position.close(i, fill, cost_model));
            }
            open = target.side().map(|side| OpenPosition::new(side, i, fill));
        }

        if let Some(position) = open.as_mut() {
            position.update_excursions(&bars[i]);
        }
    }

    if let Some(position) = open.take() {
        trades.push(position.close(n - 1, bars[n - 1].close, cost_model));
    }

    debug!(bars = n, trades = trades.len(), "Simulation complete");
    Ok(trades)
}
