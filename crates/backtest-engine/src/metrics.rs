use sigma_core::precision::{round_ratio, round_usd};
use sigma_core::stats::{mean, population_std};

use crate::models::{MetricsBundle, Trade};

/// Annualisation factor applied to the per-trade Sharpe ratio.
pub const ANNUALIZATION_FACTOR: f64 = 252.0;

/// Compute the metrics bundle for a trade list.
///
/// Everything is computed at full precision and rounded once at the end:
/// dollar amounts and holding bars to 2 dp, ratios to 4 dp.
pub fn compute_metrics(trades: &[Trade]) -> MetricsBundle {
    if trades.is_empty() {
        return MetricsBundle::default();
    }

    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let n = pnls.len();
    let total_pnl: f64 = pnls.iter().sum();

    let sharpe = sharpe_ratio(&pnls);
    let (max_dd_dollars, max_dd_pct) = max_drawdown(&pnls);

    let winners: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losers: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

    let gross_profit: f64 = winners.iter().sum();
    let gross_loss: f64 = losers.iter().sum::<f64>().abs();
    let profit_factor = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else {
        f64::INFINITY
    };

    let holding: Vec<f64> = trades.iter().map(|t| t.holding_bars() as f64).collect();
    let avg_trade_pnl = total_pnl / n as f64;

    let calmar = if max_dd_dollars > 0.0 {
        (total_pnl / max_dd_dollars).abs()
    } else {
        0.0
    };

    MetricsBundle {
        total_pnl: round_usd(total_pnl),
        sharpe_ratio: round_ratio(sharpe),
        max_drawdown: round_ratio(max_dd_pct),
        max_drawdown_dollars: round_usd(max_dd_dollars),
        win_rate: round_ratio(winners.len() as f64 / n as f64),
        profit_factor: round_ratio(profit_factor),
        total_trades: n,
        avg_trade_pnl: round_usd(avg_trade_pnl),
        avg_winner: round_usd(mean(&winners)),
        avg_loser: round_usd(mean(&losers)),
        max_consecutive_losses: max_consecutive_losses(&pnls),
        avg_holding_bars: round_usd(mean(&holding)),
        expectancy: round_usd(avg_trade_pnl),
        calmar_ratio: round_ratio(calmar),
    }
}

/// Per-trade Sharpe: mean / population std, annualised by sqrt(252).
pub fn sharpe_ratio(pnls: &[f64]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let std = population_std(pnls);
    if std > 0.0 {
        mean(pnls) / std * ANNUALIZATION_FACTOR.sqrt()
    } else {
        0.0
    }
}

/// Returns `(dollars, fraction)`.
///
/// The running peak starts at the first trade's equity, not at zero. The
/// fraction divides by the highest peak reached anywhere in the series.
pub fn max_drawdown(pnls: &[f64]) -> (f64, f64) {
    let mut equity = 0.0;
    let mut running_peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;

    for pnl in pnls {
        equity += pnl;
        running_peak = running_peak.max(equity);
        max_dd = max_dd.max(running_peak - equity);
    }

    let pct = if running_peak > 0.0 {
        max_dd / running_peak
    } else {
        0.0
    };
    (max_dd, pct)
}

/// Longest run of strictly negative P&L.
pub fn max_consecutive_losses(pnls: &[f64]) -> usize {
    let mut max_streak = 0;
    let mut current = 0;
    for pnl in pnls {
        if *pnl < 0.0 {
            current += 1;
            max_streak = max_streak.max(current);
        } else {
            current = 0;
        }
    }
    max_streak
}
