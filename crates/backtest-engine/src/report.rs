use std::collections::BTreeMap;

use sigma_core::precision::{round_dp, round_usd};
use sigma_core::{EngineResult, PriceSeries, StrategyProducer};
use tracing::info;

use crate::cost_model::CostModel;
use crate::metrics::compute_metrics;
use crate::models::{
    BacktestReport, DateRange, EquityPoint, MonteCarloConfig, MonthlyReturn, Trade, TradeRecord,
};
use crate::monte_carlo::run_monte_carlo;
use crate::overfitting::{check_overfit_flags, grade_with_flags, overfit_diagnostics};
use crate::simulator::simulate;

/// Knobs for report assembly that do not affect trading results.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Lower bound for the equity-curve sampling interval.
    pub equity_min_sample: usize,
    /// Variants tried before this one, for the deflated Sharpe ratio.
    pub trials: usize,
    /// Resample the trade list when set.
    pub monte_carlo: Option<MonteCarloConfig>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            equity_min_sample: 10,
            trials: 1,
            monte_carlo: None,
        }
    }
}

/// Net P&L per calendar month, attributed to each trade's exit bar, sorted by month.
pub fn monthly_returns(trades: &[Trade], series: &PriceSeries) -> Vec<MonthlyReturn> {
    if series.is_empty() {
        return Vec::new();
    }

    let last = series.len() - 1;
    let mut by_month: BTreeMap<String, f64> = BTreeMap::new();
    for trade in trades {
        if let Some(bar) = series.get(trade.exit_bar.min(last)) {
            *by_month
                .entry(bar.timestamp.format("%Y-%m").to_string())
                .or_insert(0.0) += trade.pnl;
        }
    }

    by_month
        .into_iter()
        .map(|(month, pnl)| MonthlyReturn {
            month,
            pnl: round_usd(pnl),
        })
        .collect()
}

/// Sampling interval for a series of `total_bars`: about 1% of the bars,
/// never below `min_sample`.
pub fn equity_sample_interval(total_bars: usize, min_sample: usize) -> usize {
    min_sample.max(total_bars / 100).max(1)
}

/// Cumulative realised P&L by bar, sampled every `sample_every` bars.
/// The final bar is always included.
pub fn equity_curve(trades: &[Trade], total_bars: usize, sample_every: usize) -> Vec<EquityPoint> {
    if total_bars == 0 {
        return Vec::new();
    }
    let step = sample_every.max(1);

    let mut bar_pnl = vec![0.0; total_bars];
    for trade in trades {
        if trade.exit_bar < total_bars {
            bar_pnl[trade.exit_bar] += trade.pnl;
        }
    }

    let mut equity = Vec::with_capacity(total_bars);
    let mut running = 0.0;
    for pnl in &bar_pnl {
        running += pnl;
        equity.push(running);
    }

    let mut points: Vec<EquityPoint> = (0..total_bars)
        .step_by(step)
        .map(|bar| EquityPoint {
            bar,
            equity: round_usd(equity[bar]),
        })
        .collect();

    if (total_bars - 1) % step != 0 {
        points.push(EquityPoint {
            bar: total_bars - 1,
            equity: round_usd(equity[total_bars - 1]),
        });
    }
    points
}

impl From<&Trade> for TradeRecord {
    fn from(t: &Trade) -> Self {
        TradeRecord {
            entry_bar: t.entry_bar,
            exit_bar: t.exit_bar,
            side: t.side,
            entry_price: round_dp(t.entry_price, 4),
            exit_price: round_dp(t.exit_price, 4),
            pnl: round_usd(t.pnl),
            mfe: round_usd(t.mfe),
            mae: round_usd(t.mae),
        }
    }
}

pub fn date_range(series: &PriceSeries) -> DateRange {
    DateRange {
        start: series
            .first_timestamp()
            .map(|t| t.format("%Y-%m-%d").to_string()),
        end: series
            .last_timestamp()
            .map(|t| t.format("%Y-%m-%d").to_string()),
    }
}

/// Run a strategy over the full series and assemble the result document.
pub fn run_backtest(
    series: &PriceSeries,
    strategy: &dyn StrategyProducer,
    cost_model: &CostModel,
    data_file: &str,
) -> EngineResult<BacktestReport> {
    run_backtest_with(series, strategy, cost_model, data_file, &ReportOptions::default())
}

pub fn run_backtest_with(
    series: &PriceSeries,
    strategy: &dyn StrategyProducer,
    cost_model: &CostModel,
    data_file: &str,
    options: &ReportOptions,
) -> EngineResult<BacktestReport> {
    let total_bars = series.len();
    let signals = strategy.produce(series)?;
    let trades = simulate(series, &signals, cost_model)?;
    let metrics = compute_metrics(&trades);

    let monthly = monthly_returns(&trades, series);
    let equity = equity_curve(
        &trades,
        total_bars,
        equity_sample_interval(total_bars, options.equity_min_sample),
    );
    let flags = check_overfit_flags(&metrics, &monthly);
    let outcome = grade_with_flags(&metrics, flags);

    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let diagnostics = overfit_diagnostics(&pnls, options.trials);
    let monte_carlo = options
        .monte_carlo
        .as_ref()
        .map(|config| run_monte_carlo(&trades, config));

    info!(
        strategy = strategy.name(),
        bars = total_bars,
        trades = metrics.total_trades,
        sharpe = metrics.sharpe_ratio,
        grade = outcome.grade.as_str(),
        "Backtest complete"
    );

    Ok(BacktestReport {
        strategy_name: strategy.name().to_string(),
        data_file: data_file.to_string(),
        bars_tested: total_bars,
        date_range: date_range(series),
        cost_model: cost_model.clone(),
        metrics,
        monthly_returns: monthly,
        equity_curve: equity,
        trade_log: trades.iter().map(TradeRecord::from).collect(),
        anti_overfit_flags: flags,
        overfit_diagnostics: diagnostics,
        monte_carlo,
        passed: outcome.passed,
        grade: outcome.grade,
    })
}
