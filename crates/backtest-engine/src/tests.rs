use std::sync::atomic::{AtomicUsize, Ordering};

use approx::assert_relative_eq;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use sigma_core::{
    EngineError, EngineResult, EnrichedSeries, ParamMap, Position, PriceBar, PriceSeries,
    SignalSeries, StrategyProducer,
};

use crate::cost_model::CostModel;
use crate::models::*;
use crate::report::{run_backtest, run_backtest_with, ReportOptions};
use crate::simulator::simulate;
use crate::walk_forward::{run_walk_forward, WalkForwardOptions};
use crate::{compute_metrics, grade};

/// Helper: bars with open = high = low = close, one hour apart.
fn flat_bars(prices: &[f64]) -> PriceSeries {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    PriceSeries::new(
        prices
            .iter()
            .enumerate()
            .map(|(i, &p)| PriceBar {
                timestamp: start + Duration::hours(i as i64),
                open: p,
                high: p,
                low: p,
                close: p,
                volume: 1.0,
            })
            .collect(),
    )
    .unwrap()
}

/// Helper: a wavy daily series spanning several months.
fn wave_series(days: usize) -> PriceSeries {
    let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    PriceSeries::new(
        (0..days)
            .map(|i| {
                let x = i as f64;
                let close = 100.0 + 10.0 * (x / 7.0).sin() + 3.0 * (x / 2.3).cos() + x * 0.05;
                PriceBar {
                    timestamp: start + Duration::days(i as i64),
                    open: close - 0.3,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1_000.0,
                }
            })
            .collect(),
    )
    .unwrap()
}

/// Long after an up-close, short after a down-close.
struct MomentumStub {
    params: ParamMap,
}

impl MomentumStub {
    fn new() -> Self {
        Self {
            params: ParamMap::new(),
        }
    }
}

impl StrategyProducer for MomentumStub {
    fn name(&self) -> &str {
        "momentum_stub"
    }

    fn default_params(&self) -> ParamMap {
        ParamMap::new()
    }

    fn params(&self) -> &ParamMap {
        &self.params
    }

    fn indicators(&self, series: &PriceSeries) -> EngineResult<EnrichedSeries> {
        let closes = series.closes();
        let mut change = vec![f64::NAN; closes.len()];
        for i in 1..closes.len() {
            change[i] = closes[i] - closes[i - 1];
        }
        let mut enriched = EnrichedSeries::new(series.clone());
        enriched.add_column("change", change)?;
        Ok(enriched)
    }

    fn signals(&self, enriched: &EnrichedSeries) -> EngineResult<SignalSeries> {
        let change = enriched.require_column("change")?;
        Ok(SignalSeries::from_positions(
            change
                .iter()
                .map(|c| {
                    if *c > 0.0 {
                        Position::Long
                    } else if *c < 0.0 {
                        Position::Short
                    } else {
                        Position::Flat
                    }
                })
                .collect(),
        ))
    }
}

/// Returns a fixed signal vector regardless of input length.
struct FixedSignals(Vec<i64>);

impl StrategyProducer for FixedSignals {
    fn name(&self) -> &str {
        "fixed"
    }

    fn default_params(&self) -> ParamMap {
        ParamMap::new()
    }

    fn params(&self) -> &ParamMap {
        static EMPTY: std::sync::OnceLock<ParamMap> = std::sync::OnceLock::new();
        EMPTY.get_or_init(ParamMap::new)
    }

    fn indicators(&self, series: &PriceSeries) -> EngineResult<EnrichedSeries> {
        Ok(EnrichedSeries::new(series.clone()))
    }

    fn signals(&self, _enriched: &EnrichedSeries) -> EngineResult<SignalSeries> {
        SignalSeries::from_raw(&self.0)
    }
}

fn boxed_momentum() -> EngineResult<Box<dyn StrategyProducer>> {
    Ok(Box::new(MomentumStub::new()))
}

// =============================================================================
// Test 1: Round-trip scenario with the one-bar lag
// =============================================================================

#[test]
fn test_round_trip_scenario_lagged_entry() {
    let series = flat_bars(&[100.0, 101.0, 99.0, 102.0, 105.0]);
    let signals = SignalSeries::from_raw(&[0, 1, 1, 1, 0]).unwrap();
    let trades = simulate(&series, &signals, &CostModel::default()).unwrap();

    // Signal on bar 1 fills at bar 2's open; still long at the end, flushed at bar 4's close
    assert_eq!(trades.len(), 1);
    let t = &trades[0];
    assert_eq!(t.entry_bar, 2);
    assert_eq!(t.entry_price, 99.0);
    assert_eq!(t.exit_bar, 4);
    assert_eq!(t.exit_price, 105.0);
    assert_relative_eq!(t.pnl, 6.0 - 17.5);
}

#[test]
fn test_round_trip_scenario_exit_on_open() {
    let series = flat_bars(&[100.0, 101.0, 99.0, 102.0, 105.0]);
    let signals = SignalSeries::from_raw(&[1, 1, 0, 0, 0]).unwrap();
    let trades = simulate(&series, &signals, &CostModel::default()).unwrap();

    assert_eq!(trades.len(), 1);
    let t = &trades[0];
    assert_eq!((t.entry_bar, t.exit_bar), (1, 3));
    assert_eq!((t.entry_price, t.exit_price), (101.0, 102.0));
    assert_relative_eq!(t.pnl, -16.5);

    let metrics = compute_metrics(&trades);
    assert_eq!(metrics.total_trades, 1);
    assert_relative_eq!(metrics.total_pnl, -16.5);
    assert_eq!(metrics.win_rate, 0.0);
    assert_eq!(metrics.profit_factor, 0.0);
    assert_eq!(metrics.max_consecutive_losses, 1);
}

// =============================================================================
// Test 2: Signal on the last bar is never executed
// =============================================================================

#[test]
fn test_last_bar_signal_ignored() {
    let series = flat_bars(&[100.0, 101.0, 102.0]);
    let signals = SignalSeries::from_raw(&[0, 0, 1]).unwrap();
    let trades = simulate(&series, &signals, &CostModel::default()).unwrap();
    assert!(trades.is_empty());
}

// =============================================================================
// Test 3: Entry on the final bar is flushed on the same bar
// =============================================================================

#[test]
fn test_entry_on_final_bar_flushes_at_close() {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let bars = vec![
        PriceBar { timestamp: start, open: 10.0, high: 10.0, low: 10.0, close: 10.0, volume: 0.0 },
        PriceBar {
            timestamp: start + Duration::hours(1),
            open: 11.0,
            high: 13.0,
            low: 10.5,
            close: 12.0,
            volume: 0.0,
        },
    ];
    let series = PriceSeries::new(bars).unwrap();
    let signals = SignalSeries::from_raw(&[1, 1]).unwrap();
    let free = CostModel::from_value(&json!({"commission_per_side": 0, "slippage_ticks": 0})).unwrap();
    let trades = simulate(&series, &signals, &free).unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!((trades[0].entry_bar, trades[0].exit_bar), (1, 1));
    assert_relative_eq!(trades[0].pnl, 1.0);
    assert_relative_eq!(trades[0].mfe, 2.0);
    assert_relative_eq!(trades[0].mae, -0.5);
}

// =============================================================================
// Test 4: Trade invariants over a realistic run
// =============================================================================

#[test]
fn test_trade_invariants() {
    let series = wave_series(300);
    let signals = MomentumStub::new().produce(&series).unwrap();
    let trades = simulate(&series, &signals, &CostModel::default()).unwrap();

    assert!(!trades.is_empty());
    for pair in trades.windows(2) {
        assert!(pair[0].exit_bar <= pair[1].entry_bar);
    }
    for t in &trades {
        assert!(t.entry_bar >= 1, "entry on bar 0 is impossible with the lag");
        assert!(t.entry_bar <= t.exit_bar);
        assert!(t.mfe >= 0.0);
        assert!(t.mae <= 0.0);
        let bar = &series.bars()[t.entry_bar];
        assert_eq!(t.entry_price, bar.open);
    }
}

// =============================================================================
// Test 5: Cost model linearity through the simulator
// =============================================================================

#[test]
fn test_cex_cost_linear_in_price_level() {
    let cex = CostModel::default_for("crypto_cex").unwrap();
    let low = flat_bars(&[100.0, 100.0, 110.0]);
    let high = flat_bars(&[200.0, 200.0, 220.0]);
    let signals = SignalSeries::from_raw(&[1, 1, 1]).unwrap();

    let t_low = &simulate(&low, &signals, &cex).unwrap()[0];
    let t_high = &simulate(&high, &signals, &cex).unwrap()[0];
    let cost_low = 10.0 - t_low.pnl;
    let cost_high = 20.0 - t_high.pnl;
    assert_relative_eq!(cost_high, 2.0 * cost_low, epsilon = 1e-9);
}

// =============================================================================
// Test 6: Full report document
// =============================================================================

#[test]
fn test_run_backtest_report() {
    let series = wave_series(400);
    let strategy = MomentumStub::new();
    let report = run_backtest(&series, &strategy, &CostModel::default(), "data/wave.csv").unwrap();

    assert_eq!(report.strategy_name, "momentum_stub");
    assert_eq!(report.bars_tested, 400);
    assert_eq!(report.date_range.start.as_deref(), Some("2023-01-02"));
    assert_eq!(report.trade_log.len(), report.metrics.total_trades);
    assert!(!report.monthly_returns.is_empty());
    assert_eq!(report.equity_curve.last().map(|p| p.bar), Some(399));

    let expected = grade(&report.metrics, &report.monthly_returns);
    assert_eq!(report.grade, expected.grade);
    assert_eq!(report.passed, expected.passed);

    let value = serde_json::to_value(&report).unwrap();
    assert!(value.get("pass").is_some());
    assert_eq!(value["cost_model"]["type"], "futures");
    assert!(value["metrics"]["sharpe_ratio"].is_number());
}

#[test]
fn test_strategy_output_length_checked() {
    let series = flat_bars(&[1.0, 2.0, 3.0]);
    let result = run_backtest(&series, &FixedSignals(vec![0, 1]), &CostModel::default(), "x.csv");
    assert!(matches!(result, Err(EngineError::Data(_))));

    let result = run_backtest(&series, &FixedSignals(vec![0, 5, 1]), &CostModel::default(), "x.csv");
    assert!(matches!(result, Err(EngineError::InvalidSignal { index: 1, value: 5 })));
}

#[test]
fn test_metrics_json_infinite_profit_factor() {
    let series = flat_bars(&[100.0, 100.0, 150.0]);
    let free = CostModel::from_value(&json!({"commission_per_side": 0, "slippage_ticks": 0})).unwrap();
    let report = run_backtest(&series, &FixedSignals(vec![1, 1, 1]), &free, "x.csv").unwrap();

    assert!(report.metrics.profit_factor.is_infinite());
    let value = serde_json::to_value(&report.metrics).unwrap();
    assert_eq!(value["profit_factor"], "inf");

    let back: MetricsBundle = serde_json::from_value(value).unwrap();
    assert!(back.profit_factor.is_infinite());
}

#[test]
fn test_metrics_accept_legacy_names() {
    let legacy = json!({
        "totalPnl": 10.0, "sharpe": 1.2, "maxDrawdown": 0.1, "max_drawdown_dollars": 5.0,
        "winRate": 0.5, "profitFactor": 1.5, "totalTrades": 40, "avg_trade_pnl": 0.25,
        "avg_winner": 2.0, "avg_loser": -1.0, "max_consecutive_losses": 3,
        "avg_holding_bars": 4.0, "expectancy": 0.25, "calmar_ratio": 2.0
    });
    let m: MetricsBundle = serde_json::from_value(legacy).unwrap();
    assert_eq!(m.sharpe_ratio, 1.2);
    assert_eq!(m.total_trades, 40);
}

// =============================================================================
// Test 7: Walk-forward
// =============================================================================

#[test]
fn test_walk_forward_fold_layout() {
    let series = wave_series(1_000);
    let config = WalkForwardConfig { train_bars: 500, test_bars: 100, step_bars: None };
    let report = run_walk_forward(
        &series,
        boxed_momentum,
        &CostModel::default(),
        &config,
        "wave.csv",
        &WalkForwardOptions::default(),
    )
    .unwrap();

    assert_eq!(report.mode, "walk_forward");
    assert_eq!(report.total_folds, 5);
    let starts: Vec<usize> = report.folds.iter().map(|f| f.train_range.start).collect();
    assert_eq!(starts, vec![0, 100, 200, 300, 400]);
    for (i, fold) in report.folds.iter().enumerate() {
        assert_eq!(fold.fold_index, i + 1);
        assert_eq!(fold.train_range.len(), 500);
        assert_eq!(fold.test_range.len(), 100);
        assert_eq!(fold.train_range.end, fold.test_range.start);
    }

    let total: f64 = report.folds.iter().map(|f| f.out_of_sample.total_pnl).sum();
    assert_relative_eq!(report.aggregate.total_oos_pnl, sigma_core::precision::round_usd(total));
}

#[test]
fn test_walk_forward_fresh_strategy_per_slice() {
    let created = AtomicUsize::new(0);
    let factory = || -> EngineResult<Box<dyn StrategyProducer>> {
        created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MomentumStub::new()))
    };
    let series = wave_series(300);
    let config = WalkForwardConfig { train_bars: 100, test_bars: 50, step_bars: Some(50) };
    let report = run_walk_forward(
        &series,
        factory,
        &CostModel::default(),
        &config,
        "wave.csv",
        &WalkForwardOptions { parallel: false, ..WalkForwardOptions::default() },
    )
    .unwrap();

    assert_eq!(report.total_folds, 4);
    // One instance for the name, then two per fold
    assert_eq!(created.load(Ordering::SeqCst), 1 + 2 * 4);
}

#[test]
fn test_walk_forward_parallel_matches_sequential() {
    let series = wave_series(600);
    let config = WalkForwardConfig { train_bars: 200, test_bars: 50, step_bars: Some(25) };
    let run = |parallel| {
        run_walk_forward(
            &series,
            boxed_momentum,
            &CostModel::default(),
            &config,
            "wave.csv",
            &WalkForwardOptions { parallel, ..WalkForwardOptions::default() },
        )
        .unwrap()
    };
    let seq = run(false);
    let par = run(true);

    assert_eq!(seq.total_folds, par.total_folds);
    for (a, b) in seq.folds.iter().zip(par.folds.iter()) {
        assert_eq!(a.fold_index, b.fold_index);
        assert_eq!(a.in_sample, b.in_sample);
        assert_eq!(a.out_of_sample, b.out_of_sample);
        assert_eq!(a.oos_decay_pct, b.oos_decay_pct);
    }
    assert_eq!(seq.aggregate, par.aggregate);
}

#[test]
fn test_walk_forward_decay_definition() {
    let series = wave_series(400);
    let config = WalkForwardConfig { train_bars: 150, test_bars: 50, step_bars: None };
    let report = run_walk_forward(
        &series,
        boxed_momentum,
        &CostModel::default(),
        &config,
        "wave.csv",
        &WalkForwardOptions::default(),
    )
    .unwrap();

    for fold in &report.folds {
        let is = fold.in_sample.sharpe_ratio;
        let expected = if is != 0.0 {
            (1.0 - fold.out_of_sample.sharpe_ratio / is) * 100.0
        } else {
            0.0
        };
        assert_relative_eq!(fold.oos_decay_pct, expected, epsilon = 0.005 + 1e-9);
    }
    let max = report.folds.iter().map(|f| f.oos_decay_pct).fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(report.aggregate.max_oos_decay_pct, max);
}

#[test]
fn test_walk_forward_too_short_has_no_folds() {
    let series = wave_series(100);
    let config = WalkForwardConfig { train_bars: 100, test_bars: 20, step_bars: None };
    let report = run_walk_forward(
        &series,
        boxed_momentum,
        &CostModel::default(),
        &config,
        "wave.csv",
        &WalkForwardOptions::default(),
    )
    .unwrap();
    assert_eq!(report.total_folds, 0);
    assert!(report.folds.is_empty());
    assert_eq!(report.aggregate, WalkForwardAggregate::default());
}

// =============================================================================
// Test 8: Overfitting diagnostics and trade resampling in reports
// =============================================================================

#[test]
fn test_report_carries_diagnostics_and_resampling() {
    let series = wave_series(400);
    let strategy = MomentumStub::new();
    let plain = run_backtest(&series, &strategy, &CostModel::default(), "wave.csv").unwrap();
    assert!(plain.monte_carlo.is_none());
    let value = serde_json::to_value(&plain).unwrap();
    assert!(value.get("monte_carlo").is_none());
    assert!(value.get("overfit_diagnostics").is_some());

    let options = ReportOptions {
        trials: 25,
        monte_carlo: Some(MonteCarloConfig {
            num_simulations: 200,
            block_size: 1,
            seed: Some(11),
        }),
        ..ReportOptions::default()
    };
    let report = run_backtest_with(&series, &strategy, &CostModel::default(), "wave.csv", &options).unwrap();

    let dsr = report.overfit_diagnostics.deflated_sharpe.expect("enough trades for a Sharpe");
    assert_eq!(dsr.trials, 25);
    assert_eq!(dsr.observations, report.metrics.total_trades);
    assert!(dsr.null_benchmark > 0.0);
    let single = plain.overfit_diagnostics.deflated_sharpe.unwrap();
    assert!(dsr.probability <= single.probability);

    let mc = report.monte_carlo.expect("resampling requested");
    assert_eq!(mc.simulations, 200);
    assert!(mc.percentile_5 <= mc.median_pnl && mc.median_pnl <= mc.percentile_95);
    // Resampling with replacement keeps the trade count, so the mean total tracks the real one
    assert_relative_eq!(mc.mean_pnl, report.metrics.total_pnl, epsilon = report.metrics.total_pnl.abs() * 0.5 + 500.0);
}

#[test]
fn test_walk_forward_pools_oos_trades_for_diagnostics() {
    let series = wave_series(600);
    let config = WalkForwardConfig { train_bars: 200, test_bars: 100, step_bars: None };
    let report = run_walk_forward(
        &series,
        boxed_momentum,
        &CostModel::default(),
        &config,
        "wave.csv",
        &WalkForwardOptions { trials: 4, ..WalkForwardOptions::default() },
    )
    .unwrap();

    assert_eq!(report.folds.first().map(|f| f.fold_index), Some(1));
    let oos_trades: usize = report.folds.iter().map(|f| f.out_of_sample.total_trades).sum();
    let dsr = report.overfit_diagnostics.deflated_sharpe.unwrap();
    assert_eq!(dsr.observations, oos_trades);
    assert_eq!(dsr.trials, 4);
}
