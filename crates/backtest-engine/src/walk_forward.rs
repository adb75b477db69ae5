use rayon::prelude::*;
use serde_json::Value;
use sigma_core::precision::{round_ratio, round_usd};
use sigma_core::stats::mean;
use sigma_core::{EngineError, EngineResult, PriceSeries, StrategyProducer};
use tracing::{debug, info};

use crate::cost_model::CostModel;
use crate::metrics::compute_metrics;
use crate::overfitting::overfit_diagnostics;
use crate::models::{
    BarRange, MetricsBundle, WalkForwardAggregate, WalkForwardConfig, WalkForwardFold,
    WalkForwardReport,
};
use crate::simulator::simulate;

impl WalkForwardConfig {
    pub fn from_json(text: &str) -> EngineResult<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| {
            EngineError::Configuration(format!("walk-forward config is not valid JSON: {e}"))
        })?;
        Self::from_value(&value)
    }

    /// `train_bars` and `test_bars` are required; `step_bars` defaults to `test_bars`.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        let config: WalkForwardConfig = serde_json::from_value(value.clone())
            .map_err(|e| EngineError::Configuration(format!("invalid walk-forward config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.train_bars == 0 || self.test_bars == 0 {
            return Err(EngineError::Configuration(
                "walk-forward train_bars and test_bars must be positive".to_string(),
            ));
        }
        if self.step() == 0 {
            return Err(EngineError::Configuration(
                "walk-forward step_bars must be positive".to_string(),
            ));
        }
        self.window_bars()?;
        Ok(())
    }

    /// Bars spanned by one fold, train plus test.
    pub fn window_bars(&self) -> EngineResult<usize> {
        self.train_bars.checked_add(self.test_bars).ok_or_else(|| {
            EngineError::Configuration(format!(
                "walk-forward window too large: train_bars={} + test_bars={} overflows",
                self.train_bars, self.test_bars
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct WalkForwardOptions {
    /// Evaluate folds on the rayon pool.
    pub parallel: bool,
    /// Variants tried before this one, for the deflated Sharpe ratio.
    pub trials: usize,
}

impl Default for WalkForwardOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            trials: 1,
        }
    }
}

/// Train/test windows for every fold that fits entirely inside `total_bars`.
pub fn plan_folds(total_bars: usize, config: &WalkForwardConfig) -> EngineResult<Vec<(BarRange, BarRange)>> {
    config.validate()?;

    let window = config.window_bars()?;
    let step = config.step();
    let mut folds = Vec::new();
    let mut start: usize = 0;
    while start.checked_add(window).is_some_and(|end| end <= total_bars) {
        // start + window <= total_bars, so neither sum below overflows
        let train_end = start + config.train_bars;
        folds.push((
            BarRange {
                start,
                end: train_end,
            },
            BarRange {
                start: train_end,
                end: train_end + config.test_bars,
            },
        ));
        match start.checked_add(step) {
            Some(next) => start = next,
            None => break,
        }
    }
    Ok(folds)
}

/// Fresh strategy, fresh slice: nothing learned on one window leaks into another.
/// Returns the slice metrics and its trade P&L.
fn evaluate_slice<F>(
    series: &PriceSeries,
    range: BarRange,
    factory: &F,
    cost_model: &CostModel,
) -> EngineResult<(MetricsBundle, Vec<f64>)>
where
    F: Fn() -> EngineResult<Box<dyn StrategyProducer>> + Sync,
{
    let slice = series.slice(range.start..range.end)?;
    let strategy = factory()?;
    let signals = strategy.produce(&slice)?;
    let trades = simulate(&slice, &signals, cost_model)?;
    let pnls = trades.iter().map(|t| t.pnl).collect();
    Ok((compute_metrics(&trades), pnls))
}

fn run_fold<F>(
    fold_index: usize,
    train_range: BarRange,
    test_range: BarRange,
    series: &PriceSeries,
    factory: &F,
    cost_model: &CostModel,
) -> EngineResult<(WalkForwardFold, Vec<f64>)>
where
    F: Fn() -> EngineResult<Box<dyn StrategyProducer>> + Sync,
{
    let (in_sample, _) = evaluate_slice(series, train_range, factory, cost_model)?;
    let (out_of_sample, oos_pnls) = evaluate_slice(series, test_range, factory, cost_model)?;

    let decay = if in_sample.sharpe_ratio != 0.0 {
        1.0 - out_of_sample.sharpe_ratio / in_sample.sharpe_ratio
    } else {
        0.0
    };

    debug!(
        fold = fold_index,
        is_sharpe = in_sample.sharpe_ratio,
        oos_sharpe = out_of_sample.sharpe_ratio,
        "Walk-forward fold complete"
    );

    let fold = WalkForwardFold {
        fold_index,
        train_range,
        test_range,
        in_sample,
        out_of_sample,
        oos_decay_pct: round_usd(decay * 100.0),
    };
    Ok((fold, oos_pnls))
}

pub fn aggregate_folds(folds: &[WalkForwardFold]) -> WalkForwardAggregate {
    if folds.is_empty() {
        return WalkForwardAggregate::default();
    }

    let sharpes: Vec<f64> = folds.iter().map(|f| f.out_of_sample.sharpe_ratio).collect();
    let pnls: Vec<f64> = folds.iter().map(|f| f.out_of_sample.total_pnl).collect();
    let decays: Vec<f64> = folds.iter().map(|f| f.oos_decay_pct).collect();

    WalkForwardAggregate {
        avg_oos_sharpe: round_ratio(mean(&sharpes)),
        avg_oos_pnl: round_usd(mean(&pnls)),
        total_oos_pnl: round_usd(pnls.iter().sum()),
        avg_oos_decay_pct: round_usd(mean(&decays)),
        max_oos_decay_pct: round_usd(decays.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
    }
}

/// Rolling train/test evaluation.
///
/// `factory` must return a new strategy instance on every call; each fold's
/// in-sample and out-of-sample halves get their own. Folds are independent,
/// so with `options.parallel` they run on the rayon pool; results keep fold
/// order and are numbered from 1.
pub fn run_walk_forward<F>(
    series: &PriceSeries,
    factory: F,
    cost_model: &CostModel,
    config: &WalkForwardConfig,
    data_file: &str,
    options: &WalkForwardOptions,
) -> EngineResult<WalkForwardReport>
where
    F: Fn() -> EngineResult<Box<dyn StrategyProducer>> + Sync,
{
    let plan = plan_folds(series.len(), config)?;
    let strategy_name = factory()?.name().to_string();

    let run = |(index, (train, test)): (usize, &(BarRange, BarRange))| {
        run_fold(index + 1, *train, *test, series, &factory, cost_model)
    };
    let results: Vec<(WalkForwardFold, Vec<f64>)> = if options.parallel {
        plan.par_iter().enumerate().map(run).collect::<EngineResult<_>>()?
    } else {
        plan.iter().enumerate().map(run).collect::<EngineResult<_>>()?
    };
    let (folds, oos_pnls): (Vec<WalkForwardFold>, Vec<Vec<f64>>) = results.into_iter().unzip();
    let pooled: Vec<f64> = oos_pnls.concat();

    let aggregate = aggregate_folds(&folds);
    info!(
        strategy = %strategy_name,
        folds = folds.len(),
        avg_oos_sharpe = aggregate.avg_oos_sharpe,
        "Walk-forward complete"
    );

    Ok(WalkForwardReport {
        mode: "walk_forward".to_string(),
        strategy_name,
        data_file: data_file.to_string(),
        config: *config,
        cost_model: cost_model.clone(),
        total_folds: folds.len(),
        folds,
        aggregate,
        overfit_diagnostics: overfit_diagnostics(&pooled, options.trials),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(train: usize, test: usize, step: Option<usize>) -> WalkForwardConfig {
        WalkForwardConfig {
            train_bars: train,
            test_bars: test,
            step_bars: step,
        }
    }

    #[test]
    fn test_fold_count_formula() {
        // floor((L - 120) / 20) + 1 for train 100, test 20
        for total in [120usize, 139, 140, 200, 1_000] {
            let folds = plan_folds(total, &config(100, 20, None)).unwrap();
            assert_eq!(folds.len(), (total - 120) / 20 + 1, "total {}", total);
        }
        assert!(plan_folds(119, &config(100, 20, None)).unwrap().is_empty());
    }

    #[test]
    fn test_fold_ranges_contiguous() {
        let folds = plan_folds(200, &config(100, 20, Some(50))).unwrap();
        assert_eq!(folds.len(), 2);
        let (train, test) = folds[1];
        assert_eq!((train.start, train.end), (50, 150));
        assert_eq!((test.start, test.end), (150, 170));
        assert_eq!(train.end, test.start);
    }

    #[test]
    fn test_config_parsing() {
        let cfg = WalkForwardConfig::from_value(&json!({"train_bars": 500, "test_bars": 100})).unwrap();
        assert_eq!(cfg.step(), 100);

        let missing = WalkForwardConfig::from_value(&json!({"train_bars": 500}));
        assert!(matches!(missing, Err(EngineError::Configuration(_))));

        let zero_step =
            WalkForwardConfig::from_value(&json!({"train_bars": 5, "test_bars": 5, "step_bars": 0}));
        assert!(matches!(zero_step, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_aggregate_empty() {
        assert_eq!(aggregate_folds(&[]), WalkForwardAggregate::default());
    }

    #[test]
    fn test_oversized_window_is_configuration_error() {
        let huge = config(usize::MAX, 1, None);
        assert!(matches!(huge.validate(), Err(EngineError::Configuration(_))));
        assert!(matches!(plan_folds(1_000, &huge), Err(EngineError::Configuration(_))));

        let parsed = WalkForwardConfig::from_value(&json!({
            "train_bars": usize::MAX,
            "test_bars": 1
        }));
        assert!(matches!(parsed, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn test_large_windows_and_steps_do_not_wrap() {
        // Fits without overflow but exceeds any real series
        assert!(plan_folds(1_000, &config(usize::MAX / 2, usize::MAX / 2, None)).unwrap().is_empty());

        // The second start leaves no room for a window before usize::MAX
        let folds = plan_folds(usize::MAX, &config(10, 10, Some(usize::MAX))).unwrap();
        assert_eq!(folds.len(), 1);
        assert_eq!((folds[0].1.start, folds[0].1.end), (10, 20));
    }
}
