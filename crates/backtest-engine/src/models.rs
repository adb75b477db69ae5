use serde::{Deserialize, Serialize};
use sigma_core::precision::serde_inf;
use sigma_core::Side;

use crate::cost_model::CostModel;

/// A closed round-trip trade, created when a position is exited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Net of round-trip cost.
    pub pnl: f64,
    /// Maximum favourable excursion per unit, always >= 0.
    pub mfe: f64,
    /// Maximum adverse excursion per unit, always <= 0.
    pub mae: f64,
}

impl Trade {
    pub fn holding_bars(&self) -> usize {
        self.exit_bar - self.entry_bar
    }
}

/// Performance summary of a trade list.
///
/// Field names are canonical. The aliases exist only so that result files
/// written by older tooling can still be read back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsBundle {
    #[serde(alias = "totalPnl")]
    pub total_pnl: f64,
    #[serde(alias = "sharpe")]
    pub sharpe_ratio: f64,
    /// Fraction of peak equity.
    #[serde(alias = "maxDrawdown")]
    pub max_drawdown: f64,
    pub max_drawdown_dollars: f64,
    #[serde(alias = "winRate")]
    pub win_rate: f64,
    /// `inf` when there are no losing trades.
    #[serde(with = "serde_inf", alias = "profitFactor")]
    pub profit_factor: f64,
    #[serde(alias = "totalTrades")]
    pub total_trades: usize,
    pub avg_trade_pnl: f64,
    pub avg_winner: f64,
    pub avg_loser: f64,
    pub max_consecutive_losses: usize,
    pub avg_holding_bars: f64,
    pub expectancy: f64,
    pub calmar_ratio: f64,
}

/// Net P&L attributed to a calendar month (by exit bar).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyReturn {
    /// `YYYY-MM`
    pub month: String,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub bar: usize,
    pub equity: f64,
}

/// Trade as written to the result JSON (rounded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub side: Side,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub mfe: f64,
    pub mae: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// Heuristic warning signs that a result is too good to be true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiOverfitFlags {
    pub sharpe_above_3: bool,
    pub win_rate_above_80: bool,
    pub trades_below_100: bool,
    pub no_losing_months: bool,
}

/// Deflated Sharpe ratio of a trade list. Sharpe values are per trade, not annualised.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeflatedSharpe {
    pub trade_sharpe: f64,
    /// Strategy or parameter variants tried before this one was kept.
    pub trials: usize,
    pub observations: usize,
    /// Best per-trade Sharpe the trials would show with no edge at all.
    pub null_benchmark: f64,
    /// Probability that the true Sharpe exceeds `null_benchmark`.
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverfitDiagnostics {
    pub deflated_sharpe: Option<DeflatedSharpe>,
    /// Trades needed to confirm the Sharpe over the null benchmark at 95%.
    pub min_track_record_trades: Option<usize>,
    pub track_record_sufficient: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Good,
    UnderReview,
    Rejected,
}

impl Grade {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Good => "good",
            Grade::UnderReview => "under_review",
            Grade::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeOutcome {
    pub passed: bool,
    pub grade: Grade,
}

/// Full single-run result, the document written by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy_name: String,
    pub data_file: String,
    pub bars_tested: usize,
    pub date_range: DateRange,
    pub cost_model: CostModel,
    pub metrics: MetricsBundle,
    pub monthly_returns: Vec<MonthlyReturn>,
    pub equity_curve: Vec<EquityPoint>,
    pub trade_log: Vec<TradeRecord>,
    pub anti_overfit_flags: AntiOverfitFlags,
    #[serde(default)]
    pub overfit_diagnostics: OverfitDiagnostics,
    /// Present when trade resampling was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<MonteCarloResult>,
    #[serde(rename = "pass")]
    pub passed: bool,
    pub grade: Grade,
}

/// Walk-forward window sizes, in bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub train_bars: usize,
    pub test_bars: usize,
    /// Defaults to `test_bars` (non-overlapping test windows).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_bars: Option<usize>,
}

impl WalkForwardConfig {
    pub fn step(&self) -> usize {
        self.step_bars.unwrap_or(self.test_bars)
    }
}

/// Half-open bar range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarRange {
    pub start: usize,
    pub end: usize,
}

impl BarRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardFold {
    /// 1-based.
    #[serde(alias = "fold")]
    pub fold_index: usize,
    pub train_range: BarRange,
    pub test_range: BarRange,
    pub in_sample: MetricsBundle,
    pub out_of_sample: MetricsBundle,
    /// `(1 - oos_sharpe / is_sharpe) * 100`, 0 when the in-sample Sharpe is 0.
    pub oos_decay_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardAggregate {
    pub avg_oos_sharpe: f64,
    pub avg_oos_pnl: f64,
    pub total_oos_pnl: f64,
    pub avg_oos_decay_pct: f64,
    pub max_oos_decay_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub mode: String,
    pub strategy_name: String,
    pub data_file: String,
    pub config: WalkForwardConfig,
    pub cost_model: CostModel,
    pub total_folds: usize,
    pub folds: Vec<WalkForwardFold>,
    pub aggregate: WalkForwardAggregate,
    /// Computed over the pooled out-of-sample trades.
    #[serde(default)]
    pub overfit_diagnostics: OverfitDiagnostics,
}

/// Configuration for Monte Carlo trade resampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub num_simulations: usize,
    /// Resample contiguous blocks of this many trades (1 = plain bootstrap).
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Fixed seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_block_size() -> usize {
    1
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 1000,
            block_size: 1,
            seed: None,
        }
    }
}

/// Distribution of outcomes across resampled trade sequences (dollar P&L).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub simulations: usize,
    pub mean_pnl: f64,
    pub median_pnl: f64,
    pub std_dev_pnl: f64,
    pub percentile_5: f64,
    pub percentile_25: f64,
    pub percentile_75: f64,
    pub percentile_95: f64,
    /// Fraction of simulations ending with positive total P&L (0.0-1.0).
    pub probability_of_profit: f64,
    pub median_max_drawdown: f64,
    pub max_drawdown_95: f64,
    pub pnl_distribution: Vec<f64>,
}
