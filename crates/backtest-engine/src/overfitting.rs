use sigma_core::precision::round_ratio;
use sigma_core::stats::{excess_kurtosis, mean, population_std, skewness};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::models::{
    AntiOverfitFlags, DeflatedSharpe, Grade, GradeOutcome, MetricsBundle, MonthlyReturn,
    OverfitDiagnostics,
};

pub const MAX_PLAUSIBLE_SHARPE: f64 = 3.0;
pub const MAX_PLAUSIBLE_WIN_RATE: f64 = 0.80;
pub const MIN_TRADES_FLAG: usize = 100;
pub const MIN_TRADES_REJECT: usize = 30;
pub const MIN_MONTHS_FOR_LOSS_CHECK: usize = 3;
pub const GOOD_SHARPE_FLOOR: f64 = 1.5;
pub const REVIEW_SHARPE_FLOOR: f64 = 1.0;
pub const MAX_ACCEPTABLE_DRAWDOWN: f64 = 0.15;

/// Compute the warning flags for a metrics bundle and its monthly P&L.
///
/// `no_losing_months` needs more than three months of history to fire.
pub fn check_overfit_flags(metrics: &MetricsBundle, monthly: &[MonthlyReturn]) -> AntiOverfitFlags {
    let losing_months = monthly.iter().filter(|m| m.pnl < 0.0).count();
    AntiOverfitFlags {
        sharpe_above_3: metrics.sharpe_ratio > MAX_PLAUSIBLE_SHARPE,
        win_rate_above_80: metrics.win_rate > MAX_PLAUSIBLE_WIN_RATE,
        trades_below_100: metrics.total_trades < MIN_TRADES_FLAG,
        no_losing_months: losing_months == 0 && monthly.len() > MIN_MONTHS_FOR_LOSS_CHECK,
    }
}

struct GradeInputs<'a> {
    metrics: &'a MetricsBundle,
    flags: AntiOverfitFlags,
}

struct GradeRule {
    name: &'static str,
    applies: fn(&GradeInputs) -> bool,
    grade: Grade,
}

/// Evaluated top to bottom; the first rule that applies decides the grade.
const GRADE_RULES: &[GradeRule] = &[
    GradeRule {
        name: "sharpe_implausibly_high",
        applies: |i| i.metrics.sharpe_ratio > MAX_PLAUSIBLE_SHARPE,
        grade: Grade::Rejected,
    },
    GradeRule {
        name: "win_rate_implausibly_high",
        applies: |i| i.metrics.win_rate > MAX_PLAUSIBLE_WIN_RATE,
        grade: Grade::Rejected,
    },
    GradeRule {
        name: "too_few_trades",
        applies: |i| i.metrics.total_trades < MIN_TRADES_REJECT,
        grade: Grade::Rejected,
    },
    GradeRule {
        name: "no_losing_months",
        applies: |i| i.flags.no_losing_months,
        grade: Grade::Rejected,
    },
    GradeRule {
        name: "marginal_sharpe",
        applies: |i| {
            (REVIEW_SHARPE_FLOOR..=GOOD_SHARPE_FLOOR).contains(&i.metrics.sharpe_ratio)
        },
        grade: Grade::UnderReview,
    },
    GradeRule {
        name: "drawdown_too_deep",
        applies: |i| i.metrics.max_drawdown > MAX_ACCEPTABLE_DRAWDOWN,
        grade: Grade::UnderReview,
    },
    GradeRule {
        name: "limited_trade_count",
        applies: |i| (MIN_TRADES_REJECT..=MIN_TRADES_FLAG).contains(&i.metrics.total_trades),
        grade: Grade::UnderReview,
    },
    GradeRule {
        name: "good",
        applies: |i| {
            let m = i.metrics;
            m.sharpe_ratio > GOOD_SHARPE_FLOOR
                && m.sharpe_ratio <= MAX_PLAUSIBLE_SHARPE
                && m.max_drawdown <= MAX_ACCEPTABLE_DRAWDOWN
                && m.total_trades > MIN_TRADES_FLAG
                && m.win_rate <= MAX_PLAUSIBLE_WIN_RATE
        },
        grade: Grade::Good,
    },
];

/// Grade a result. Only rejections fail; `under_review` still passes.
pub fn grade(metrics: &MetricsBundle, monthly: &[MonthlyReturn]) -> GradeOutcome {
    grade_with_flags(metrics, check_overfit_flags(metrics, monthly))
}

pub fn grade_with_flags(metrics: &MetricsBundle, flags: AntiOverfitFlags) -> GradeOutcome {
    let inputs = GradeInputs { metrics, flags };
    let grade = GRADE_RULES
        .iter()
        .find(|rule| (rule.applies)(&inputs))
        .map(|rule| {
            tracing::trace!(rule = rule.name, "Grade rule matched");
            rule.grade
        })
        .unwrap_or(Grade::UnderReview);

    GradeOutcome {
        passed: grade != Grade::Rejected,
        grade,
    }
}

/// Confidence used for the minimum track record in report diagnostics.
pub const TRACK_RECORD_CONFIDENCE: f64 = 0.95;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Per-trade Sharpe (mean / population std), or `None` when it is undefined.
fn trade_sharpe(pnls: &[f64]) -> Option<f64> {
    if pnls.len() < 3 {
        return None;
    }
    let sd = population_std(pnls);
    (sd > 1e-12).then(|| mean(pnls) / sd)
}

/// Variance factor of the Sharpe estimator under non-normal returns:
/// `1 - skew*SR + (kurtosis - 1)/4 * SR^2`, with `kurtosis` non-excess.
fn estimator_variance(sharpe: f64, skew: f64, excess_kurt: f64) -> f64 {
    1.0 - skew * sharpe + (excess_kurt + 2.0) / 4.0 * sharpe.powi(2)
}

/// Best per-trade Sharpe expected from `trials` variants with no edge, each
/// measured over `observations` trades. Zero for a single trial.
fn null_benchmark(trials: usize, observations: usize) -> f64 {
    if trials < 2 || observations < 2 {
        return 0.0;
    }
    let n = trials as f64;
    let sd = (1.0 / (observations - 1) as f64).sqrt();
    let tail = (1.0 - EULER_GAMMA) * inverse_normal_cdf(1.0 - 1.0 / n)
        + EULER_GAMMA * inverse_normal_cdf(1.0 - 1.0 / (n * std::f64::consts::E));
    sd * tail
}

/// Deflated Sharpe ratio of a trade P&L sequence.
///
/// The probability that the true per-trade Sharpe beats what the best of
/// `trials` skill-less variants would show by luck, adjusted for the skew and
/// fat tails of the trade distribution. `None` below three trades, for flat
/// P&L, or when the moments make the estimator variance non-positive.
pub fn deflated_sharpe_ratio(pnls: &[f64], trials: usize) -> Option<DeflatedSharpe> {
    let sharpe = trade_sharpe(pnls)?;
    let observations = pnls.len();
    let variance = estimator_variance(sharpe, skewness(pnls), excess_kurtosis(pnls));
    if variance <= 0.0 {
        return None;
    }

    let benchmark = null_benchmark(trials, observations);
    let z = (sharpe - benchmark) * ((observations - 1) as f64).sqrt() / variance.sqrt();

    Some(DeflatedSharpe {
        trade_sharpe: round_ratio(sharpe),
        trials: trials.max(1),
        observations,
        null_benchmark: round_ratio(benchmark),
        probability: round_ratio(normal_cdf(z)),
    })
}

/// Trades needed before a per-trade Sharpe of `sharpe` is distinguishable
/// from `benchmark` at `confidence`.
///
/// `None` when the Sharpe does not exceed the benchmark.
pub fn minimum_track_record(
    sharpe: f64,
    skew: f64,
    excess_kurt: f64,
    benchmark: f64,
    confidence: f64,
) -> Option<usize> {
    let edge = sharpe - benchmark;
    if edge <= 1e-12 {
        return None;
    }
    let variance = estimator_variance(sharpe, skew, excess_kurt);
    if variance <= 0.0 {
        return None;
    }
    let z = inverse_normal_cdf(confidence);
    let trades = 1.0 + variance * (z / edge).powi(2);
    trades.is_finite().then(|| trades.ceil() as usize)
}

/// Multiple-testing diagnostics for a trade list. Informational only: they do
/// not feed the grade.
pub fn overfit_diagnostics(pnls: &[f64], trials: usize) -> OverfitDiagnostics {
    let Some(deflated) = deflated_sharpe_ratio(pnls, trials) else {
        return OverfitDiagnostics::default();
    };
    let min_trades = trade_sharpe(pnls).and_then(|sharpe| {
        minimum_track_record(
            sharpe,
            skewness(pnls),
            excess_kurtosis(pnls),
            null_benchmark(trials, pnls.len()),
            TRACK_RECORD_CONFIDENCE,
        )
    });

    OverfitDiagnostics {
        track_record_sufficient: min_trades.is_some_and(|m| pnls.len() >= m),
        min_track_record_trades: min_trades,
        deflated_sharpe: Some(deflated),
    }
}

fn normal_cdf(x: f64) -> f64 {
    Normal::new(0.0, 1.0).map(|n| n.cdf(x)).unwrap_or(f64::NAN)
}

fn inverse_normal_cdf(p: f64) -> f64 {
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(p))
        .unwrap_or(f64::NAN)
}
