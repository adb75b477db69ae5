//! Tail-risk estimators: historical VaR, EVT VaR via a generalized Pareto fit
//! over a peaks-over-threshold sample, and CVaR.

use serde::{Deserialize, Serialize};
use sigma_core::stats::{mean, percentile};
use tracing::{debug, warn};

use crate::models::{MIN_EVT_SAMPLE, MIN_TAIL_OBSERVATIONS};

/// Returns at or below this percentile form the exceedance sample.
const THRESHOLD_PERCENTILE: f64 = 5.0;
const EXPONENTIAL_SHAPE_EPS: f64 = 1e-10;
const GOLDEN_ITERATIONS: usize = 80;

/// Historical VaR: the `(1 - confidence)` percentile of the return distribution.
/// Returned as a (typically negative) return, not a loss magnitude.
pub fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    percentile(returns, (1.0 - confidence) * 100.0)
}

/// Maximum likelihood estimate of a generalized Pareto distribution with location 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpdFit {
    pub shape: f64,
    pub scale: f64,
    pub log_likelihood: f64,
}

/// Why the estimator fell back to the historical percentile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    InsufficientData,
    InsufficientTail,
    FitFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TailMethod {
    Evt {
        threshold: f64,
        exceedances: usize,
        shape: f64,
        scale: f64,
    },
    Historical {
        reason: FallbackReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TailEstimate {
    pub var: f64,
    #[serde(flatten)]
    pub method: TailMethod,
}

impl TailEstimate {
    pub fn is_evt(&self) -> bool {
        matches!(self.method, TailMethod::Evt { .. })
    }
}

/// EVT VaR at `confidence`. Falls back to [`historical_var`] whenever the tail
/// is too thin to fit.
pub fn evt_var(returns: &[f64], confidence: f64) -> f64 {
    evt_var_estimate(returns, confidence).var
}

/// Like [`evt_var`], also reporting which estimator produced the number.
pub fn evt_var_estimate(returns: &[f64], confidence: f64) -> TailEstimate {
    let fallback = |reason| TailEstimate {
        var: historical_var(returns, confidence),
        method: TailMethod::Historical { reason },
    };

    let n = returns.len();
    if n < MIN_EVT_SAMPLE {
        warn!(observations = n, "Too few returns for EVT, using historical VaR");
        return fallback(FallbackReason::InsufficientData);
    }

    let threshold = percentile(returns, THRESHOLD_PERCENTILE);
    let losses: Vec<f64> = returns
        .iter()
        .filter(|&&r| r < threshold)
        .map(|r| threshold - r)
        .collect();

    if losses.len() < MIN_TAIL_OBSERVATIONS {
        debug!(exceedances = losses.len(), "Tail too thin for GPD fit");
        return fallback(FallbackReason::InsufficientTail);
    }

    let Some(fit) = fit_gpd(&losses) else {
        warn!(exceedances = losses.len(), "GPD fit failed, using historical VaR");
        return fallback(FallbackReason::FitFailed);
    };

    // Exceedance probability scaled to the target tail probability.
    let ratio = n as f64 / losses.len() as f64 * (1.0 - confidence);
    let var = if fit.shape.abs() < EXPONENTIAL_SHAPE_EPS {
        threshold - fit.scale * ratio.ln()
    } else {
        threshold - fit.scale / fit.shape * (ratio.powf(-fit.shape) - 1.0)
    };

    if !var.is_finite() {
        warn!(shape = fit.shape, scale = fit.scale, "Non-finite EVT VaR, using historical VaR");
        return fallback(FallbackReason::FitFailed);
    }

    TailEstimate {
        var,
        method: TailMethod::Evt {
            threshold,
            exceedances: losses.len(),
            shape: fit.shape,
            scale: fit.scale,
        },
    }
}

/// Conditional VaR: mean of the returns at or below historical VaR.
pub fn cvar(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let var = historical_var(returns, confidence);
    let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var).collect();
    if tail.is_empty() {
        var
    } else {
        mean(&tail)
    }
}

/// Fit a GPD (location 0) to strictly positive samples.
///
/// Maximizes the profile likelihood in `theta = shape / scale`, which reduces the
/// two-parameter problem to a one-dimensional search: a coarse grid over the
/// admissible range followed by golden-section refinement around the best cell.
pub fn fit_gpd(samples: &[f64]) -> Option<GpdFit> {
    if samples.len() < 2 || samples.iter().any(|y| !y.is_finite() || *y <= 0.0) {
        return None;
    }

    let y_max = samples.iter().cloned().fold(f64::MIN, f64::max);
    let y_mean = mean(samples);

    let mut grid = theta_grid(y_max, y_mean);
    grid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let scored: Vec<(f64, f64)> = grid
        .iter()
        .filter_map(|&theta| profile_likelihood(samples, theta).map(|fit| (theta, fit.log_likelihood)))
        .collect();
    if scored.is_empty() {
        return None;
    }

    let best = scored
        .iter()
        .enumerate()
        .max_by(|a, b| a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)?;

    let lo = scored[best.saturating_sub(1)].0;
    let hi = scored[(best + 1).min(scored.len() - 1)].0;
    let theta = golden_section_max(lo, hi, |t| {
        profile_likelihood(samples, t)
            .map(|fit| fit.log_likelihood)
            .unwrap_or(f64::NEG_INFINITY)
    });

    let refined = profile_likelihood(samples, theta);
    let coarse = profile_likelihood(samples, scored[best].0);
    match (refined, coarse) {
        (Some(r), Some(c)) if r.log_likelihood >= c.log_likelihood => Some(r),
        (_, c) => c,
    }
}

/// Candidate thetas: the negative side spans `(-1/y_max, 0)`, the positive
/// side is log-spaced relative to the sample mean, plus the exponential case.
fn theta_grid(y_max: f64, y_mean: f64) -> Vec<f64> {
    let mut grid = vec![0.0];
    for j in 1..50 {
        grid.push(-(j as f64 / 50.0) / y_max);
    }
    for k in [1e-3, 1e-4, 1e-6] {
        grid.push(-(1.0 - k) / y_max);
    }
    for j in 0..=120 {
        let exponent = -4.0 + 8.0 * j as f64 / 120.0;
        grid.push(10f64.powf(exponent) / y_mean);
    }
    grid
}

/// Log-likelihood maximized over the shape for a fixed `theta`.
fn profile_likelihood(samples: &[f64], theta: f64) -> Option<GpdFit> {
    let n = samples.len() as f64;

    if theta == 0.0 {
        let scale = mean(samples);
        if scale <= 0.0 {
            return None;
        }
        return Some(GpdFit {
            shape: 0.0,
            scale,
            log_likelihood: -n * scale.ln() - n,
        });
    }

    let mut log_sum = 0.0;
    for y in samples {
        let z = 1.0 + theta * y;
        if z <= 0.0 {
            return None;
        }
        log_sum += z.ln();
    }

    let shape = log_sum / n;
    let scale = shape / theta;
    // Below -1 the likelihood is unbounded; the estimator is not defined there.
    if shape < -1.0 || !scale.is_finite() || scale <= 0.0 {
        return None;
    }

    let log_likelihood = -n * scale.ln() - n * (1.0 + shape);
    log_likelihood.is_finite().then_some(GpdFit {
        shape,
        scale,
        log_likelihood,
    })
}

fn golden_section_max(mut a: f64, mut b: f64, f: impl Fn(f64) -> f64) -> f64 {
    if a == b {
        return a;
    }
    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..GOLDEN_ITERATIONS {
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }
    (a + b) / 2.0
}
