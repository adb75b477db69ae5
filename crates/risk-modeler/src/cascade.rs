//! Liquidation cascade scoring.
//!
//! A cascade score is a weighted blend of four sub-scores in [0, 1]. Each
//! [`CascadeProfile`] row carries the factor, the raw value at which its
//! sub-score saturates, and its weight, so a blend can be audited in one place.

use serde::{Deserialize, Serialize};
use sigma_core::precision::round_ratio;
use sigma_core::stats::population_std;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeFactor {
    Leverage,
    Funding,
    Volatility,
    OpenInterest,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorWeight {
    pub factor: CascadeFactor,
    /// Raw value that maps to a sub-score of 1.
    pub normalizer: f64,
    pub weight: f64,
}

/// Weighted blend of sub-scores. Weights sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeProfile {
    pub name: &'static str,
    pub weights: &'static [FactorWeight],
    /// Clamp to [0, 1] and round to 4 dp.
    pub finalize: bool,
}

const fn w(factor: CascadeFactor, normalizer: f64, weight: f64) -> FactorWeight {
    FactorWeight {
        factor,
        normalizer,
        weight,
    }
}

/// Blend used by the strategy risk assessment.
pub const RISK_MODELER_PROFILE: CascadeProfile = CascadeProfile {
    name: "risk_modeler",
    weights: &[
        w(CascadeFactor::Leverage, 20.0, 0.30),
        w(CascadeFactor::Funding, 0.001, 0.25),
        w(CascadeFactor::Volatility, 0.05, 0.25),
        w(CascadeFactor::OpenInterest, 1e10, 0.20),
    ],
    finalize: false,
};

/// Blend used when scoring from exchange market data. Raw inputs are OI/volume
/// turnover, |funding|, recent/baseline volatility excess and peak OI growth.
pub const LIQUIDATION_PROFILE: CascadeProfile = CascadeProfile {
    name: "liquidation",
    weights: &[
        w(CascadeFactor::Leverage, 10.0, 0.30),
        w(CascadeFactor::Funding, 0.001, 0.20),
        w(CascadeFactor::Volatility, 2.0, 0.25),
        w(CascadeFactor::OpenInterest, 0.2, 0.25),
    ],
    finalize: true,
};

/// Sub-scores in [0, 1], one per factor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub leverage: f64,
    pub funding: f64,
    pub volatility: f64,
    pub open_interest: f64,
}

impl SubScores {
    pub fn get(&self, factor: CascadeFactor) -> f64 {
        match factor {
            CascadeFactor::Leverage => self.leverage,
            CascadeFactor::Funding => self.funding,
            CascadeFactor::Volatility => self.volatility,
            CascadeFactor::OpenInterest => self.open_interest,
        }
    }

    fn set(&mut self, factor: CascadeFactor, value: f64) {
        match factor {
            CascadeFactor::Leverage => self.leverage = value,
            CascadeFactor::Funding => self.funding = value,
            CascadeFactor::Volatility => self.volatility = value,
            CascadeFactor::OpenInterest => self.open_interest = value,
        }
    }
}

/// Raw strategy-level exposure inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeInputs {
    pub leverage: f64,
    pub funding_rate_8h: f64,
    pub daily_volatility: f64,
    pub oi_usd: f64,
}

impl CascadeInputs {
    /// Normalize each input against `profile`.
    pub fn sub_scores(&self, profile: &CascadeProfile) -> SubScores {
        let mut scores = SubScores::default();
        for fw in profile.weights {
            let raw = match fw.factor {
                CascadeFactor::Leverage => self.leverage,
                CascadeFactor::Funding => self.funding_rate_8h.abs(),
                CascadeFactor::Volatility => self.daily_volatility,
                CascadeFactor::OpenInterest => self.oi_usd,
            };
            scores.set(fw.factor, profile.normalize(fw.factor, raw));
        }
        scores
    }
}

impl CascadeProfile {
    /// `raw / normalizer`, clamped to [0, 1]. Factors absent from the profile score 0.
    pub fn normalize(&self, factor: CascadeFactor, raw: f64) -> f64 {
        self.weights
            .iter()
            .find(|fw| fw.factor == factor)
            .map_or(0.0, |fw| (raw / fw.normalizer).clamp(0.0, 1.0))
    }

    pub fn combine(&self, scores: &SubScores) -> f64 {
        let total: f64 = self
            .weights
            .iter()
            .map(|fw| scores.get(fw.factor) * fw.weight)
            .sum();
        if self.finalize {
            round_ratio(total.clamp(0.0, 1.0))
        } else {
            total
        }
    }

    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().map(|fw| fw.weight).sum()
    }
}

/// Cascade risk of a strategy's own exposure, in [0, 1].
pub fn estimate_cascade_risk(inputs: &CascadeInputs) -> f64 {
    RISK_MODELER_PROFILE.combine(&inputs.sub_scores(&RISK_MODELER_PROFILE))
}

/// Exchange data for one symbol. Missing fields score neutral.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub open_interest_usd: Option<f64>,
    #[serde(default)]
    pub volume_24h_usd: Option<f64>,
    #[serde(default)]
    pub funding_rate_8h: Option<f64>,
    /// Hourly closes, oldest first.
    #[serde(default)]
    pub hourly_closes: Vec<f64>,
    /// Open interest samples, oldest first.
    #[serde(default)]
    pub oi_history: Vec<f64>,
}

impl MarketSnapshot {
    pub fn sub_scores(&self) -> SubScores {
        SubScores {
            leverage: leverage_risk(self.open_interest_usd, self.volume_24h_usd),
            funding: funding_risk(self.funding_rate_8h),
            volatility: volatility_spike_risk(&self.hourly_closes),
            open_interest: oi_buildup_risk(&self.oi_history),
        }
    }
}

/// Cascade probability from market data, clamped to [0, 1] and rounded to 4 dp.
pub fn estimate_market_cascade_risk(snapshot: &MarketSnapshot) -> f64 {
    LIQUIDATION_PROFILE.combine(&snapshot.sub_scores())
}

/// OI relative to daily volume.
pub fn leverage_risk(open_interest_usd: Option<f64>, volume_24h_usd: Option<f64>) -> f64 {
    match (open_interest_usd, volume_24h_usd) {
        (Some(oi), Some(vol)) if vol > 0.0 => {
            round_ratio(LIQUIDATION_PROFILE.normalize(CascadeFactor::Leverage, oi / vol))
        }
        _ => 0.5,
    }
}

pub fn funding_risk(funding_rate_8h: Option<f64>) -> f64 {
    match funding_rate_8h {
        Some(rate) => round_ratio(LIQUIDATION_PROFILE.normalize(CascadeFactor::Funding, rate.abs())),
        None => 0.3,
    }
}

/// Recent (last 4 periods) vs. full-window volatility of log returns.
pub fn volatility_spike_risk(closes: &[f64]) -> f64 {
    const NEUTRAL: f64 = 0.5;
    const RECENT: usize = 4;

    if closes.len() < 5 || closes.iter().any(|c| *c <= 0.0 || !c.is_finite()) {
        return NEUTRAL;
    }
    let returns: Vec<f64> = closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    if returns.len() < RECENT {
        return NEUTRAL;
    }

    let recent = population_std(&returns[returns.len() - RECENT..]);
    let baseline = population_std(&returns);
    if baseline <= 0.0 {
        return NEUTRAL;
    }
    round_ratio(LIQUIDATION_PROFILE.normalize(CascadeFactor::Volatility, recent / baseline - 1.0))
}

/// Rapid OI growth, plus a bump when OI has already started unwinding from its peak.
pub fn oi_buildup_risk(oi_history: &[f64]) -> f64 {
    let (Some(&first), Some(&last)) = (oi_history.first(), oi_history.last()) else {
        return 0.5;
    };
    if oi_history.len() < 2 || first <= 0.0 {
        return 0.5;
    }

    let peak = oi_history.iter().cloned().fold(f64::MIN, f64::max);
    let max_change = (peak - first) / first;
    let change_risk = LIQUIDATION_PROFILE.normalize(CascadeFactor::OpenInterest, max_change.abs());
    let unwind_risk = if peak > last && max_change > 0.05 { 0.3 } else { 0.0 };

    round_ratio((change_risk + unwind_risk).min(1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMagnitude {
    Small,
    Medium,
    Large,
}

/// Bucket recent liquidation volume.
pub fn cascade_magnitude(liquidation_volume_usd: f64) -> CascadeMagnitude {
    if liquidation_volume_usd < 50_000_000.0 {
        CascadeMagnitude::Small
    } else if liquidation_volume_usd < 200_000_000.0 {
        CascadeMagnitude::Medium
    } else {
        CascadeMagnitude::Large
    }
}
