//! Perpetual funding-rate analytics: annualization, carry cost and
//! contra-funding mean-reversion signals.

use std::collections::BTreeMap;

use backtest_engine::crypto_costs::{fee_schedule, funding_drag};
use sigma_core::precision::{round_dp, round_ratio};
use sigma_core::stats::z_score_of;
use tracing::debug;

use crate::models::{CarryOpportunity, Confidence, MeanReversionSignal, TradeDirection};

/// Funding settles three times a day.
const SETTLEMENTS_PER_YEAR: f64 = 3.0 * 365.0;
const MIN_HISTORY: usize = 10;
const SIGNAL_Z: f64 = 2.0;
const HIGH_CONFIDENCE_Z: f64 = 3.0;

pub fn annualized_rate(funding_rate_8h: f64) -> f64 {
    funding_rate_8h * SETTLEMENTS_PER_YEAR
}

/// Funding paid (or received) over a hold, in USD, as an absolute amount.
pub fn funding_cost_per_trade(position_size_usd: f64, funding_rate_8h: f64, hold_hours: f64) -> f64 {
    (position_size_usd * funding_drag(funding_rate_8h, hold_hours)).abs()
}

/// Z-score of the latest rate against its history. Extreme positive funding
/// (crowded longs) suggests shorting, extreme negative suggests going long.
pub fn detect_mean_reversion(symbol: &str, rates: &[f64]) -> MeanReversionSignal {
    let Some(&current_rate) = rates.last() else {
        return neutral_signal(symbol, 0.0);
    };
    if rates.len() < MIN_HISTORY {
        debug!(symbol, observations = rates.len(), "Funding history too short for mean reversion");
        return neutral_signal(symbol, current_rate);
    }

    let z = z_score_of(current_rate, rates);
    let at_or_below = rates.iter().filter(|&&r| r <= current_rate).count();
    let percentile = at_or_below as f64 / rates.len() as f64 * 100.0;

    let direction = if z > SIGNAL_Z {
        TradeDirection::Short
    } else if z < -SIGNAL_Z {
        TradeDirection::Long
    } else {
        TradeDirection::None
    };
    let confidence = if z.abs() > HIGH_CONFIDENCE_Z {
        Confidence::High
    } else if z.abs() > SIGNAL_Z {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    MeanReversionSignal {
        symbol: symbol.to_string(),
        current_rate,
        z_score: round_ratio(z),
        percentile: round_dp(percentile, 2),
        signal: z.abs() > SIGNAL_Z,
        direction,
        confidence,
    }
}

fn neutral_signal(symbol: &str, current_rate: f64) -> MeanReversionSignal {
    MeanReversionSignal {
        symbol: symbol.to_string(),
        current_rate,
        z_score: 0.0,
        percentile: 50.0,
        signal: false,
        direction: TradeDirection::None,
        confidence: Confidence::Low,
    }
}

/// Long the venue paying the lowest funding, short the highest. Only spreads
/// whose annualized yield beats a taker round trip on both legs are returned,
/// best first.
///
/// `rates` maps symbol to exchange to the current 8h funding rate.
pub fn find_carry_opportunities(
    rates: &BTreeMap<String, BTreeMap<String, f64>>,
) -> Vec<CarryOpportunity> {
    let mut opportunities: Vec<CarryOpportunity> = rates
        .iter()
        .filter(|(_, venues)| venues.len() >= 2)
        .filter_map(|(symbol, venues)| {
            let (long_exchange, &long_rate) = venues
                .iter()
                .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
            let (short_exchange, &short_rate) = venues
                .iter()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;

            let spread = short_rate - long_rate;
            let annualized_spread = annualized_rate(spread);
            let round_trip_fees =
                2.0 * (fee_schedule(long_exchange, 0).taker + fee_schedule(short_exchange, 0).taker);
            let net_annual_yield = annualized_spread - round_trip_fees;

            (net_annual_yield > 0.0).then(|| CarryOpportunity {
                symbol: symbol.clone(),
                long_exchange: long_exchange.clone(),
                short_exchange: short_exchange.clone(),
                long_rate,
                short_rate,
                spread,
                annualized_spread,
                round_trip_fees,
                net_annual_yield,
            })
        })
        .collect();

    opportunities.sort_by(|a, b| {
        b.net_annual_yield
            .partial_cmp(&a.net_annual_yield)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    opportunities
}
