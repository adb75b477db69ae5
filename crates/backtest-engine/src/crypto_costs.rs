//! Perpetual-futures cost model: exchange fee tiers, funding drag, slippage and gas.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Maker/taker fees as fractions of notional (0.0005 = 5 bps).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker: f64,
    pub taker: f64,
}

const fn fees(maker: f64, taker: f64) -> FeeSchedule {
    FeeSchedule { maker, taker }
}

const GENERIC_FEES: FeeSchedule = fees(0.0002, 0.0005);
const GENERIC_SLIPPAGE: f64 = 0.0001;

struct ExchangeProfile {
    name: &'static str,
    /// Indexed by VIP tier.
    tiers: &'static [FeeSchedule],
    slippage: f64,
    gas_usd: f64,
}

const EXCHANGES: &[ExchangeProfile] = &[
    ExchangeProfile {
        name: "binance",
        tiers: &[
            fees(0.0002, 0.0005),
            fees(0.00016, 0.0004),
            fees(0.00014, 0.000375),
            fees(0.00012, 0.00035),
            fees(0.0001, 0.000325),
            fees(0.00008, 0.0003),
            fees(0.00006, 0.00025),
            fees(0.00004, 0.0002),
            fees(0.00002, 0.00018),
            fees(-0.00001, 0.00015),
        ],
        slippage: 0.00005,
        gas_usd: 0.0,
    },
    ExchangeProfile {
        name: "bybit",
        tiers: &[
            fees(0.0002, 0.00055),
            fees(0.00018, 0.0004),
            fees(0.00016, 0.000375),
            fees(0.00014, 0.00035),
            fees(0.0001, 0.00032),
            fees(-0.00005, 0.00025),
        ],
        slippage: 0.00007,
        gas_usd: 0.0,
    },
    ExchangeProfile {
        name: "okx",
        tiers: &[
            fees(0.0002, 0.0005),
            fees(0.00016, 0.00045),
            fees(0.00014, 0.0004),
            fees(0.00012, 0.00035),
            fees(0.0001, 0.0003),
            fees(0.00008, 0.00025),
        ],
        slippage: 0.00007,
        gas_usd: 0.0,
    },
    ExchangeProfile {
        name: "hyperliquid",
        tiers: &[
            fees(0.0002, 0.0005),
            fees(0.00015, 0.00045),
            fees(0.0001, 0.0004),
        ],
        slippage: 0.00015,
        gas_usd: 0.05,
    },
];

fn profile(exchange: &str) -> Option<&'static ExchangeProfile> {
    EXCHANGES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(exchange.trim()))
}

/// Look up maker/taker fees for `exchange` at `vip_tier`.
///
/// Unknown exchanges get a generic schedule; a tier the exchange does not
/// publish falls back to the nearest one it does.
pub fn fee_schedule(exchange: &str, vip_tier: u32) -> FeeSchedule {
    let Some(profile) = profile(exchange) else {
        warn!(exchange, "Unknown exchange, using generic fee schedule");
        return GENERIC_FEES;
    };

    let max_tier = profile.tiers.len() - 1;
    let tier = vip_tier as usize;
    if tier > max_tier {
        debug!(
            exchange = profile.name,
            vip_tier,
            fallback = max_tier,
            "VIP tier not published, using nearest tier"
        );
    }
    profile.tiers[tier.min(max_tier)]
}

pub fn default_slippage(exchange: &str) -> f64 {
    profile(exchange).map(|p| p.slippage).unwrap_or(GENERIC_SLIPPAGE)
}

/// Gas per leg in USD (on-chain venues only).
pub fn default_gas_usd(exchange: &str) -> f64 {
    profile(exchange).map(|p| p.gas_usd).unwrap_or(0.0)
}

/// Funding paid over the hold, as a fraction of notional. Funding settles every 8 hours.
pub fn funding_drag(funding_rate_8h: f64, hold_hours: f64) -> f64 {
    let settlements = if hold_hours > 0.0 {
        (hold_hours / 8.0).ceil()
    } else {
        0.0
    };
    funding_rate_8h * settlements
}

/// Parameters for the perpetual-futures cost variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerpCosts {
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default)]
    pub vip_tier: u32,
    /// Both legs maker when true, both taker otherwise.
    #[serde(default)]
    pub is_maker: bool,
    #[serde(default = "default_hold_hours")]
    pub hold_hours: f64,
    #[serde(default = "default_funding_rate")]
    pub funding_rate_8h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage_override: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_override: Option<f64>,
}

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_hold_hours() -> f64 {
    24.0
}

fn default_funding_rate() -> f64 {
    0.0001
}

impl Default for PerpCosts {
    fn default() -> Self {
        Self {
            exchange: default_exchange(),
            vip_tier: 0,
            is_maker: false,
            hold_hours: default_hold_hours(),
            funding_rate_8h: default_funding_rate(),
            slippage_override: None,
            gas_override: None,
        }
    }
}

/// Itemised round-trip cost. Bucket fields are USD amounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub maker_fee: f64,
    pub taker_fee: f64,
    pub funding_drag: f64,
    pub slippage_estimate: f64,
    pub gas_fee: f64,
    pub total_cost_pct: f64,
    pub total_cost_usd: f64,
}

/// All-in round-trip cost for a perpetual position of `size_usd` notional.
pub fn round_trip_breakdown(costs: &PerpCosts, size_usd: f64) -> CostBreakdown {
    let schedule = fee_schedule(&costs.exchange, costs.vip_tier);
    let leg_fee = if costs.is_maker {
        schedule.maker
    } else {
        schedule.taker
    };
    let total_fee_pct = leg_fee * 2.0;

    let funding_pct = funding_drag(costs.funding_rate_8h, costs.hold_hours);

    let slippage = costs
        .slippage_override
        .unwrap_or_else(|| default_slippage(&costs.exchange));
    let total_slippage_pct = slippage * 2.0;

    let gas_usd = costs
        .gas_override
        .unwrap_or_else(|| default_gas_usd(&costs.exchange));
    let total_gas_usd = gas_usd * 2.0;
    let gas_pct = if size_usd > 0.0 {
        total_gas_usd / size_usd
    } else {
        0.0
    };

    // Maker rebates on top tiers can outweigh slippage and funding; a round
    // trip never pays the trader, so both totals floor at zero.
    let total_cost_pct = (total_fee_pct + funding_pct + total_slippage_pct + gas_pct).max(0.0);
    // Gas is counted both inside the percentage and as a flat amount.
    let total_cost_usd = (total_cost_pct * size_usd + total_gas_usd).max(0.0);

    debug!(
        exchange = %costs.exchange,
        size_usd,
        hold_hours = costs.hold_hours,
        total_cost_pct,
        total_cost_usd,
        "Perp round-trip cost"
    );

    CostBreakdown {
        maker_fee: if costs.is_maker {
            schedule.maker * size_usd * 2.0
        } else {
            0.0
        },
        taker_fee: if costs.is_maker {
            0.0
        } else {
            schedule.taker * size_usd * 2.0
        },
        funding_drag: funding_pct * size_usd,
        slippage_estimate: total_slippage_pct * size_usd,
        gas_fee: total_gas_usd,
        total_cost_pct,
        total_cost_usd,
    }
}
