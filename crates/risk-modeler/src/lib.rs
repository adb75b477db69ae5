//! Strategy risk modeling for leveraged crypto and futures books: tail VaR,
//! liquidation cascade scoring, margin and leverage limits, emergency
//! escalation and funding-rate analytics.

pub mod assessment;
pub mod cascade;
pub mod funding;
pub mod models;
pub mod tail;
#[cfg(test)]
mod tests;

pub use assessment::{
    assess_risk, check_emergency, correlation_regime, margin_buffer_ok, max_recommended_leverage,
};
pub use cascade::{
    cascade_magnitude, estimate_cascade_risk, estimate_market_cascade_risk, CascadeInputs,
    CascadeMagnitude, CascadeProfile, MarketSnapshot, SubScores, LIQUIDATION_PROFILE,
    RISK_MODELER_PROFILE,
};
pub use funding::{annualized_rate, detect_mean_reversion, find_carry_opportunities, funding_cost_per_trade};
pub use models::*;
pub use sigma_core::stats::percentile;
pub use tail::{cvar, evt_var, evt_var_estimate, fit_gpd, historical_var, TailEstimate, TailMethod};
