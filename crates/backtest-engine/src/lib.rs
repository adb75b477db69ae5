pub mod cost_model;
pub mod crypto_costs;
pub mod metrics;
pub mod models;
pub mod monte_carlo;
pub mod overfitting;
pub mod report;
pub mod simulator;
pub mod walk_forward;

#[cfg(test)]
mod tests;

pub use cost_model::CostModel;
pub use metrics::compute_metrics;
pub use models::*;
pub use monte_carlo::run_monte_carlo;
pub use overfitting::{check_overfit_flags, grade, overfit_diagnostics};
pub use report::{run_backtest, run_backtest_with, ReportOptions};
pub use simulator::simulate;
pub use walk_forward::{run_walk_forward, WalkForwardOptions};
