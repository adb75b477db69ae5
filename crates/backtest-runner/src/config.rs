use std::env;

use anyhow::{Context, Result};
use backtest_engine::CostModel;

/// Runner settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// tracing filter directive, e.g. `warn` or `backtest_engine=debug`
    pub log_filter: String,
    /// Cost model used when `--cost-model` is absent: a JSON object or a bare type name.
    pub default_cost_model: Option<String>,
    pub walk_forward_parallel: bool,
    /// Lower bound on the equity-curve sampling interval.
    pub equity_min_sample: usize,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            log_filter: lookup("SIGMA_LOG")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| "warn".to_string()),
            default_cost_model: lookup("SIGMA_DEFAULT_COST_MODEL").filter(|v| !v.trim().is_empty()),
            walk_forward_parallel: lookup("SIGMA_WF_PARALLEL")
                .unwrap_or_else(|| "true".to_string())
                .trim()
                .parse()
                .context("SIGMA_WF_PARALLEL must be true or false")?,
            equity_min_sample: lookup("SIGMA_EQUITY_MIN_SAMPLE")
                .unwrap_or_else(|| "10".to_string())
                .trim()
                .parse()
                .context("SIGMA_EQUITY_MIN_SAMPLE must be a positive integer")?,
        };

        if config.equity_min_sample == 0 {
            anyhow::bail!("SIGMA_EQUITY_MIN_SAMPLE must be a positive integer");
        }
        Ok(config)
    }

    /// `--cost-model` wins over the environment default; futures otherwise.
    pub fn resolve_cost_model(&self, flag: Option<&str>) -> Result<CostModel> {
        match flag.or(self.default_cost_model.as_deref()) {
            None => Ok(CostModel::default()),
            Some(raw) if raw.trim_start().starts_with('{') => {
                CostModel::from_json(raw).context("invalid cost model JSON")
            }
            Some(kind) => CostModel::default_for(kind.trim()).context("invalid cost model type"),
        }
    }
}
