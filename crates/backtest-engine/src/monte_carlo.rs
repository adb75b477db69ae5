use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};
use rayon::prelude::*;
use sigma_core::stats::{mean, percentile_sorted, population_std};

use crate::metrics::max_drawdown;
use crate::models::{MonteCarloConfig, MonteCarloResult, Trade};

const DISTRIBUTION_POINTS: usize = 200;

/// Resample the trade P&L sequence to estimate the spread of outcomes.
///
/// Each simulation draws `trades.len()` trades with replacement (in blocks of
/// `block_size` contiguous trades to keep streaks intact) and records the total
/// P&L and dollar drawdown of the resulting sequence.
pub fn run_monte_carlo(trades: &[Trade], config: &MonteCarloConfig) -> MonteCarloResult {
    if trades.is_empty() || config.num_simulations == 0 {
        return MonteCarloResult::default();
    }

    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let n_trades = pnls.len();
    let block_size = config.block_size.clamp(1, n_trades);
    let n_blocks = n_trades.div_ceil(block_size);

    let outcomes: Vec<(f64, f64)> = (0..config.num_simulations)
        .into_par_iter()
        .map(|sim| {
            let mut rng: StdRng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(sim as u64)),
                None => StdRng::from_rng(thread_rng()).unwrap_or_else(|_| StdRng::seed_from_u64(sim as u64)),
            };

            let mut sampled = Vec::with_capacity(n_trades);
            while sampled.len() < n_trades {
                let start = rng.gen_range(0..n_blocks) * block_size;
                let end = (start + block_size).min(n_trades);
                for pnl in &pnls[start..end] {
                    if sampled.len() < n_trades {
                        sampled.push(*pnl);
                    }
                }
            }

            let total: f64 = sampled.iter().sum();
            let (dd_dollars, _) = max_drawdown(&sampled);
            (total, dd_dollars)
        })
        .collect();

    let mut totals: Vec<f64> = outcomes.iter().map(|o| o.0).collect();
    let mut drawdowns: Vec<f64> = outcomes.iter().map(|o| o.1).collect();
    totals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    drawdowns.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let profitable = totals.iter().filter(|t| **t > 0.0).count();

    let sample_dist = |sorted: &[f64]| -> Vec<f64> {
        if sorted.len() <= DISTRIBUTION_POINTS {
            return sorted.to_vec();
        }
        let step = sorted.len() as f64 / DISTRIBUTION_POINTS as f64;
        (0..DISTRIBUTION_POINTS)
            .map(|i| sorted[(i as f64 * step) as usize])
            .collect()
    };

    MonteCarloResult {
        simulations: config.num_simulations,
        mean_pnl: mean(&totals),
        median_pnl: percentile_sorted(&totals, 50.0),
        std_dev_pnl: population_std(&totals),
        percentile_5: percentile_sorted(&totals, 5.0),
        percentile_25: percentile_sorted(&totals, 25.0),
        percentile_75: percentile_sorted(&totals, 75.0),
        percentile_95: percentile_sorted(&totals, 95.0),
        probability_of_profit: profitable as f64 / totals.len() as f64,
        median_max_drawdown: percentile_sorted(&drawdowns, 50.0),
        max_drawdown_95: percentile_sorted(&drawdowns, 95.0),
        pnl_distribution: sample_dist(&totals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sigma_core::Side;

    fn trades(pnls: &[f64]) -> Vec<Trade> {
        pnls.iter()
            .enumerate()
            .map(|(i, &pnl)| Trade {
                entry_bar: i,
                exit_bar: i + 1,
                side: Side::Long,
                entry_price: 100.0,
                exit_price: 100.0,
                pnl,
                mfe: 0.0,
                mae: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let result = run_monte_carlo(&[], &MonteCarloConfig::default());
        assert_eq!(result.simulations, 0);
        assert!(result.pnl_distribution.is_empty());
    }

    #[test]
    fn test_identical_trades_have_no_spread() {
        let config = MonteCarloConfig {
            num_simulations: 50,
            block_size: 1,
            seed: Some(7),
        };
        let result = run_monte_carlo(&trades(&[10.0; 20]), &config);
        assert_eq!(result.simulations, 50);
        assert_relative_eq!(result.mean_pnl, 200.0, epsilon = 1e-9);
        assert_relative_eq!(result.std_dev_pnl, 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.probability_of_profit, 1.0);
        assert_eq!(result.median_max_drawdown, 0.0);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let t = trades(&[25.0, -10.0, 5.0, -30.0, 40.0, -5.0, 12.0]);
        let config = MonteCarloConfig {
            num_simulations: 200,
            block_size: 2,
            seed: Some(42),
        };
        let a = run_monte_carlo(&t, &config);
        let b = run_monte_carlo(&t, &config);
        assert_eq!(a.pnl_distribution, b.pnl_distribution);
        assert!(a.percentile_5 <= a.median_pnl && a.median_pnl <= a.percentile_95);
        assert!(a.probability_of_profit > 0.0 && a.probability_of_profit <= 1.0);
    }
}
