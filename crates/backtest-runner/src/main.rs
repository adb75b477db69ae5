//! sigma-backtest: run a registered strategy over CSV price data and emit the
//! result document as JSON.
//!
//! Usage:
//!   sigma-backtest --strategy sma_crossover --data data/btc_1h.csv
//!   sigma-backtest --strategy sma_crossover --data data/btc_1h.csv \
//!       --cost-model '{"type":"crypto_cex"}' --walk-forward '{"train_bars":500,"test_bars":100}'
//!   sigma-backtest --strategy zscore_reversion --data data/btc_1h.csv \
//!       --trials 20 --monte-carlo '{"num_simulations":1000,"seed":7}'
//!   sigma-backtest --list-strategies

mod cli;
mod config;

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use backtest_engine::{
    run_backtest_with, run_walk_forward, MonteCarloConfig, ReportOptions, WalkForwardConfig,
    WalkForwardOptions,
};
use clap::error::ErrorKind;
use clap::Parser;
use data_loader::{load_csv, LoadOptions};
use sigma_core::ParamMap;
use strategies::{available_strategies, create_strategy};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::RunnerConfig;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let config = match RunnerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&cli, &config);

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli, config: &RunnerConfig) {
    let directive = if cli.verbose { "debug" } else { config.log_filter.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli, config: &RunnerConfig) -> Result<()> {
    if cli.list_strategies {
        for name in available_strategies() {
            println!("{name}");
        }
        return Ok(());
    }

    let (Some(strategy_name), Some(data_path)) = (cli.strategy.as_deref(), cli.data.as_deref()) else {
        anyhow::bail!("--strategy and --data are required");
    };

    let params = cli.params.as_deref().map(parse_params).transpose()?;
    let monte_carlo = cli.monte_carlo.as_deref().map(parse_monte_carlo).transpose()?;
    let trials = usize::try_from(cli.trials).context("--trials is out of range")?;
    // Fail on a bad name or bad params before touching the data.
    let strategy = create_strategy(strategy_name, params.as_ref())?;
    let cost_model = config.resolve_cost_model(cli.cost_model.as_deref())?;

    let options = LoadOptions {
        start_bar: cli.start_bar,
        end_bar: cli.end_bar,
    };
    let series = load_csv(data_path, &options)
        .with_context(|| format!("failed to load {}", data_path.display()))?;
    let data_file = data_path.display().to_string();

    let document = match cli.walk_forward.as_deref() {
        Some(raw) => {
            let wf_config = WalkForwardConfig::from_json(raw).context("invalid --walk-forward JSON")?;
            info!(
                strategy = strategy_name,
                train_bars = wf_config.train_bars,
                test_bars = wf_config.test_bars,
                "Starting walk-forward"
            );
            let report = run_walk_forward(
                &series,
                || create_strategy(strategy_name, params.as_ref()),
                &cost_model,
                &wf_config,
                &data_file,
                &WalkForwardOptions {
                    parallel: config.walk_forward_parallel,
                    trials,
                },
            )?;
            serde_json::to_string_pretty(&report)?
        }
        None => {
            let report = run_backtest_with(
                &series,
                strategy.as_ref(),
                &cost_model,
                &data_file,
                &ReportOptions {
                    equity_min_sample: config.equity_min_sample,
                    trials,
                    monte_carlo,
                },
            )?;
            serde_json::to_string_pretty(&report)?
        }
    };

    match cli.output.as_deref() {
        Some(path) => {
            write_atomic(path, &document)?;
            debug!(path = %path.display(), "Result written");
        }
        None => println!("{document}"),
    }
    Ok(())
}

fn parse_params(raw: &str) -> Result<ParamMap> {
    serde_json::from_str::<ParamMap>(raw).context("--params must be a JSON object")
}

fn parse_monte_carlo(raw: &str) -> Result<MonteCarloConfig> {
    let config: MonteCarloConfig =
        serde_json::from_str(raw).context("--monte-carlo must be a JSON object with num_simulations")?;
    if config.num_simulations == 0 || config.block_size == 0 {
        anyhow::bail!("--monte-carlo num_simulations and block_size must be positive");
    }
    Ok(config)
}

/// Write to a sibling temp file, then rename over the target.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("output path {} has no file name", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path)
            .with_context(|| format!("cannot create {}", tmp_path.display()))?;
        file.write_all(contents.as_bytes())?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("cannot move result into {}", path.display()))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
