use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "sigma-backtest",
    version,
    about = "Run a strategy backtest or walk-forward analysis over OHLCV data"
)]
pub struct Cli {
    /// Registered strategy name (see --list-strategies)
    #[arg(long, required_unless_present = "list_strategies")]
    pub strategy: Option<String>,

    /// CSV file with timestamp, open, high, low, close[, volume]
    #[arg(long, required_unless_present = "list_strategies")]
    pub data: Option<PathBuf>,

    /// Cost model JSON or type name, e.g. {"type":"crypto_cex","taker_fee":0.001}
    #[arg(long)]
    pub cost_model: Option<String>,

    /// Walk-forward JSON, e.g. {"train_bars":100,"test_bars":20}
    #[arg(long)]
    pub walk_forward: Option<String>,

    /// Strategy parameter overrides as a JSON object
    #[arg(long)]
    pub params: Option<String>,

    /// Strategy variants tried before this one (deflated Sharpe ratio)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub trials: u64,

    /// Resample the trade list, e.g. {"num_simulations":1000,"seed":7}
    #[arg(long, conflicts_with = "walk_forward")]
    pub monte_carlo: Option<String>,

    /// First bar to keep
    #[arg(long, default_value_t = 0)]
    pub start_bar: usize,

    /// End bar (exclusive); -1 keeps the rest of the file
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub end_bar: i64,

    /// Write the JSON result here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Debug-level logging on stderr
    #[arg(long, short)]
    pub verbose: bool,

    /// Print the registered strategy names and exit
    #[arg(long)]
    pub list_strategies: bool,
}
