use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed cost model, walk-forward config, strategy name or params.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Price data that cannot be aligned or validated.
    #[error("Data error: {0}")]
    Data(String),

    #[error("Invalid signal {value} at bar {index} (expected -1, 0 or 1)")]
    InvalidSignal { index: usize, value: i64 },

    /// Failure raised by a strategy's indicator or signal stage.
    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
