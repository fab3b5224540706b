use thiserror::Error;

use crate::tickers::Symbol;

/// Per-view error taxonomy. Configuration errors abort the current view;
/// fetch and render errors are recorded per symbol and never abort a batch.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Fetch failed for {symbol}: {cause}")]
    Fetch { symbol: Symbol, cause: String },

    #[error("Chart for {symbol} could not be drawn: {reason}")]
    Render { symbol: Symbol, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    pub fn fetch(symbol: &Symbol, cause: impl std::fmt::Display) -> Self {
        AppError::Fetch {
            symbol: symbol.clone(),
            cause: cause.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }
}
