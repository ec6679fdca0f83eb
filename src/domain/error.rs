//! Domain error types.
//!
//! Feed-level problems (`DataOrdering`, `InvalidBar`, `NoData`, `DataRead`)
//! halt a run. Per-input problems (`Validation`) drop that input only.
//! A full position book is not an error at all: see
//! [`Rejection::ConcurrencyCapReached`](crate::domain::simulator::Rejection).

use chrono::NaiveDateTime;

/// Top-level error type for mtftrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error(
        "out-of-order {timeframe} bar: received {received} after {previous}"
    )]
    DataOrdering {
        timeframe: String,
        previous: NaiveDateTime,
        received: NaiveDateTime,
    },

    #[error("invalid bar at {timestamp}: {reason}")]
    InvalidBar {
        timestamp: NaiveDateTime,
        reason: String,
    },

    #[error("validation error: {reason}")]
    Validation { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {symbol} on {timeframe}")]
    NoData { symbol: String, timeframe: String },

    #[error("data read error: {reason}")]
    DataRead { reason: String },

    #[error("execution gateway error: {reason}")]
    Gateway { reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    /// True for errors that mean the input feed itself is broken.
    pub fn is_data_problem(&self) -> bool {
        matches!(
            self,
            TraderError::DataOrdering { .. }
                | TraderError::InvalidBar { .. }
                | TraderError::NoData { .. }
                | TraderError::DataRead { .. }
        )
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Validation { .. } => 3,
            TraderError::Gateway { .. } | TraderError::Report { .. } => 4,
            TraderError::DataOrdering { .. }
            | TraderError::InvalidBar { .. }
            | TraderError::NoData { .. }
            | TraderError::DataRead { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
