//! ### Error
//! Failure conditions raised by the analysis library.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The requested household, file or time range does not exist. Gaps in
    /// historical data are expected, so callers skip rather than retry.
    #[error("data unavailable for household {household}: {reason}")]
    DataUnavailable { household: String, reason: String },

    /// Overlapping alerts, bad horizons, `end <= start` and friends.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

impl AnalysisError {
    pub fn unavailable(household: &str, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            household: household.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
