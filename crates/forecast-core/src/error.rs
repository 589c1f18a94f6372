use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes for a single ticker's pass. None of them is fatal to the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingData,
    Upstream,
    InsufficientWindow,
    FitFailure,
    Config,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::MissingData => "missing data",
            ErrorKind::Upstream => "upstream failure",
            ErrorKind::InsufficientWindow => "insufficient history",
            ErrorKind::FitFailure => "fit/predict failure",
            ErrorKind::Config => "configuration",
        }
    }
}

#[derive(Error, Debug)]
pub enum PickError {
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Insufficient history: need at least {needed} closes, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("Degenerate input: {0}")]
    Degenerate(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PickError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PickError::MissingData(_) => ErrorKind::MissingData,
            PickError::Upstream(_) | PickError::Timeout(_) => ErrorKind::Upstream,
            PickError::InsufficientHistory { .. } => ErrorKind::InsufficientWindow,
            PickError::Degenerate(_) => ErrorKind::FitFailure,
            PickError::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, PickError::Upstream(_) | PickError::Timeout(_))
    }
}

pub type PickResult<T> = Result<T, PickError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(PickError::MissingData("x".into()).kind(), ErrorKind::MissingData);
        assert_eq!(PickError::Timeout("x".into()).kind(), ErrorKind::Upstream);
        assert_eq!(
            PickError::InsufficientHistory { needed: 30, got: 12 }.kind(),
            ErrorKind::InsufficientWindow
        );
        assert_eq!(PickError::Degenerate("flat".into()).kind(), ErrorKind::FitFailure);
    }

    #[test]
    fn test_insufficient_history_message() {
        let err = PickError::InsufficientHistory { needed: 31, got: 30 };
        assert_eq!(
            err.to_string(),
            "Insufficient history: need at least 31 closes, got 30"
        );
    }

    #[test]
    fn test_only_upstream_is_transient() {
        assert!(PickError::Upstream("503".into()).is_transient());
        assert!(PickError::Timeout("bars".into()).is_transient());
        assert!(!PickError::MissingData("AAPL".into()).is_transient());
        assert!(!PickError::Degenerate("flat".into()).is_transient());
    }
}
