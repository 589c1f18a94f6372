use forecast_core::PickError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Insufficient history: need at least {needed} points, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Window length mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Non-finite value in input")]
    NonFinite,

    #[error("Degenerate input: {0}")]
    Degenerate(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Forecast cancelled")]
    Cancelled,
}

impl From<ForecastError> for PickError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::InsufficientHistory { needed, got } => {
                PickError::InsufficientHistory { needed, got }
            }
            ForecastError::InvalidConfig(msg) => PickError::InvalidConfig(msg),
            ForecastError::Cancelled => PickError::Timeout("forecast cancelled".to_string()),
            other => PickError::Degenerate(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_history_carries_over() {
        let err = ForecastError::InsufficientHistory { needed: 31, got: 30 };
        assert_eq!(
            err.to_string(),
            "Insufficient history: need at least 31 points, got 30"
        );
        assert!(matches!(
            PickError::from(err),
            PickError::InsufficientHistory { needed: 31, got: 30 }
        ));
    }

    #[test]
    fn test_cancelled_becomes_timeout() {
        assert!(matches!(
            PickError::from(ForecastError::Cancelled),
            PickError::Timeout(_)
        ));
    }
}
