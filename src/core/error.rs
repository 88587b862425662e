//! Error taxonomy shared by the data access, analytics and screening layers.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarketError {
    /// The provider does not recognise the ticker.
    #[error("Ticker not found: {0}")]
    NotFound(String),

    /// Transport failure, timeout, non-success status or malformed body.
    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

pub type MarketResult<T> = std::result::Result<T, MarketError>;

impl From<reqwest::Error> for MarketError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MarketError::Upstream(format!("Request timed out: {e}"))
        } else {
            MarketError::Upstream(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            MarketError::NotFound("ZZZZ".to_string()).to_string(),
            "Ticker not found: ZZZZ"
        );
        assert_eq!(
            MarketError::Validation("bad ticker".to_string()).to_string(),
            "Invalid input: bad ticker"
        );
    }

    #[test]
    fn test_downcast_through_anyhow() {
        let err: anyhow::Error = MarketError::InsufficientData("AAPL".to_string()).into();
        assert!(matches!(
            err.downcast_ref::<MarketError>(),
            Some(MarketError::InsufficientData(_))
        ));
    }
}
