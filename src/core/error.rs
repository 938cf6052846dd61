//! Error taxonomy for the rate cache.

use thiserror::Error;

/// Errors surfaced by the store, workers and manager.
#[derive(Debug, Error)]
pub enum RateError {
    /// Invalid or incomplete configuration at construction time.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single provider fetch failed. Workers log these and retry on the
    /// next tick; they never reach readers.
    #[error("failed to fetch rates for {currency}: {source}")]
    Fetch {
        currency: String,
        #[source]
        source: anyhow::Error,
    },

    /// No snapshot exists for the requested base currency.
    #[error("rates not found for currency: {currency}")]
    NotFound { currency: String },

    /// `start` was called while workers are already running.
    #[error("workers are already running")]
    AlreadyRunning,
}

impl RateError {
    pub fn not_found(currency: &str) -> Self {
        RateError::NotFound {
            currency: currency.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RateError::NotFound { .. })
    }

    /// The currency a `NotFound` or `Fetch` error refers to.
    pub fn currency(&self) -> Option<&str> {
        match self {
            RateError::NotFound { currency } | RateError::Fetch { currency, .. } => Some(currency),
            _ => None,
        }
    }
}

pub type RateResult<T> = Result<T, RateError>;
