//! Core abstractions shared by the store, workers and providers

pub mod config;
pub mod error;
pub mod log;
pub mod rates;

// Re-export main types for cleaner imports
pub use error::{RateError, RateResult};
pub use rates::{LatestRates, RateInfo, RateProvider, RateSnapshot};
