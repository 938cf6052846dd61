//! Background workers that keep the rate store fresh.
//!
//! One [`Worker`] runs per tracked base currency, each on its own tokio
//! task. The [`Manager`] owns the fleet, the shared [`RateStore`] and the
//! stop signal, and is the only surface readers talk to.
//!
//! [`RateStore`]: crate::store::RateStore

pub mod manager;
pub mod runner;

pub use manager::{Manager, ManagerBuilder};
pub use runner::{StopReason, Worker, WorkerState, WorkerStats, WorkerStatus};

use std::time::Duration;
use tracing::warn;

pub const DEFAULT_CURRENCIES: [&str; 3] = ["USD", "EUR", "GBP"];
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Base currencies to track, one worker each. Callers deduplicate.
    pub currencies: Vec<String>,
    /// Time between the end of one fetch and the next tick.
    pub fetch_interval: Duration,
    /// Upper bound for a single provider call.
    pub request_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            currencies: DEFAULT_CURRENCIES.iter().map(|c| c.to_string()).collect(),
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl WorkerConfig {
    /// Replaces empty or zero fields with the defaults.
    pub fn resolved(mut self) -> Self {
        let defaults = Self::default();
        if self.currencies.is_empty() {
            self.currencies = defaults.currencies;
        }
        if self.fetch_interval.is_zero() {
            self.fetch_interval = defaults.fetch_interval;
        }
        if self.request_timeout.is_zero() {
            self.request_timeout = defaults.request_timeout;
        }
        if self.request_timeout > self.fetch_interval {
            warn!(
                timeout = ?self.request_timeout,
                interval = ?self.fetch_interval,
                "Request timeout exceeds fetch interval; fetches may lag behind ticks"
            );
        }
        self
    }
}
