use super::WorkerConfig;
use crate::core::{RateError, RateProvider, RateResult, RateSnapshot};
use crate::store::RateStore;
use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Created,
    Running,
    Stopped,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::Created,
            1 => WorkerState::Running,
            _ => WorkerState::Stopped,
        }
    }
}

/// Why a worker left its run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The ambient token passed to `Manager::start` was cancelled.
    Cancelled,
    /// `Manager::stop` fired the stop token.
    StopSignal,
}

/// Counters shared between a running worker and its manager.
#[derive(Debug, Default)]
pub struct WorkerStats {
    state: AtomicU8,
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

impl WorkerStats {
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a worker, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub currency: String,
    pub state: WorkerState,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

impl WorkerStatus {
    pub(crate) fn from_stats(currency: &str, stats: &WorkerStats) -> Self {
        Self {
            currency: currency.to_string(),
            state: stats.state(),
            attempts: stats.attempts(),
            successes: stats.successes(),
            failures: stats.failures(),
        }
    }
}

/// Refreshes the snapshot of a single base currency.
///
/// `run` consumes the worker, so a stopped worker cannot be restarted.
pub struct Worker {
    base_currency: String,
    provider: Arc<dyn RateProvider>,
    store: Arc<RateStore>,
    fetch_interval: Duration,
    request_timeout: Duration,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(
        base_currency: &str,
        provider: Arc<dyn RateProvider>,
        store: Arc<RateStore>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            base_currency: base_currency.to_string(),
            provider,
            store,
            fetch_interval: config.fetch_interval,
            request_timeout: config.request_timeout,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> WorkerState {
        self.stats.state()
    }

    /// Fetches immediately, then once per interval until `cancel` or `stop`
    /// fires.
    pub async fn run(self, cancel: CancellationToken, stop: CancellationToken) -> StopReason {
        self.stats.set_state(WorkerState::Running);
        info!(currency = %self.base_currency, "Worker started");

        let reason = self.run_loop(&cancel, &stop).await;

        self.stats.set_state(WorkerState::Stopped);
        match reason {
            StopReason::Cancelled => {
                info!(currency = %self.base_currency, "Worker stopped: context cancelled")
            }
            StopReason::StopSignal => {
                info!(currency = %self.base_currency, "Worker stopped: stop signal received")
            }
        }
        reason
    }

    async fn run_loop(&self, cancel: &CancellationToken, stop: &CancellationToken) -> StopReason {
        if cancel.is_cancelled() {
            return StopReason::Cancelled;
        }
        if stop.is_cancelled() {
            return StopReason::StopSignal;
        }

        if !self.refresh(cancel).await {
            return StopReason::Cancelled;
        }

        let mut ticker = interval_at(Instant::now() + self.fetch_interval, self.fetch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return StopReason::Cancelled,
                _ = stop.cancelled() => return StopReason::StopSignal,
                _ = ticker.tick() => {
                    if !self.refresh(cancel).await {
                        return StopReason::Cancelled;
                    }
                }
            }
        }
    }

    /// Runs one fetch, abandoning it if `cancel` fires first. Returns false
    /// when cancelled.
    async fn refresh(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            result = self.fetch_once() => {
                if let Err(e) = result {
                    warn!(
                        currency = %self.base_currency,
                        error = %e,
                        "Fetch failed, keeping previous snapshot"
                    );
                }
                true
            }
        }
    }

    /// Fetches the latest rates within the request timeout and stores them.
    pub async fn fetch_once(&self) -> RateResult<Arc<RateSnapshot>> {
        self.stats.attempts.fetch_add(1, Ordering::Relaxed);
        debug!(currency = %self.base_currency, "Fetching latest rates");

        let fetched = match timeout(
            self.request_timeout,
            self.provider.fetch_latest(&self.base_currency),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "request timed out after {}ms",
                self.request_timeout.as_millis()
            )),
        };

        match fetched {
            Ok(latest) => {
                let snapshot = Arc::new(RateSnapshot::from_latest(
                    &self.base_currency,
                    latest,
                    Utc::now(),
                ));
                self.store.set(&self.base_currency, Arc::clone(&snapshot));
                self.stats.successes.fetch_add(1, Ordering::Relaxed);
                debug!(
                    currency = %self.base_currency,
                    rates = snapshot.rates.len(),
                    "Updated rates"
                );
                Ok(snapshot)
            }
            Err(source) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                Err(RateError::Fetch {
                    currency: self.base_currency.clone(),
                    source,
                })
            }
        }
    }
}
