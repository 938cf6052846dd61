use super::runner::{StopReason, Worker, WorkerStats, WorkerStatus};
use super::WorkerConfig;
use crate::core::{RateError, RateProvider, RateResult, RateSnapshot};
use crate::store::RateStore;
use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Join future of a spawned worker. Shared so that every concurrent `stop`
/// can wait on it while the lifecycle keeps its own copy.
type WorkerJoin = Shared<BoxFuture<'static, Result<StopReason, String>>>;

struct WorkerHandle {
    currency: String,
    stats: Arc<WorkerStats>,
    task: WorkerJoin,
}

enum Lifecycle {
    Idle,
    /// Stays in place until every worker of this run has been joined, even
    /// while a `stop` is in progress.
    Running {
        run: u64,
        stop: CancellationToken,
        workers: Vec<WorkerHandle>,
    },
}

/// Owns the worker fleet and the shared rate store.
///
/// The stop token is created per `start` and is independent of the ambient
/// token handed to `start`: either one ends the workers. Cancelling the
/// ambient token does not reset the running flag; `stop` must still be
/// called to join the tasks.
pub struct Manager {
    config: WorkerConfig,
    provider: Arc<dyn RateProvider>,
    store: Arc<RateStore>,
    lifecycle: Mutex<Lifecycle>,
    runs: Mutex<u64>,
    last_status: Mutex<Vec<WorkerStatus>>,
}

#[derive(Default)]
pub struct ManagerBuilder {
    provider: Option<Arc<dyn RateProvider>>,
    config: WorkerConfig,
}

impl ManagerBuilder {
    pub fn provider(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> RateResult<Manager> {
        let provider = self
            .provider
            .ok_or_else(|| RateError::Config("rate provider is required".to_string()))?;
        Ok(Manager::new(provider, self.config))
    }
}

impl Manager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::default()
    }

    /// Zero or empty config fields are replaced with defaults.
    pub fn new(provider: Arc<dyn RateProvider>, config: WorkerConfig) -> Self {
        Self {
            config: config.resolved(),
            provider,
            store: Arc::new(RateStore::new()),
            lifecycle: Mutex::new(Lifecycle::Idle),
            runs: Mutex::new(0),
            last_status: Mutex::new(Vec::new()),
        }
    }

    /// Spawns one worker per configured currency. Does not wait for any
    /// fetch to complete.
    pub fn start(&self, cancel: CancellationToken) -> RateResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        if matches!(*lifecycle, Lifecycle::Running { .. }) {
            return Err(RateError::AlreadyRunning);
        }

        info!(count = self.config.currencies.len(), "Starting currency rate workers");

        let run = {
            let mut runs = self.runs.lock();
            *runs += 1;
            *runs
        };
        let stop = CancellationToken::new();
        let workers = self
            .config
            .currencies
            .iter()
            .map(|currency| {
                let worker = Worker::new(
                    currency,
                    Arc::clone(&self.provider),
                    Arc::clone(&self.store),
                    &self.config,
                );
                let stats = worker.stats();
                let task = tokio::spawn(worker.run(cancel.clone(), stop.clone()))
                    .map(|joined| joined.map_err(|e| e.to_string()))
                    .boxed()
                    .shared();
                WorkerHandle {
                    currency: currency.clone(),
                    stats,
                    task,
                }
            })
            .collect();

        *lifecycle = Lifecycle::Running { run, stop, workers };
        info!("All workers started");
        Ok(())
    }

    /// Signals every worker and waits for all of them to exit. Cached
    /// snapshots are kept. No-op when not running.
    ///
    /// Overlapping calls all wait for the same join. Dropping the future
    /// mid-join leaves the manager running with the stop already signalled,
    /// so a later `stop` completes the shutdown.
    pub async fn stop(&self) {
        let (run, pending) = {
            let lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Idle => return,
                Lifecycle::Running { run, stop, workers } => {
                    stop.cancel();
                    let pending: Vec<_> = workers
                        .iter()
                        .map(|w| (w.currency.clone(), w.task.clone()))
                        .collect();
                    (*run, pending)
                }
            }
        };

        info!("Stopping all workers...");
        let (currencies, tasks): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        let results = join_all(tasks).await;

        {
            let mut lifecycle = self.lifecycle.lock();
            let status = match &*lifecycle {
                Lifecycle::Running {
                    run: current,
                    workers,
                    ..
                } if *current == run => workers
                    .iter()
                    .map(|w| WorkerStatus::from_stats(&w.currency, &w.stats))
                    .collect(),
                // Another caller already finished this run.
                _ => return,
            };
            *self.last_status.lock() = status;
            *lifecycle = Lifecycle::Idle;
        }

        for (currency, joined) in currencies.iter().zip(results) {
            if let Err(e) = joined {
                error!(currency = %currency, error = %e, "Worker task failed");
            }
        }
        info!("All workers stopped");
    }

    pub fn get_rates(&self, base_currency: &str) -> RateResult<Arc<RateSnapshot>> {
        self.store.get(base_currency)
    }

    pub fn get_all_rates(&self) -> BTreeMap<String, Arc<RateSnapshot>> {
        self.store.get_all()
    }

    pub fn currencies(&self) -> &[String] {
        &self.config.currencies
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running { .. })
    }

    /// Per-worker counters of the current run, or of the last completed
    /// run when idle.
    pub fn worker_status(&self) -> Vec<WorkerStatus> {
        match &*self.lifecycle.lock() {
            Lifecycle::Running { workers, .. } => workers
                .iter()
                .map(|w| WorkerStatus::from_stats(&w.currency, &w.stats))
                .collect(),
            Lifecycle::Idle => self.last_status.lock().clone(),
        }
    }
}
