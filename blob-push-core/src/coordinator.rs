//! Upload coordinator: bounded fan-out of upload tasks over a fixed worker pool.
//!
//! ```text
//!   files ──► [bounded job queue] ──► worker 0..P ──► [outcome channel] ──► collector
//! ```
//!
//! - At most `pool_size` uploads are in flight; dispatch blocks while the queue is full.
//! - The collector is the only writer of the outcome list.
//! - [`Coordinator::run_batch`] returns once the queue is closed, every worker has exited
//!   and every job has exactly one outcome. Jobs whose worker died without reporting get a
//!   synthesized [`UploadError::WorkerLost`](crate::error::UploadError::WorkerLost) outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::contract::{BlobStore, MetricsSink, TransferOptions};
use crate::enumerate::FilePath;
use crate::error::SetupError;
use crate::metrics::{UPLOAD_EVENT, UPLOAD_FAILED_EVENT};
use crate::upload::{upload_file, UploadJob, UploadOutcome};

pub const DEFAULT_POOL_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Maximum number of uploads in flight.
    pub pool_size: usize,
    pub transfer: TransferOptions,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            transfer: TransferOptions::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.pool_size == 0 {
            return Err(SetupError::Config("pool size must be at least 1".into()));
        }
        if self.transfer.chunk_size == 0 {
            return Err(SetupError::Config("chunk size must be at least 1 byte".into()));
        }
        if self.transfer.stream_parallelism == 0 {
            return Err(SetupError::Config(
                "stream parallelism must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Aggregate of every outcome in a batch, ordered by job id.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<UploadOutcome>,
    pub elapsed: Duration,
}

/// Serializable counters of a [`BatchReport`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub bytes: u64,
    pub elapsed_ms: u128,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn is_degraded(&self) -> bool {
        self.failed() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// `"<n> succeeded, <m> failed"`
    pub fn summary(&self) -> String {
        format!("{} succeeded, {} failed", self.succeeded(), self.failed())
    }

    pub fn counters(&self) -> BatchSummary {
        BatchSummary {
            total: self.total(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            bytes: self.outcomes.iter().map(|o| o.bytes).sum(),
            elapsed_ms: self.elapsed.as_millis(),
        }
    }
}

pub struct Coordinator {
    store: Arc<dyn BlobStore>,
    metrics: Arc<dyn MetricsSink>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn BlobStore>,
        metrics: Arc<dyn MetricsSink>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Upload every file in `files` and wait for the whole batch to drain.
    ///
    /// `on_outcome` is called from the collector once per outcome, in arrival order.
    /// Individual failures are recorded in the report; they never stop dispatch.
    pub async fn run_batch<F>(&self, files: Vec<FilePath>, mut on_outcome: F) -> BatchReport
    where
        F: FnMut(&UploadOutcome),
    {
        let started = Instant::now();
        let total = files.len();
        if total == 0 {
            info!("Empty batch, nothing to upload");
            return BatchReport::default();
        }

        let workers = self.config.pool_size.max(1).min(total);
        info!(files = total, workers, "Dispatching upload batch");

        let (job_tx, job_rx) = mpsc::channel::<UploadJob>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<UploadOutcome>(workers);

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let jobs = Arc::clone(&job_rx);
            let outcomes = outcome_tx.clone();
            let store = Arc::clone(&self.store);
            let metrics = Arc::clone(&self.metrics);
            let transfer = self.config.transfer;
            pool.spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some(job) = next else { break };
                    let outcome =
                        upload_file(job, store.as_ref(), &transfer, metrics.as_ref()).await;
                    if outcomes.send(outcome).await.is_err() {
                        break;
                    }
                }
                debug!(worker_id, "Upload worker finished");
            });
        }
        // Workers hold the only remaining senders: the channel closes when the last one exits.
        drop(outcome_tx);
        drop(job_rx);

        let mut pending: HashMap<usize, FilePath> = files
            .iter()
            .cloned()
            .enumerate()
            .collect();

        let produce = async move {
            for (id, path) in files.into_iter().enumerate() {
                if job_tx.send(UploadJob::new(id, path)).await.is_err() {
                    warn!(next_job = id, "All upload workers exited, stopping dispatch");
                    break;
                }
            }
        };

        let collect = async {
            let mut outcomes = Vec::with_capacity(total);
            while let Some(outcome) = outcome_rx.recv().await {
                if pending.remove(&outcome.id).is_none() {
                    error!(job = outcome.id, key = %outcome.path.key, "Discarding duplicate outcome");
                    continue;
                }
                on_outcome(&outcome);
                outcomes.push(outcome);
            }
            outcomes
        };

        let ((), mut outcomes) = tokio::join!(produce, collect);

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Upload worker terminated abnormally");
            }
        }

        let mut lost: Vec<_> = pending.into_iter().collect();
        lost.sort_by_key(|(id, _)| *id);
        for (id, path) in lost {
            warn!(job = id, key = %path.key, "No outcome reported, marking upload as failed");
            self.metrics.record_duration(UPLOAD_EVENT, Duration::ZERO);
            self.metrics.record(UPLOAD_EVENT, 1);
            self.metrics.record(UPLOAD_FAILED_EVENT, 1);
            let outcome = UploadOutcome::lost(id, path);
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        outcomes.sort_by_key(|o| o.id);
        let report = BatchReport {
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            total = report.total(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed = ?report.elapsed,
            "Upload batch drained"
        );
        report
    }
}
