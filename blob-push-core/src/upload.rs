//! Upload task: one file, one object.

use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, warn};

use crate::contract::{BlobStore, MetricsSink, ObjectBody, TransferOptions};
use crate::enumerate::FilePath;
use crate::error::UploadError;
use crate::metrics::{UPLOAD_EVENT, UPLOAD_FAILED_EVENT};

/// Unit of work handed to an upload worker.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub id: usize,
    pub path: FilePath,
    pub queued_at: Instant,
}

impl UploadJob {
    pub fn new(id: usize, path: FilePath) -> Self {
        Self {
            id,
            path,
            queued_at: Instant::now(),
        }
    }
}

/// Result of running one [`UploadJob`]. Exactly one is produced per job.
#[derive(Debug)]
pub struct UploadOutcome {
    pub id: usize,
    pub path: FilePath,
    pub duration: Duration,
    pub bytes: u64,
    /// Wall-clock time at which the task finished.
    pub completed_at: SystemTime,
    pub error: Option<UploadError>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn lost(id: usize, path: FilePath) -> Self {
        let local = path.local.clone();
        Self {
            id,
            path,
            duration: Duration::ZERO,
            bytes: 0,
            completed_at: SystemTime::now(),
            error: Some(UploadError::WorkerLost { path: local }),
        }
    }
}

/// Open the job's file and stream it to `store` under the job's key.
///
/// Never fails: local read and transfer errors are captured in the returned outcome.
/// Records one timing and one completion count on `metrics` either way.
pub async fn upload_file(
    job: UploadJob,
    store: &dyn BlobStore,
    options: &TransferOptions,
    metrics: &dyn MetricsSink,
) -> UploadOutcome {
    let started = Instant::now();
    debug!(
        key = %job.path.key,
        queued_ms = job.queued_at.elapsed().as_millis() as u64,
        "Starting upload"
    );

    let result = transfer(&job.path, store, options).await;
    let duration = started.elapsed();

    metrics.record_duration(UPLOAD_EVENT, duration);
    metrics.record(UPLOAD_EVENT, 1);

    let (bytes, error) = match result {
        Ok(bytes) => {
            info!(bytes, "{} took {:?} and completed", job.path.key, duration);
            (bytes, None)
        }
        Err(e) => {
            metrics.record(UPLOAD_FAILED_EVENT, 1);
            warn!(key = %job.path.key, error = %e, ?duration, "Upload failed");
            (0, Some(e))
        }
    };

    UploadOutcome {
        id: job.id,
        path: job.path,
        duration,
        bytes,
        completed_at: SystemTime::now(),
        error,
    }
}

async fn transfer(
    path: &FilePath,
    store: &dyn BlobStore,
    options: &TransferOptions,
) -> Result<u64, UploadError> {
    let file = tokio::fs::File::open(&path.local)
        .await
        .map_err(|source| UploadError::LocalRead {
            path: path.local.clone(),
            source,
        })?;
    let body: ObjectBody = Box::new(file);

    store
        .put_object(&path.key, body, options)
        .await
        .map_err(|source| UploadError::RemoteUpload {
            path: path.local.clone(),
            source,
        })
}
