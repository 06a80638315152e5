//! Error taxonomy for the upload pipeline.
//!
//! Errors fall into two groups:
//! - batch-level errors ([`SetupError`], [`EnumerationError`], [`ListingError`]) which
//!   propagate to the caller and end the run (or the listing phase);
//! - task-level errors ([`UploadError`]) which are captured inside an
//!   [`UploadOutcome`](crate::upload::UploadOutcome) and never unwind past the coordinator.

use std::path::PathBuf;

use thiserror::Error;

use crate::coordinator::BatchReport;

/// Errors reported by a [`BlobStore`](crate::contract::BlobStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("container already exists: {0}")]
    AlreadyExists(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport error: {0}")]
    Transport(String),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }
}

/// Fatal errors raised before any upload is dispatched.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("missing or invalid credentials: {0}")]
    Credentials(String),
    #[error("failed to create container {name}: {source}")]
    Container {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("cannot read root {}: {source}", .root.display())]
    Root {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk root {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Per-file failure, recorded in the outcome of the job that produced it.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("cannot open {}: {source}", .path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload of {} failed: {source}", .path.display())]
    RemoteUpload {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("worker exited before reporting {}", .path.display())]
    WorkerLost { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("listing failed: {0}")]
    Store(#[from] StoreError),
    #[error("store returned the same continuation marker twice: {0}")]
    StalledMarker(String),
}

/// Top-level error of [`run_pipeline`](crate::pipeline::run_pipeline).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),
    /// Uploads finished but the listing phase failed. The batch report is kept so the
    /// caller can still surface the upload summary.
    #[error("{source} (after uploads: {})", .batch.summary())]
    Listing {
        #[source]
        source: ListingError,
        batch: BatchReport,
    },
}
