//! High-level pipeline: prepare container → enumerate → upload batch → list container.
//!
//! # Ordering
//! - Nothing is dispatched before the container is ready and the file set is fully enumerated.
//! - Listing starts only after [`Coordinator::run_batch`] has returned, i.e. after every
//!   upload has produced its outcome.
//!
//! # Error Handling
//! - Setup and enumeration errors abort the run before any upload starts.
//! - Upload failures are reported in the [`BatchReport`], never as an `Err`.
//! - A listing failure is returned as [`PipelineError::Listing`], carrying the batch report.

use std::path::PathBuf;
use std::pin::pin;
use std::sync::Arc;

use futures::TryStreamExt;
use tracing::{debug, error, info, warn};

use crate::contract::{BlobStore, MetricsSink, RemoteObject};
use crate::coordinator::{BatchReport, Coordinator, CoordinatorConfig};
use crate::enumerate::{enumerate_excluding, SkippedEntry};
use crate::error::{ListingError, PipelineError, SetupError};
use crate::listing::{list_all, DEFAULT_PAGE_SIZE};
use crate::upload::UploadOutcome;

/// Inputs of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub root: PathBuf,
    pub container: String,
    pub key_prefix: Option<String>,
    pub coordinator: CoordinatorConfig,
    pub page_size: usize,
    /// Directories the walk must not enter, e.g. a local container below the root.
    pub exclude: Vec<PathBuf>,
}

impl PipelineConfig {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            container: container.into(),
            key_prefix: None,
            coordinator: CoordinatorConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct PipelineReport {
    pub batch: BatchReport,
    pub skipped: Vec<SkippedEntry>,
    /// Number of objects reported by the listing phase.
    pub listed: usize,
}

/// Create the container, treating "already exists" as success.
pub async fn prepare_container(store: &dyn BlobStore, name: &str) -> Result<(), SetupError> {
    match store.create_container(name).await {
        Ok(()) => {
            info!(container = name, "Container created");
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            warn!(container = name, "Container already exists, reusing it");
            Ok(())
        }
        Err(source) => {
            error!(container = name, error = %source, "Failed to create container");
            Err(SetupError::Container {
                name: name.to_string(),
                source,
            })
        }
    }
}

/// Stream the container listing into `on_object`, returning the number of objects seen.
pub async fn list_container<F>(
    store: &dyn BlobStore,
    page_size: usize,
    mut on_object: F,
) -> Result<usize, ListingError>
where
    F: FnMut(&RemoteObject),
{
    let mut objects = pin!(list_all(store, page_size));
    let mut listed = 0;
    while let Some(object) = objects.try_next().await? {
        on_object(&object);
        listed += 1;
    }
    info!(listed, "Container listing complete");
    Ok(listed)
}

/// Receives progress from [`run_pipeline`]. Every method defaults to a no-op.
pub trait PipelineObserver {
    /// Called once per upload outcome, as outcomes arrive.
    fn on_outcome(&mut self, _outcome: &UploadOutcome) {}

    /// Called once the batch has fully drained, before listing starts.
    fn on_batch_complete(&mut self, _report: &BatchReport) {}

    /// Called for every listed object, as the listing streams in.
    fn on_object(&mut self, _object: &RemoteObject) {}
}

impl PipelineObserver for () {}

pub async fn run_pipeline<P>(
    store: Arc<dyn BlobStore>,
    metrics: Arc<dyn MetricsSink>,
    config: &PipelineConfig,
    observer: &mut P,
) -> Result<PipelineReport, PipelineError>
where
    P: PipelineObserver + ?Sized,
{
    info!(
        root = %config.root.display(),
        container = %config.container,
        pool_size = config.coordinator.pool_size,
        "Starting upload pipeline"
    );

    config.coordinator.validate()?;
    prepare_container(store.as_ref(), &config.container).await?;

    // Excluded paths are resolved after setup so a freshly created container is found.
    let batch = enumerate_excluding(
        &config.root,
        config.key_prefix.as_deref(),
        &config.exclude,
    )?;
    let skipped = batch.skipped;

    let coordinator = Coordinator::new(Arc::clone(&store), metrics, config.coordinator);
    let report = coordinator
        .run_batch(batch.files, |outcome| observer.on_outcome(outcome))
        .await;
    match serde_json::to_string(&report.counters()) {
        Ok(json) => debug!(json = %json, "Batch counters"),
        Err(e) => error!(error = ?e, "Failed to serialize batch counters"),
    }
    observer.on_batch_complete(&report);

    match list_container(store.as_ref(), config.page_size, |object| {
        observer.on_object(object)
    })
    .await
    {
        Ok(listed) => Ok(PipelineReport {
            batch: report,
            skipped,
            listed,
        }),
        Err(source) => {
            error!(error = %source, "Listing failed after uploads completed");
            Err(PipelineError::Listing {
                source,
                batch: report,
            })
        }
    }
}
