//! # blob-push CLI interface
//!
//! Command parsing and the async [`run`] entrypoint shared by `main` and the integration
//! tests. All upload, coordination and listing logic lives in `blob-push-core`; this module
//! only picks a store for the destination, maps the config, and prints results.
//!
//! ## Output
//! stdout carries the user-facing report:
//!
//! ```text
//! a.txt took 1.2ms and completed at 2024-05-01 12:00:00
//! b/b.txt failed: upload of ./b/b.txt failed: transport error: ...
//! 1 succeeded, 1 failed
//! Listing the blobs in the container:
//!     Blob name: a.txt
//! ```
//!
//! Diagnostics go through `tracing` to stderr. A degraded batch still exits 0; setup,
//! enumeration and listing errors exit non-zero.
use crate::destination::Destination;
use crate::load_config::load_optional_config;
use crate::s3::{S3Credentials, S3Store};
use anyhow::{Context, Result};
use blob_push_core::contract::{BlobStore, RemoteObject};
use blob_push_core::coordinator::BatchReport;
use blob_push_core::error::PipelineError;
use blob_push_core::fs_store::FsStore;
use blob_push_core::metrics::TracingMetrics;
use blob_push_core::pipeline::{list_container, run_pipeline, PipelineObserver};
use blob_push_core::upload::UploadOutcome;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

pub const LISTING_HEADER: &str = "Listing the blobs in the container:";

/// CLI for blob-push: upload a directory tree to an object-storage container.
#[derive(Parser)]
#[clap(
    name = "blob-push",
    version,
    about = "Upload every file below a directory to an object-storage container, then list it"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload every regular file below ROOT, then list the container
    Upload {
        /// Directory (or single file) to upload
        root: PathBuf,
        /// `s3://<bucket>` or `file://<dir>/<container>`
        destination: Destination,
        /// Path to the YAML tuning config
        #[clap(long)]
        config: Option<PathBuf>,
        /// Number of concurrent uploads, overrides `upload.concurrency`
        #[clap(long)]
        concurrency: Option<usize>,
    },
    /// List the objects in a container
    List {
        /// `s3://<bucket>` or `file://<dir>/<container>`
        destination: Destination,
        /// Path to the YAML tuning config
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

/// Prints progress, the batch summary and the listing to stdout.
struct ConsoleReporter {
    header_printed: bool,
}

impl ConsoleReporter {
    fn new() -> Self {
        Self {
            header_printed: false,
        }
    }

    fn header(&mut self) {
        if !self.header_printed {
            println!("{LISTING_HEADER}");
            self.header_printed = true;
        }
    }
}

impl PipelineObserver for ConsoleReporter {
    fn on_outcome(&mut self, outcome: &UploadOutcome) {
        match &outcome.error {
            None => println!(
                "{} took {:?} and completed at {}",
                outcome.path.key,
                outcome.duration,
                completion_time(outcome)
            ),
            Some(e) => println!("{} failed: {e}", outcome.path.key),
        }
    }

    fn on_batch_complete(&mut self, report: &BatchReport) {
        println!("{}", report.summary());
        self.header();
    }

    fn on_object(&mut self, object: &RemoteObject) {
        println!("\tBlob name: {}", object.key);
    }
}

/// Local wall-clock completion time, `YYYY-MM-DD HH:MM:SS`.
fn completion_time(outcome: &UploadOutcome) -> String {
    DateTime::<Local>::from(outcome.completed_at)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

async fn open_store(destination: &Destination) -> Result<Arc<dyn BlobStore>> {
    match destination {
        Destination::Fs { base, container } => {
            tracing::info!(base = ?base, container = %container, "Using filesystem store");
            Ok(Arc::new(FsStore::new(base, container.as_str())))
        }
        Destination::S3 { bucket } => {
            let credentials = S3Credentials::from_env()?;
            tracing::info!(bucket = %bucket, "Using S3 store");
            Ok(Arc::new(S3Store::connect(credentials, bucket.as_str()).await))
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Upload {
            root,
            destination,
            config,
            concurrency,
        } => {
            let config = load_optional_config(config.as_deref())?;
            let mut pipeline_config =
                config.pipeline_config(root, destination.container(), concurrency);
            // A local container under the root must not be uploaded into itself.
            pipeline_config.exclude.extend(destination.local_dir());
            let store = open_store(&destination).await?;
            tracing::info!(command = "upload", destination = %destination, "Starting upload");

            let mut reporter = ConsoleReporter::new();
            match run_pipeline(
                store,
                Arc::new(TracingMetrics),
                &pipeline_config,
                &mut reporter,
            )
            .await
            {
                Ok(report) => {
                    tracing::info!(
                        command = "upload",
                        summary = %report.batch.summary(),
                        skipped = report.skipped.len(),
                        listed = report.listed,
                        "Upload complete"
                    );
                    Ok(())
                }
                Err(PipelineError::Listing { source, batch }) => {
                    tracing::error!(command = "upload", error = %source, "Listing failed");
                    Err(anyhow::Error::new(source)
                        .context(format!("listing failed after uploads ({})", batch.summary())))
                }
                Err(e) => {
                    tracing::error!(command = "upload", error = %e, "Upload aborted");
                    Err(anyhow::Error::new(e).context("upload aborted"))
                }
            }
        }
        Commands::List {
            destination,
            config,
        } => {
            let config = load_optional_config(config.as_deref())?;
            let store = open_store(&destination).await?;
            tracing::info!(command = "list", destination = %destination, "Listing container");

            let mut reporter = ConsoleReporter::new();
            reporter.header();
            let listed = list_container(store.as_ref(), config.listing.page_size, |object| {
                reporter.on_object(object)
            })
            .await
            .with_context(|| format!("failed to list {destination}"))?;
            tracing::info!(command = "list", listed, "Listing complete");
            Ok(())
        }
    }
}
