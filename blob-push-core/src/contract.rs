#![allow(unused)]

//! # contract: capabilities consumed by the upload pipeline
//!
//! The pipeline never talks to a storage provider directly. It consumes:
//! - [`BlobStore`]: create a container, stream an object into it, page through its listing;
//! - [`MetricsSink`]: fire-and-forget counters and timings.
//!
//! Both traits are annotated for `mockall`, so tests can inject failures and delays
//! without a real backend. Concrete stores live in [`crate::fs_store`] and in the CLI crate.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::StoreError;

/// Streaming body handed to [`BlobStore::put_object`].
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
pub const DEFAULT_STREAM_PARALLELISM: usize = 4;

/// Provider tuning for a single object transfer. Does not affect correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    /// Bytes per transfer unit (block / part).
    pub chunk_size: usize,
    /// Parallel sub-transfers per object.
    pub stream_parallelism: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            stream_parallelism: DEFAULT_STREAM_PARALLELISM,
        }
    }
}

/// Read-only view of an object in the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteObject {
    pub key: String,
    pub size: Option<u64>,
    #[serde(skip)]
    pub last_modified: Option<SystemTime>,
}

impl RemoteObject {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: None,
            last_modified: None,
        }
    }
}

/// One page of a container listing. `next_marker == None` means there are no more pages.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<RemoteObject>,
    pub next_marker: Option<String>,
}

/// Object-storage capability. Implementations are bound to a single container.
///
/// The trait is `Send + Sync` and shared across upload workers behind an `Arc`.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create the container. Must return [`StoreError::AlreadyExists`] when it is already there.
    async fn create_container(&self, name: &str) -> Result<(), StoreError>;

    /// Stream `body` into the object at `key`, returning the number of bytes stored.
    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        options: &TransferOptions,
    ) -> Result<u64, StoreError>;

    /// Fetch the page of objects that follows `marker` (`None` for the first page).
    /// `page_size` is a hint; callers must not rely on it.
    async fn list_objects(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> Result<ListPage, StoreError>;
}

/// Metrics backend. Calls are fire-and-forget: no return value, no retry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait MetricsSink: Send + Sync {
    fn record(&self, event_code: &str, count: u64);

    fn record_duration(&self, event_code: &str, elapsed: Duration);
}
