#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use blob_push_core::contract::{BlobStore, ListPage, ObjectBody, RemoteObject, TransferOptions};
use blob_push_core::error::StoreError;
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PutStarted(String),
    PutFinished(String),
    List,
}

/// In-memory store that records the order of calls and can delay, block or fail uploads.
#[derive(Default)]
pub struct RecordingStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    events: Mutex<Vec<Event>>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    gate: Option<Semaphore>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    puts: AtomicUsize,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    /// Every upload blocks until [`RecordingStore::release`] hands out a permit.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn push_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl BlobStore for RecordingStore {
    async fn create_container(&self, _name: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        mut body: ObjectBody,
        _options: &TransferOptions,
    ) -> Result<u64, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.push_event(Event::PutStarted(key.to_string()));

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if let Some(delay) = self.delays.get(key) {
            tokio::time::sleep(*delay).await;
        }

        let mut data = Vec::new();
        let read = body.read_to_end(&mut data).await;

        self.push_event(Event::PutFinished(key.to_string()));
        self.active.fetch_sub(1, Ordering::SeqCst);

        read?;
        if self.failing.contains(key) {
            return Err(StoreError::Transport(format!("simulated transport error for {key}")));
        }
        let len = data.len() as u64;
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(len)
    }

    async fn list_objects(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        self.push_event(Event::List);
        let objects = self.objects.lock().unwrap();
        let mut page: Vec<RemoteObject> = objects
            .iter()
            .filter(|(k, _)| marker.as_ref().map_or(true, |m| k.as_str() > m.as_str()))
            .take(page_size + 1)
            .map(|(k, v)| RemoteObject {
                key: k.clone(),
                size: Some(v.len() as u64),
                last_modified: None,
            })
            .collect();
        let next_marker = if page.len() > page_size {
            page.truncate(page_size);
            page.last().map(|o| o.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            objects: page,
            next_marker,
        })
    }
}

/// Writes `files` (relative path, size in bytes) under `root`.
pub fn write_tree(root: &Path, files: &[(&str, usize)]) {
    for (relative, size) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, vec![b'x'; *size]).unwrap();
    }
}

/// Waits until `condition` holds, panicking after `timeout`.
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Observer that keeps everything the pipeline reports.
#[derive(Default)]
pub struct Collecting {
    pub progress: Vec<String>,
    pub batch_summary: Option<String>,
    pub listed: Vec<RemoteObject>,
}

impl blob_push_core::pipeline::PipelineObserver for Collecting {
    fn on_outcome(&mut self, outcome: &blob_push_core::upload::UploadOutcome) {
        assert!(
            self.batch_summary.is_none(),
            "outcome reported after the batch completed"
        );
        self.progress.push(outcome.path.key.clone());
    }

    fn on_batch_complete(&mut self, report: &blob_push_core::coordinator::BatchReport) {
        self.batch_summary = Some(report.summary());
    }

    fn on_object(&mut self, object: &RemoteObject) {
        assert!(
            self.batch_summary.is_some(),
            "object listed before the batch completed"
        );
        self.listed.push(object.clone());
    }
}

impl Collecting {
    pub fn listed_keys(&self) -> Vec<String> {
        self.listed.iter().map(|o| o.key.clone()).collect()
    }
}
