#![doc = "blob-push-core: core pipeline library for blob-push."]

//! This crate contains the provider-independent logic of blob-push:
//! enumerating a directory tree, uploading every file through a bounded worker pool,
//! and listing the destination container once the batch has drained.
//! Cloud SDK integrations live in the `blob-push` CLI crate.
//!
//! # Usage
//! Implement [`contract::BlobStore`] for a destination (or use [`fs_store::FsStore`]),
//! then call [`pipeline::run_pipeline`].

pub mod contract;
pub mod coordinator;
pub mod enumerate;
pub mod error;
pub mod fs_store;
pub mod listing;
pub mod metrics;
pub mod pipeline;
pub mod upload;
