//! # S3-compatible object store
//!
//! Bridges the core [`BlobStore`] capability to any S3-compatible service through
//! `aws-sdk-s3`. A store is bound to one bucket.
//!
//! ## Credentials
//!
//! [`S3Credentials::from_env`] reads two opaque secrets, `BLOB_PUSH_ACCESS_KEY` and
//! `BLOB_PUSH_SECRET_KEY`, plus the optional `BLOB_PUSH_ENDPOINT` (for MinIO and other
//! self-hosted services) and `BLOB_PUSH_REGION` (default `us-east-1`).
//!
//! ## Transfers
//!
//! Objects smaller than one part are sent with a single `PutObject`. Larger objects use a
//! multipart upload with up to `stream_parallelism` parts in flight; a failed multipart
//! upload is aborted so no orphaned parts are left behind.

use std::env;
use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::Client;
use blob_push_core::contract::{BlobStore, ListPage, ObjectBody, RemoteObject, TransferOptions};
use blob_push_core::error::{SetupError, StoreError};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

pub const ACCESS_KEY_ENV: &str = "BLOB_PUSH_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "BLOB_PUSH_SECRET_KEY";
pub const ENDPOINT_ENV: &str = "BLOB_PUSH_ENDPOINT";
pub const REGION_ENV: &str = "BLOB_PUSH_REGION";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Smallest part size S3 accepts for every part but the last.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Clone)]
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: Option<String>,
    pub region: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .finish()
    }
}

impl S3Credentials {
    pub fn from_env() -> Result<Self, SetupError> {
        let access_key = required_var(ACCESS_KEY_ENV)?;
        let secret_key = required_var(SECRET_KEY_ENV)?;
        let endpoint = optional_var(ENDPOINT_ENV);
        let region = optional_var(REGION_ENV).unwrap_or_else(|| DEFAULT_REGION.to_string());
        info!(
            endpoint = endpoint.as_deref().unwrap_or("<aws>"),
            region = %region,
            "Loaded S3 credentials from environment"
        );
        Ok(Self {
            access_key,
            secret_key,
            endpoint,
            region,
        })
    }
}

fn required_var(name: &str) -> Result<String, SetupError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => {
            error!(variable = name, "Environment variable is empty");
            Err(SetupError::Credentials(format!("{name} is empty")))
        }
        Err(e) => {
            error!(variable = name, error = ?e, "Environment variable missing");
            Err(SetupError::Credentials(format!("{name} is not set")))
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Store {
    /// Wrap an already configured client. The region used for bucket creation is taken
    /// from the client configuration.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        let region = client
            .config()
            .region()
            .map(|r| r.as_ref().to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        Self {
            client,
            bucket: bucket.into(),
            region,
        }
    }

    pub async fn connect(credentials: S3Credentials, bucket: impl Into<String>) -> Self {
        let mut loader = aws_config::from_env()
            .region(Region::new(credentials.region.clone()))
            .credentials_provider(Credentials::new(
                credentials.access_key,
                credentials.secret_key,
                None,
                None,
                "static",
            ));
        if let Some(endpoint) = &credentials.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(credentials.endpoint.is_some())
            .build();
        Self::new(Client::from_conf(s3_config), bucket)
    }

    async fn put_single(&self, key: &str, data: Vec<u8>) -> Result<u64, StoreError> {
        let len = data.len() as u64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(transport)?;
        Ok(len)
    }

    async fn put_multipart(
        &self,
        key: &str,
        first: Vec<u8>,
        body: &mut ObjectBody,
        part_size: usize,
        parallelism: usize,
    ) -> Result<u64, StoreError> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(transport)?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| StoreError::Transport(format!("no upload id returned for {key}")))?
            .to_string();

        let uploaded = self
            .upload_parts(key, &upload_id, first, body, part_size, parallelism)
            .await;
        let (parts, bytes) = match uploaded {
            Ok(done) => done,
            Err(e) => {
                self.abort_multipart(key, &upload_id).await;
                return Err(e);
            }
        };

        let part_count = parts.len();
        let completed = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await;
        if let Err(e) = completed {
            self.abort_multipart(key, &upload_id).await;
            return Err(transport(e));
        }
        debug!(key, parts = part_count, bytes, "Multipart upload completed");
        Ok(bytes)
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Vec<u8>,
        body: &mut ObjectBody,
        part_size: usize,
        parallelism: usize,
    ) -> Result<(Vec<CompletedPart>, u64), StoreError> {
        let mut in_flight = FuturesUnordered::new();
        let mut parts = Vec::new();
        let mut bytes = 0u64;
        let mut part_number = 1;
        let mut next = Some(first);
        let mut exhausted = false;

        loop {
            while !exhausted && in_flight.len() < parallelism {
                let chunk = match next.take() {
                    Some(chunk) => chunk,
                    None => read_chunk(body, part_size).await?,
                };
                if chunk.is_empty() {
                    exhausted = true;
                    break;
                }
                bytes += chunk.len() as u64;
                in_flight.push(self.upload_part(key, upload_id, part_number, chunk));
                part_number += 1;
            }
            match in_flight.next().await {
                Some(part) => parts.push(part?),
                None => break,
            }
        }

        parts.sort_by_key(|p| p.part_number());
        Ok((parts, bytes))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        chunk: Vec<u8>,
    ) -> Result<CompletedPart, StoreError> {
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(chunk))
            .send()
            .await
            .map_err(transport)?;
        Ok(CompletedPart::builder()
            .set_e_tag(output.e_tag().map(str::to_string))
            .part_number(part_number)
            .build())
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(e) = aborted {
            warn!(key, upload_id, error = %DisplayErrorContext(&e), "Failed to abort multipart upload");
        }
    }
}

#[async_trait]
impl BlobStore for S3Store {
    async fn create_container(&self, name: &str) -> Result<(), StoreError> {
        let mut request = self.client.create_bucket().bucket(name);
        // us-east-1 rejects an explicit location constraint.
        if self.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) => match e.as_service_error() {
                Some(service)
                    if service.is_bucket_already_owned_by_you()
                        || service.is_bucket_already_exists() =>
                {
                    Err(StoreError::AlreadyExists(name.to_string()))
                }
                _ => Err(transport(e)),
            },
        }
    }

    async fn put_object(
        &self,
        key: &str,
        mut body: ObjectBody,
        options: &TransferOptions,
    ) -> Result<u64, StoreError> {
        let part_size = options.chunk_size.max(MIN_PART_SIZE);
        let first = read_chunk(&mut body, part_size).await?;
        if first.len() < part_size {
            return self.put_single(key, first).await;
        }
        self.put_multipart(
            key,
            first,
            &mut body,
            part_size,
            options.stream_parallelism.max(1),
        )
        .await
    }

    async fn list_objects(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(i32::try_from(page_size).unwrap_or(i32::MAX))
            .set_continuation_token(marker)
            .send()
            .await
            .map_err(transport)?;

        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(RemoteObject {
                    key: key.to_string(),
                    size: object.size().and_then(|s| u64::try_from(s).ok()),
                    last_modified: object
                        .last_modified()
                        .and_then(|t| SystemTime::try_from(*t).ok()),
                })
            })
            .collect();
        let next_marker = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_marker,
        })
    }
}

/// Read up to `size` bytes. A short chunk means the body is exhausted.
async fn read_chunk(body: &mut ObjectBody, size: usize) -> Result<Vec<u8>, StoreError> {
    let mut chunk = Vec::with_capacity(size);
    (&mut *body).take(size as u64).read_to_end(&mut chunk).await?;
    Ok(chunk)
}

fn transport<E: std::error::Error>(err: E) -> StoreError {
    StoreError::Transport(DisplayErrorContext(err).to_string())
}
