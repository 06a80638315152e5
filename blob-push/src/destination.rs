//! Destination identifiers accepted on the command line.
//!
//! - `s3://<bucket>`: an S3-compatible bucket, credentials from the environment;
//! - `file://<dir>/<container>` or a bare path: a container directory on local disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    S3 { bucket: String },
    Fs { base: PathBuf, container: String },
}

impl Destination {
    pub fn container(&self) -> &str {
        match self {
            Destination::S3 { bucket } => bucket,
            Destination::Fs { container, .. } => container,
        }
    }

    /// The container directory on local disk, if this is a filesystem destination.
    pub fn local_dir(&self) -> Option<PathBuf> {
        match self {
            Destination::S3 { .. } => None,
            Destination::Fs { base, container } => Some(base.join(container)),
        }
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(bucket) = s.strip_prefix("s3://") {
            let bucket = bucket.trim_end_matches('/');
            if bucket.is_empty() || bucket.contains('/') {
                return Err(format!("invalid S3 destination {s:?}: expected s3://<bucket>"));
            }
            return Ok(Destination::S3 {
                bucket: bucket.to_string(),
            });
        }

        let raw = s.strip_prefix("file://").unwrap_or(s);
        let path = Path::new(raw.trim_end_matches('/'));
        let container = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| format!("invalid destination {s:?}: expected <dir>/<container>"))?;
        let base = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Destination::Fs { base, container })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::S3 { bucket } => write!(f, "s3://{bucket}"),
            Destination::Fs { base, container } => {
                write!(f, "file://{}", base.join(container).display())
            }
        }
    }
}
