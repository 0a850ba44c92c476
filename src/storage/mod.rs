//! PK-010/011: Object storage abstraction — `s3://` addressing and uploads.
//!
//! The packager only needs two operations from a store: put a local file at a
//! destination URL, and put an in-memory document under a bucket/key. The
//! trait is async so network-backed stores can be dropped in; the
//! filesystem-backed [`local::LocalObjectStore`] is what the CLI drives.

pub mod local;

use crate::core::types::PutResult;
use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

#[cfg(test)]
use mockall::automock;

/// Error type for store implementations (boxed, forwarded as-is).
pub type StorageError = Box<dyn std::error::Error + Send + Sync>;

/// Put operations the packager needs from an object store.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file to `destination` (always `s3://bucket/key`).
    async fn put_object(
        &self,
        local_path: &Path,
        destination: &str,
    ) -> Result<PutResult, StorageError>;

    /// Upload text content directly under `bucket`/`key`.
    async fn put_object_content(
        &self,
        body: &str,
        bucket: &str,
        key: &str,
    ) -> Result<PutResult, StorageError>;
}

static S3_URL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^s3://([^/]+)/(.+)$").ok());

/// A parsed `s3://bucket/key` location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Url {
    pub bucket: String,
    pub key: String,
}

impl S3Url {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse `s3://bucket/key`. Both parts must be non-empty.
    pub fn parse(url: &str) -> Result<Self, String> {
        let caps = S3_URL
            .as_ref()
            .and_then(|re| re.captures(url))
            .ok_or_else(|| format!("not an s3://bucket/key URL: {}", url))?;
        Ok(Self::new(&caps[1], &caps[2]))
    }
}

impl fmt::Display for S3Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
