//! PK-011: Filesystem-backed object store.
//!
//! Objects live at `<root>/<bucket>/<key>`. Every put reports a version id
//! derived from the BLAKE3 hash of the stored bytes.

use super::{ObjectStore, S3Url, StorageError};
use crate::core::types::PutResult;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Store that mirrors buckets as directories under a root.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of an object.
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    /// Write bytes atomically (temp file in the target dir, then persist).
    fn write_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<PutResult, StorageError> {
        if !is_valid_bucket(bucket) || key.is_empty() || key.split('/').any(|s| s == "..") {
            return Err(format!("invalid object location {}/{}", bucket, key).into());
        }
        let path = self.object_path(bucket, key);
        let parent = path
            .parent()
            .ok_or_else(|| format!("no parent directory for {}", path.display()))?;
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| format!("cannot create temp object in {}: {}", parent.display(), e))?;
        std::io::Write::write_all(&mut tmp, bytes)
            .map_err(|e| format!("write error {}: {}", path.display(), e))?;
        tmp.persist(&path)
            .map_err(|e| format!("cannot persist {}: {}", path.display(), e.error))?;

        tracing::debug!(bucket, key, bytes = bytes.len(), "stored object");
        Ok(PutResult {
            version_id: Some(version_id(bytes)),
        })
    }
}

/// A bucket must map to exactly one directory directly under the root.
pub fn is_valid_bucket(bucket: &str) -> bool {
    !bucket.is_empty() && bucket != "." && bucket != ".." && !bucket.contains(['/', '\\'])
}

/// Content-derived version id (first 32 hex chars of BLAKE3).
fn version_id(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex.as_str()[..32].to_string()
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object(
        &self,
        local_path: &Path,
        destination: &str,
    ) -> Result<PutResult, StorageError> {
        let url = S3Url::parse(destination)?;
        let bytes = std::fs::read(local_path)
            .map_err(|e| format!("cannot read {}: {}", local_path.display(), e))?;
        self.write_object(&url.bucket, &url.key, &bytes)
    }

    async fn put_object_content(
        &self,
        body: &str,
        bucket: &str,
        key: &str,
    ) -> Result<PutResult, StorageError> {
        self.write_object(bucket, key, body.as_bytes())
    }
}
