//! PK-002: Export error taxonomy.
//!
//! Not-applicable resources (unknown type, absent optional property, already
//! remote) are never errors; everything here aborts the whole export.

use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while packaging a template.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot read template {}: {source}", path.display())]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template parse error in {}: {message}", path.display())]
    TemplateParse { path: PathBuf, message: String },

    #[error("cannot serialize template: {0}")]
    Serialize(String),

    #[error("resource '{logical_id}' references nested template '{}' which is not a local file", path.display())]
    InvalidNestedReference { logical_id: String, path: PathBuf },

    #[error("nested template cycle: {} is already being packaged", path.display())]
    NestedTemplateCycle { path: PathBuf },

    #[error("nested template {} exceeds maximum nesting depth {max}", path.display())]
    NestingTooDeep { path: PathBuf, max: usize },

    #[error("invalid file URI '{uri}'")]
    InvalidFileUri { uri: String },

    #[error("upload to {destination} failed: {source}")]
    Storage {
        destination: String,
        #[source]
        source: StorageError,
    },

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ExportError {
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }
}
