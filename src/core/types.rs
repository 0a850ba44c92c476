//! PK-001: Core types — template tree, exporter descriptors, artifacts, upload results.
//!
//! The template itself is kept as an untyped, order-preserving YAML value so
//! that every key the packager does not understand round-trips untouched.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Template tree
// ============================================================================

/// A parsed CloudFormation/SAM document (map / sequence / scalar).
///
/// `serde_yaml_ng::Mapping` preserves insertion order, so rewriting a property
/// in place keeps the document's key layout stable.
pub type TemplateTree = serde_yaml_ng::Value;

/// Top-level key holding the resource collection.
pub const RESOURCES_KEY: &str = "Resources";

/// Source format of a template document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateFormat {
    Json,
    Yaml,
}

impl fmt::Display for TemplateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
        }
    }
}

// ============================================================================
// Exporter descriptors
// ============================================================================

/// How the remote location is written back into the resource property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    /// Property becomes a single `s3://bucket/key` string.
    Url,
    /// Property becomes a map of bucket / key / optional version entries.
    Record {
        bucket_key: &'static str,
        object_key: &'static str,
        version_key: Option<&'static str>,
    },
}

/// What the referenced local path holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A code bundle or definition file, uploaded as-is or archived.
    Artifact,
    /// A nested template, packaged recursively and uploaded as YAML text.
    NestedTemplate,
}

/// Static per-resource-type packaging rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExporterDescriptor {
    /// Exact CloudFormation type string (e.g. `AWS::Lambda::Function`).
    pub resource_type: &'static str,
    /// Property name or dotted path within `Properties`.
    pub property_path: &'static str,
    /// Whether an absent property still gets packaged (from the template directory).
    pub package_null_property: bool,
    /// Whether a single non-archive file must be zipped before upload.
    pub force_zip: bool,
    pub write_back: WriteBack,
    pub kind: ExportKind,
}

// ============================================================================
// Discovery and upload results
// ============================================================================

/// A local artifact reference found in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub resource_type: String,
    pub file_path: String,
    pub logical_id: String,
    pub property_path: String,
}

/// Response from the object store for a single put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutResult {
    pub version_id: Option<String>,
}

/// Where an artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
}

impl UploadResult {
    /// `s3://bucket/key` form of the upload location.
    pub fn s3_url(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Returns true if a property value already points at a remote location.
pub fn is_remote_reference(value: &str) -> bool {
    value.starts_with("s3://") || value.starts_with("http://") || value.starts_with("https://")
}
