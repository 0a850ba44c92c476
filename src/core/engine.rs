//! PK-009: Template engine — load, discover, and export a whole template.
//!
//! One engine owns one parsed template. Exporting walks `Resources` in
//! document order, hands each registered resource to the single-resource
//! exporter, and returns the rewritten tree. YAML sources additionally get
//! their short-form intrinsic tags rewritten to canonical keys.
//!
//! Nested templates spawn a fresh engine; the chain of template paths being
//! packaged is carried along to reject cycles and runaway depth.

use super::error::ExportError;
use super::exporter::{self, ExportContext, ResourceOutcome};
use super::intrinsics;
use super::parser;
use super::registry;
use super::types::{is_remote_reference, Artifact, TemplateFormat, TemplateTree, RESOURCES_KEY};
use crate::storage::ObjectStore;
use indexmap::IndexMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Default limit on nested template depth below the root template.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 8;

/// Boxed export future, used to recurse through nested templates.
pub(crate) type BoxedExport<'a> =
    Pin<Box<dyn Future<Output = Result<TemplateTree, ExportError>> + Send + 'a>>;

/// Remote locations written during one export, by logical id.
pub type ExportReport = IndexMap<String, String>;

/// A loaded template ready for discovery or export.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    tree: TemplateTree,
    format: TemplateFormat,
    template_path: PathBuf,
    ancestry: Vec<PathBuf>,
    max_depth: usize,
}

impl TemplateEngine {
    /// Read and parse a template file.
    pub fn from_file(path: &Path) -> Result<Self, ExportError> {
        let (tree, format) = parser::parse_template_file(path)?;
        Ok(Self::build(path, tree, format, Vec::new(), DEFAULT_MAX_NESTING_DEPTH))
    }

    /// Parse template text; `path` locates the template for relative paths.
    pub fn from_source(path: &Path, text: &str) -> Result<Self, ExportError> {
        let (tree, format) = parser::parse_template(path, text)?;
        Ok(Self::build(path, tree, format, Vec::new(), DEFAULT_MAX_NESTING_DEPTH))
    }

    /// Load a nested template below `parents`, rejecting cycles and depth overruns.
    pub(crate) fn nested(
        path: &Path,
        parents: &[PathBuf],
        max_depth: usize,
    ) -> Result<Self, ExportError> {
        let canonical = canonical_path(path);
        if parents.contains(&canonical) {
            return Err(ExportError::NestedTemplateCycle { path: canonical });
        }
        if parents.len() > max_depth {
            return Err(ExportError::NestingTooDeep {
                path: canonical,
                max: max_depth,
            });
        }
        let (tree, format) = parser::parse_template_file(path)?;
        Ok(Self::build(path, tree, format, parents.to_vec(), max_depth))
    }

    fn build(
        path: &Path,
        tree: TemplateTree,
        format: TemplateFormat,
        mut ancestry: Vec<PathBuf>,
        max_depth: usize,
    ) -> Self {
        let template_path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        ancestry.push(canonical_path(&template_path));
        Self {
            tree,
            format,
            template_path,
            ancestry,
            max_depth,
        }
    }

    /// Override the nested template depth limit.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn format(&self) -> TemplateFormat {
        self.format
    }

    pub fn tree(&self) -> &TemplateTree {
        &self.tree
    }

    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Directory that relative artifact paths resolve against.
    pub fn template_dir(&self) -> PathBuf {
        template_dir_of(&self.template_path)
    }

    /// List every local artifact reference, in document order.
    ///
    /// Only plain, non-remote path strings on registered resource types are
    /// reported. Nothing is read from disk.
    pub fn discover_artifacts(&self) -> Vec<Artifact> {
        let Some(resources) = self.tree.get(RESOURCES_KEY).and_then(|r| r.as_mapping()) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for (id, resource) in resources {
            let Some(descriptor) = resource
                .get("Type")
                .and_then(|t| t.as_str())
                .and_then(registry::lookup)
            else {
                continue;
            };
            let Some(properties) = resource.get("Properties").and_then(|p| p.as_mapping()) else {
                continue;
            };
            if let Some(TemplateTree::String(path)) =
                exporter::get_property(properties, descriptor.property_path)
            {
                if !is_remote_reference(path) {
                    found.push(Artifact {
                        resource_type: descriptor.resource_type.to_string(),
                        file_path: path.clone(),
                        logical_id: logical_id(id),
                        property_path: descriptor.property_path.to_string(),
                    });
                }
            }
        }
        found
    }

    /// Package every registered resource and return the rewritten tree.
    pub async fn export(
        self,
        store: &dyn ObjectStore,
        bucket: &str,
        key_prefix: &str,
    ) -> Result<TemplateTree, ExportError> {
        self.export_with_report(store, bucket, key_prefix)
            .await
            .map(|(tree, _)| tree)
    }

    /// Like [`export`](Self::export), also returning where each artifact went.
    pub async fn export_with_report(
        self,
        store: &dyn ObjectStore,
        bucket: &str,
        key_prefix: &str,
    ) -> Result<(TemplateTree, ExportReport), ExportError> {
        let Self {
            mut tree,
            format,
            template_path,
            ancestry,
            max_depth,
        } = self;
        let template_dir = template_dir_of(&template_path);
        let ctx = ExportContext {
            store,
            bucket,
            prefix: key_prefix,
            template_dir: &template_dir,
            ancestry: &ancestry,
            max_depth,
        };
        tracing::debug!(template = %template_path.display(), %format, "exporting template");

        let mut report = ExportReport::new();
        if let Some(resources) = tree.get_mut(RESOURCES_KEY).and_then(|r| r.as_mapping_mut()) {
            for (id, resource) in resources.iter_mut() {
                let Some(descriptor) = resource
                    .get("Type")
                    .and_then(|t| t.as_str())
                    .and_then(registry::lookup)
                else {
                    continue;
                };
                let id = logical_id(id);
                let properties = resource.get_mut("Properties").and_then(|p| p.as_mapping_mut());
                match exporter::export_resource(&id, descriptor, properties, ctx).await? {
                    ResourceOutcome::Uploaded(uploaded) => {
                        report.insert(id, uploaded.s3_url());
                    }
                    ResourceOutcome::Skipped(reason) => {
                        tracing::debug!(logical_id = %id, ?reason, "resource left unchanged");
                    }
                }
            }
        }

        if format == TemplateFormat::Yaml {
            intrinsics::restore_intrinsic_keys(&mut tree);
        }
        Ok((tree, report))
    }

    /// Boxed [`export`](Self::export) for recursion from the exporter.
    pub(crate) fn export_boxed<'a>(
        self,
        store: &'a dyn ObjectStore,
        bucket: &'a str,
        key_prefix: &'a str,
    ) -> BoxedExport<'a> {
        Box::pin(self.export(store, bucket, key_prefix))
    }
}

fn template_dir_of(template_path: &Path) -> PathBuf {
    match template_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Canonical form for cycle detection; falls back to the path as given.
fn canonical_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn logical_id(key: &TemplateTree) -> String {
    match key {
        TemplateTree::String(s) => s.clone(),
        other => serde_yaml_ng::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}
