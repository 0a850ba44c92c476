//! PK-003: Template parsing, format detection, and serialization.
//!
//! JSON and YAML documents both land in the same order-preserving
//! [`TemplateTree`]. JSON is decoded with `serde_json` straight into the YAML
//! value type so key order survives either way.

use super::error::ExportError;
use super::types::{TemplateFormat, TemplateTree};
use std::path::Path;

/// Detect whether a template is JSON or YAML.
///
/// A `.json` extension wins; otherwise a document whose first non-blank
/// character opens a JSON object and that parses as JSON is treated as JSON.
pub fn detect_format(path: &Path, text: &str) -> TemplateFormat {
    let by_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if by_ext {
        return TemplateFormat::Json;
    }
    if text.trim_start().starts_with('{')
        && serde_json::from_str::<serde_json::Value>(text).is_ok()
    {
        return TemplateFormat::Json;
    }
    TemplateFormat::Yaml
}

/// Parse a template from text, returning the tree and its detected format.
pub fn parse_template(path: &Path, text: &str) -> Result<(TemplateTree, TemplateFormat), ExportError> {
    let format = detect_format(path, text);
    let tree = match format {
        TemplateFormat::Json => serde_json::from_str::<TemplateTree>(text).map_err(|e| {
            ExportError::TemplateParse {
                path: path.to_path_buf(),
                message: format!("JSON parse error: {}", e),
            }
        })?,
        TemplateFormat::Yaml => {
            if text.trim().is_empty() {
                TemplateTree::Null
            } else {
                serde_yaml_ng::from_str::<TemplateTree>(text).map_err(|e| {
                    ExportError::TemplateParse {
                        path: path.to_path_buf(),
                        message: format!("YAML parse error: {}", e),
                    }
                })?
            }
        }
    };
    Ok((tree, format))
}

/// Read and parse a template file from disk.
pub fn parse_template_file(path: &Path) -> Result<(TemplateTree, TemplateFormat), ExportError> {
    let text = std::fs::read_to_string(path).map_err(|e| ExportError::TemplateRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_template(path, &text)
}

/// Serialize a tree as YAML text.
pub fn serialize_yaml(tree: &TemplateTree) -> Result<String, ExportError> {
    serde_yaml_ng::to_string(tree).map_err(|e| ExportError::Serialize(format!("YAML: {}", e)))
}

/// Serialize a tree in the requested format (JSON is pretty-printed).
pub fn serialize(tree: &TemplateTree, format: TemplateFormat) -> Result<String, ExportError> {
    match format {
        TemplateFormat::Yaml => serialize_yaml(tree),
        TemplateFormat::Json => serde_json::to_string_pretty(tree)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| ExportError::Serialize(format!("JSON: {}", e))),
    }
}
