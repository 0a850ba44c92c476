//! PK-012: Packaging configuration — `stackpack.yaml` plus command-line overrides.
//!
//! Resolution order is flag, then file, then default.

use super::engine::DEFAULT_MAX_NESTING_DEPTH;
use super::types::TemplateFormat;
use crate::storage::local::is_valid_bucket;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default location of the filesystem object store.
pub const DEFAULT_STORE_ROOT: &str = ".stackpack/objects";

/// Format of the packaged template written by `package`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Same format as the input template.
    #[default]
    Auto,
    Yaml,
    Json,
}

impl OutputFormat {
    /// Concrete format given the input template's format.
    pub fn resolve(self, input: TemplateFormat) -> TemplateFormat {
        match self {
            Self::Auto => input,
            Self::Yaml => TemplateFormat::Yaml,
            Self::Json => TemplateFormat::Json,
        }
    }
}

/// Settings as written in `stackpack.yaml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub store_root: Option<PathBuf>,
    #[serde(default)]
    pub max_nesting_depth: Option<usize>,
    #[serde(default)]
    pub output_format: Option<OutputFormat>,
}

/// Fully resolved packaging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConfig {
    pub bucket: String,
    pub prefix: String,
    pub store_root: PathBuf,
    pub max_nesting_depth: usize,
    pub output_format: OutputFormat,
}

/// A configuration problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a config file from a YAML string.
pub fn parse_config(yaml: &str) -> Result<ConfigFile, String> {
    if yaml.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("config parse error: {}", e))
}

/// Read and parse a config file from disk.
pub fn parse_config_file(path: &Path) -> Result<ConfigFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Layer command-line overrides over a config file and fill defaults.
pub fn merge(file: ConfigFile, overrides: ConfigFile) -> ConfigFile {
    ConfigFile {
        bucket: overrides.bucket.or(file.bucket),
        prefix: overrides.prefix.or(file.prefix),
        store_root: overrides.store_root.or(file.store_root),
        max_nesting_depth: overrides.max_nesting_depth.or(file.max_nesting_depth),
        output_format: overrides.output_format.or(file.output_format),
    }
}

/// Check merged settings; returns every problem found.
pub fn validate_config(config: &ConfigFile) -> Vec<ConfigError> {
    let mut errors = Vec::new();

    match config.bucket.as_deref() {
        None => errors.push(ConfigError {
            message: "bucket is required (--s3-bucket or 'bucket' in config)".to_string(),
        }),
        Some(b) if !is_valid_bucket(b) => errors.push(ConfigError {
            message: format!(
                "bucket '{}' must be non-empty, not '.' or '..', and contain no path separators",
                b
            ),
        }),
        Some(_) => {}
    }

    if let Some(prefix) = &config.prefix {
        if prefix.split('/').any(|s| s == "..") {
            errors.push(ConfigError {
                message: format!("prefix '{}' must not contain '..' segments", prefix),
            });
        }
    }

    if config.max_nesting_depth == Some(0) {
        errors.push(ConfigError {
            message: "max_nesting_depth must be at least 1".to_string(),
        });
    }

    errors
}

/// Validate and fill defaults.
pub fn resolve(config: ConfigFile) -> Result<PackageConfig, Vec<ConfigError>> {
    let errors = validate_config(&config);
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(PackageConfig {
        bucket: config.bucket.unwrap_or_default(),
        prefix: config.prefix.unwrap_or_default(),
        store_root: config
            .store_root
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_ROOT)),
        max_nesting_depth: config.max_nesting_depth.unwrap_or(DEFAULT_MAX_NESTING_DEPTH),
        output_format: config.output_format.unwrap_or_default(),
    })
}
