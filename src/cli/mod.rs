//! PK-013: CLI subcommands — package, artifacts, resource-types.

use crate::core::config::{self, ConfigFile, OutputFormat};
use crate::core::engine::TemplateEngine;
use crate::core::{parser, registry, types};
use crate::storage::local::LocalObjectStore;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "stackpack.yaml";

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload local artifacts and write a template that references them remotely
    Package(PackageArgs),

    /// List local artifact references without uploading anything
    Artifacts {
        /// Path to the template
        #[arg(short = 't', long)]
        template_file: PathBuf,

        /// Emit a JSON array instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the resource types and properties that get packaged
    ResourceTypes,
}

#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    /// Path to the template
    #[arg(short = 't', long)]
    pub template_file: PathBuf,

    /// Destination bucket
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Key prefix for uploaded objects
    #[arg(long)]
    pub s3_prefix: Option<String>,

    /// Write the packaged template here (default: stdout)
    #[arg(short, long)]
    pub output_template_file: Option<PathBuf>,

    /// Root directory of the local object store
    #[arg(long)]
    pub store_root: Option<PathBuf>,

    /// Config file (default: ./stackpack.yaml if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format of the packaged template
    #[arg(long, value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Maximum nested template depth
    #[arg(long)]
    pub max_nesting_depth: Option<usize>,
}

/// Dispatch a CLI command.
pub async fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Package(args) => cmd_package(&args).await,
        Commands::Artifacts {
            template_file,
            json,
        } => cmd_artifacts(&template_file, json),
        Commands::ResourceTypes => cmd_resource_types(),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<ConfigFile, String> {
    match explicit {
        Some(path) => config::parse_config_file(path),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                config::parse_config_file(default)
            } else {
                Ok(ConfigFile::default())
            }
        }
    }
}

async fn cmd_package(args: &PackageArgs) -> Result<(), String> {
    let file = load_config(args.config.as_deref())?;
    let flags = ConfigFile {
        bucket: args.s3_bucket.clone(),
        prefix: args.s3_prefix.clone(),
        store_root: args.store_root.clone(),
        max_nesting_depth: args.max_nesting_depth,
        output_format: args.output_format,
    };
    let cfg = config::resolve(config::merge(file, flags)).map_err(|errors| {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        format!("{} configuration error(s)", errors.len())
    })?;

    let engine = TemplateEngine::from_file(&args.template_file)
        .map_err(|e| e.to_string())?
        .with_max_depth(cfg.max_nesting_depth);
    let format = cfg.output_format.resolve(engine.format());
    let store = LocalObjectStore::new(&cfg.store_root);

    let (tree, report) = engine
        .export_with_report(&store, &cfg.bucket, &cfg.prefix)
        .await
        .map_err(|e| e.to_string())?;
    let text = parser::serialize(&tree, format).map_err(|e| e.to_string())?;

    match &args.output_template_file {
        Some(out) => {
            std::fs::write(out, &text)
                .map_err(|e| format!("cannot write {}: {}", out.display(), e))?;
            eprintln!(
                "Packaged {} artifact(s) into {} ({})",
                report.len(),
                out.display(),
                format
            );
            for (id, location) in &report {
                eprintln!("  {}: {}", id, location);
            }
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn cmd_artifacts(template_file: &Path, json: bool) -> Result<(), String> {
    println!("{}", render_artifacts(template_file, json)?);
    Ok(())
}

/// Artifact listing for a template, as a table or a JSON array.
fn render_artifacts(template_file: &Path, json: bool) -> Result<String, String> {
    let engine = TemplateEngine::from_file(template_file).map_err(|e| e.to_string())?;
    let artifacts = engine.discover_artifacts();

    if json {
        return serde_json::to_string_pretty(&artifacts)
            .map_err(|e| format!("JSON serialization error: {}", e));
    }
    if artifacts.is_empty() {
        return Ok(format!("No local artifacts in {}", template_file.display()));
    }
    let lines: Vec<String> = artifacts.iter().map(format_artifact).collect();
    Ok(lines.join("\n"))
}

fn format_artifact(a: &types::Artifact) -> String {
    format!(
        "{}  {}  {}  {}",
        a.logical_id, a.resource_type, a.property_path, a.file_path
    )
}

fn cmd_resource_types() -> Result<(), String> {
    for d in registry::descriptors() {
        let mut flags = Vec::new();
        if d.kind == types::ExportKind::NestedTemplate {
            flags.push("nested");
        }
        if d.force_zip {
            flags.push("zip");
        }
        if d.package_null_property {
            flags.push("default-dir");
        }
        println!(
            "{:<44} {:<24} {}",
            d.resource_type,
            d.property_path,
            flags.join(",")
        );
    }
    Ok(())
}
