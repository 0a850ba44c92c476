//! PK-008: Single-resource exporter — upload one artifact and rewrite its property.
//!
//! Per resource: read the property → (optionally) normalize a lone file into
//! a directory → zip directories → upload → write the remote location back.
//! Scratch directories and archives are released on every exit path.
//! Nested templates are packaged recursively by a fresh engine and uploaded
//! as YAML text.

use super::engine::TemplateEngine;
use super::error::ExportError;
use super::parser;
use super::types::{
    is_remote_reference, ExportKind, ExporterDescriptor, TemplateTree, UploadResult, WriteBack,
};
use crate::archive::{probe, scratch};
use crate::storage::ObjectStore;
use serde_yaml_ng::Mapping;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Key segment under the prefix where all artifacts land.
pub const ARTIFACT_DIR: &str = "artifact";

/// Shared, read-only inputs for exporting the resources of one template.
#[derive(Clone, Copy)]
pub struct ExportContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub bucket: &'a str,
    pub prefix: &'a str,
    /// Directory containing the template being exported.
    pub template_dir: &'a Path,
    /// Canonical paths of this template and every template above it.
    pub ancestry: &'a [PathBuf],
    pub max_depth: usize,
}

/// Why a resource was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoProperties,
    PropertyAbsent,
    AlreadyMaterialized,
    AlreadyRemote,
    /// The resource carries its code inline or as a container image.
    NotPackageable,
}

/// Result of exporting one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    Skipped(SkipReason),
    Uploaded(UploadResult),
}

// ============================================================================
// Property access
// ============================================================================

/// Read a (possibly dotted) property from a `Properties` map.
pub fn get_property<'t>(properties: &'t Mapping, path: &str) -> Option<&'t TemplateTree> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = properties.get(first)?;
    for segment in segments {
        current = current.as_mapping()?.get(segment)?;
    }
    Some(current)
}

/// Write a (possibly dotted) property, creating intermediate maps as needed.
pub fn set_property(properties: &mut Mapping, path: &str, value: TemplateTree) {
    match path.split_once('.') {
        None => {
            properties.insert(TemplateTree::String(path.to_string()), value);
        }
        Some((head, rest)) => {
            let key = TemplateTree::String(head.to_string());
            let needs_map = !matches!(properties.get(head), Some(TemplateTree::Mapping(_)));
            if needs_map {
                properties.insert(key.clone(), TemplateTree::Mapping(Mapping::new()));
            }
            if let Some(TemplateTree::Mapping(child)) = properties.get_mut(key) {
                set_property(child, rest, value);
            }
        }
    }
}

/// `InlineCode` or `PackageType: Image` means there is no local bundle to
/// default to.
fn has_non_local_code(properties: &Mapping) -> bool {
    properties.contains_key("InlineCode")
        || properties.get("PackageType").and_then(|v| v.as_str()) == Some("Image")
}

// ============================================================================
// Path resolution and key naming
// ============================================================================

/// Resolve a property value to a local path.
///
/// `file://` URIs are decoded; absolute paths are kept; anything else is
/// joined onto the template directory.
pub fn resolve_local_path(value: &str, template_dir: &Path) -> Result<PathBuf, ExportError> {
    if value.starts_with("file://") {
        return url::Url::parse(value)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| ExportError::InvalidFileUri {
                uri: value.to_string(),
            });
    }
    let path = Path::new(value);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(template_dir.join(path))
    }
}

static LAST_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Strictly increasing epoch-millisecond clock (per process).
pub fn next_timestamp_millis() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default();
    let mut prev = LAST_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev.saturating_add(1));
        match LAST_MILLIS.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

/// Extension policy for an object key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExtension {
    /// Use the artifact's own extension, if it has one.
    Original,
    /// No extension segment (directories).
    None,
    /// Force a specific extension.
    Force(&'static str),
}

/// Build `<prefix/>artifact/<name>-<millis>[.<ext>]` for an artifact path.
pub fn artifact_key(prefix: &str, artifact: &Path, ext: KeyExtension, millis: u64) -> String {
    let file_name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let (stem, own_ext) = match file_name.rsplit_once('.') {
        Some((stem, e)) if !stem.is_empty() && !e.is_empty() => (stem.to_string(), Some(e.to_string())),
        _ => (file_name.clone(), None),
    };
    let (stem, ext) = match ext {
        KeyExtension::Original => (stem, own_ext),
        KeyExtension::None => (file_name, None),
        KeyExtension::Force(e) => (stem, Some(e.to_string())),
    };
    let name = match ext {
        Some(e) => format!("{}-{}.{}", stem, millis, e),
        None => format!("{}-{}", stem, millis),
    };
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{}/{}", ARTIFACT_DIR, name)
    } else {
        format!("{}/{}/{}", prefix, ARTIFACT_DIR, name)
    }
}

// ============================================================================
// Export
// ============================================================================

/// Export one resource's artifact according to its descriptor.
///
/// `properties` is the resource's `Properties` map, if it has one.
pub async fn export_resource(
    logical_id: &str,
    descriptor: &ExporterDescriptor,
    properties: Option<&mut Mapping>,
    ctx: ExportContext<'_>,
) -> Result<ResourceOutcome, ExportError> {
    let Some(properties) = properties else {
        return Ok(ResourceOutcome::Skipped(SkipReason::NoProperties));
    };

    let local = match get_property(properties, descriptor.property_path) {
        None if !descriptor.package_null_property => {
            return Ok(ResourceOutcome::Skipped(SkipReason::PropertyAbsent));
        }
        None if has_non_local_code(properties) => {
            return Ok(ResourceOutcome::Skipped(SkipReason::NotPackageable));
        }
        None => ctx.template_dir.to_path_buf(),
        Some(TemplateTree::String(s)) if is_remote_reference(s) => {
            return Ok(ResourceOutcome::Skipped(SkipReason::AlreadyRemote));
        }
        Some(TemplateTree::String(s)) => resolve_local_path(s, ctx.template_dir)?,
        Some(_) => return Ok(ResourceOutcome::Skipped(SkipReason::AlreadyMaterialized)),
    };

    let uploaded = match descriptor.kind {
        ExportKind::NestedTemplate => export_nested(logical_id, &local, ctx).await?,
        ExportKind::Artifact => {
            let mut held = scratch::ScratchSet::new();
            let result = upload_artifact(descriptor, &local, ctx, &mut held).await;
            if let Ok(ref uploaded) = result {
                write_back(properties, descriptor, uploaded);
            }
            let released = held.release();
            let uploaded = result?;
            released?;
            uploaded
        }
    };

    if descriptor.kind == ExportKind::NestedTemplate {
        write_back(properties, descriptor, &uploaded);
    }
    tracing::info!(
        logical_id,
        resource_type = descriptor.resource_type,
        location = %uploaded.s3_url(),
        "exported artifact"
    );
    Ok(ResourceOutcome::Uploaded(uploaded))
}

/// Materialize the payload for `local` and upload it.
async fn upload_artifact(
    descriptor: &ExporterDescriptor,
    local: &Path,
    ctx: ExportContext<'_>,
    held: &mut scratch::ScratchSet,
) -> Result<UploadResult, ExportError> {
    let kind = probe::classify(local);
    if !kind.is_file && !kind.is_directory {
        return Err(ExportError::fs(
            local,
            std::io::Error::new(std::io::ErrorKind::NotFound, "artifact path does not exist"),
        ));
    }

    let mut source = local.to_path_buf();
    let mut force_zipped = false;
    if descriptor.force_zip && kind.is_file && !kind.is_archive {
        source = held.hold_dir(scratch::copy_into_own_directory(local)?);
        force_zipped = true;
    }

    let payload = if source.is_dir() {
        let dir = source.clone();
        let zipped = tokio::task::spawn_blocking(move || scratch::zip_directory(&dir))
            .await
            .map_err(|e| ExportError::fs(&source, std::io::Error::other(e)))??;
        held.hold_file(zipped)
    } else {
        source
    };

    let ext = if force_zipped {
        KeyExtension::Force("zip")
    } else if kind.is_directory {
        KeyExtension::None
    } else {
        KeyExtension::Original
    };
    let key = artifact_key(ctx.prefix, local, ext, next_timestamp_millis());
    let destination = format!("s3://{}/{}", ctx.bucket, key);

    tracing::debug!(payload = %payload.display(), %destination, "uploading artifact");
    let put = ctx
        .store
        .put_object(&payload, &destination)
        .await
        .map_err(|source| ExportError::Storage {
            destination: destination.clone(),
            source,
        })?;

    Ok(UploadResult {
        bucket: ctx.bucket.to_string(),
        key,
        version_id: put.version_id,
    })
}

/// Package a nested template recursively and upload it as YAML text.
async fn export_nested(
    logical_id: &str,
    local: &Path,
    ctx: ExportContext<'_>,
) -> Result<UploadResult, ExportError> {
    if !local.is_file() {
        return Err(ExportError::InvalidNestedReference {
            logical_id: logical_id.to_string(),
            path: local.to_path_buf(),
        });
    }

    tracing::debug!(logical_id, template = %local.display(), "entering nested template");
    let engine = TemplateEngine::nested(local, ctx.ancestry, ctx.max_depth)?;
    let tree = engine.export_boxed(ctx.store, ctx.bucket, ctx.prefix).await?;
    let body = parser::serialize_yaml(&tree)?;

    let key = artifact_key(
        ctx.prefix,
        local,
        KeyExtension::Force("yaml"),
        next_timestamp_millis(),
    );
    let destination = format!("s3://{}/{}", ctx.bucket, key);
    let put = ctx
        .store
        .put_object_content(&body, ctx.bucket, &key)
        .await
        .map_err(|source| ExportError::Storage {
            destination,
            source,
        })?;

    Ok(UploadResult {
        bucket: ctx.bucket.to_string(),
        key,
        version_id: put.version_id,
    })
}

/// Replace the descriptor's property with the uploaded location.
pub fn write_back(properties: &mut Mapping, descriptor: &ExporterDescriptor, uploaded: &UploadResult) {
    let value = match descriptor.write_back {
        WriteBack::Url => TemplateTree::String(uploaded.s3_url()),
        WriteBack::Record {
            bucket_key,
            object_key,
            version_key,
        } => {
            let mut record = Mapping::new();
            record.insert(bucket_key.into(), uploaded.bucket.clone().into());
            record.insert(object_key.into(), uploaded.key.clone().into());
            if let (Some(vk), Some(version)) = (version_key, &uploaded.version_id) {
                record.insert(vk.into(), version.clone().into());
            }
            TemplateTree::Mapping(record)
        }
    };
    set_property(properties, descriptor.property_path, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry;
    use crate::core::types::PutResult;
    use crate::storage::MockObjectStore;
    use std::sync::{Arc, Mutex};

    fn props(yaml: &str) -> Mapping {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    fn ctx<'a>(store: &'a dyn ObjectStore, dir: &'a Path) -> ExportContext<'a> {
        ExportContext {
            store,
            bucket: "bkt",
            prefix: "",
            template_dir: dir,
            ancestry: &[],
            max_depth: 8,
        }
    }

    fn ok_put(version: Option<&str>) -> Result<PutResult, crate::storage::StorageError> {
        Ok(PutResult {
            version_id: version.map(str::to_string),
        })
    }

    #[test]
    fn test_pk008_get_and_set_dotted_property() {
        let mut p = props("Command:\n  Name: glueetl\n  ScriptLocation: ./job.py\n");
        assert_eq!(
            get_property(&p, "Command.ScriptLocation").and_then(|v| v.as_str()),
            Some("./job.py")
        );
        set_property(&mut p, "Command.ScriptLocation", "s3://b/k".into());
        assert_eq!(p, props("Command:\n  Name: glueetl\n  ScriptLocation: s3://b/k\n"));
    }

    #[test]
    fn test_pk008_set_property_creates_intermediate_maps() {
        let mut p = props("RepositoryName: r\n");
        set_property(&mut p, "Code.S3", "x".into());
        assert_eq!(p, props("RepositoryName: r\nCode:\n  S3: x\n"));
        assert!(get_property(&p, "Missing.Path").is_none());
    }

    #[test]
    fn test_pk008_resolve_local_path() {
        let dir = Path::new("/work/templates");
        assert_eq!(
            resolve_local_path("./src", dir).unwrap(),
            PathBuf::from("/work/templates/./src")
        );
        assert_eq!(resolve_local_path("/abs/code", dir).unwrap(), PathBuf::from("/abs/code"));
        assert_eq!(
            resolve_local_path("file:///opt/code%20dir", dir).unwrap(),
            PathBuf::from("/opt/code dir")
        );
        assert!(matches!(
            resolve_local_path("file://remote-host/x", dir),
            Err(ExportError::InvalidFileUri { .. })
        ));
    }

    #[test]
    fn test_pk008_artifact_key_formats() {
        assert_eq!(
            artifact_key("", Path::new("/a/src/lambda"), KeyExtension::None, 42),
            "artifact/lambda-42"
        );
        assert_eq!(
            artifact_key("builds/", Path::new("/a/index.js"), KeyExtension::Original, 7),
            "builds/artifact/index-7.js"
        );
        assert_eq!(
            artifact_key("p", Path::new("/a/index.js"), KeyExtension::Force("zip"), 7),
            "p/artifact/index-7.zip"
        );
        assert_eq!(
            artifact_key("", Path::new("/a/Makefile"), KeyExtension::Original, 1),
            "artifact/Makefile-1"
        );
        // directory names are never split into stem and extension
        assert_eq!(
            artifact_key("", Path::new("/a/v1.2"), KeyExtension::None, 1),
            "artifact/v1.2-1"
        );
    }

    #[test]
    fn test_pk008_timestamps_strictly_increase() {
        let a = next_timestamp_millis();
        let b = next_timestamp_millis();
        let c = next_timestamp_millis();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_pk008_write_back_record_without_version() {
        let d = registry::lookup("AWS::Lambda::Function").unwrap();
        let mut p = props("Code: ./src\nRuntime: python3.12\n");
        let up = UploadResult {
            bucket: "b".into(),
            key: "artifact/src-1".into(),
            version_id: None,
        };
        write_back(&mut p, d, &up);
        assert_eq!(
            p,
            props("Code:\n  S3Bucket: b\n  S3Key: artifact/src-1\nRuntime: python3.12\n")
        );
    }

    #[test]
    fn test_pk008_write_back_version_needs_version_key() {
        let d = registry::lookup("AWS::ElasticBeanstalk::ApplicationVersion").unwrap();
        let mut p = props("SourceBundle: ./app.zip\n");
        let up = UploadResult {
            bucket: "b".into(),
            key: "k".into(),
            version_id: Some("v9".into()),
        };
        write_back(&mut p, d, &up);
        assert_eq!(p, props("SourceBundle:\n  S3Bucket: b\n  S3Key: k\n"));
    }

    #[tokio::test]
    async fn test_pk008_no_properties_is_noop() {
        let store = MockObjectStore::new();
        let d = registry::lookup("AWS::Lambda::Function").unwrap();
        let out = export_resource("Fn", d, None, ctx(&store, Path::new("/tmp")))
            .await
            .unwrap();
        assert_eq!(out, ResourceOutcome::Skipped(SkipReason::NoProperties));
    }

    #[tokio::test]
    async fn test_pk008_absent_optional_property_untouched() {
        let store = MockObjectStore::new();
        let d = registry::lookup("AWS::Serverless::Api").unwrap();
        let mut p = props("StageName: prod\n");
        let before = p.clone();
        let out = export_resource("Api", d, Some(&mut p), ctx(&store, Path::new("/tmp")))
            .await
            .unwrap();
        assert_eq!(out, ResourceOutcome::Skipped(SkipReason::PropertyAbsent));
        assert_eq!(p, before);
    }

    #[tokio::test]
    async fn test_pk008_object_and_remote_values_skipped() {
        let store = MockObjectStore::new();
        let d = registry::lookup("AWS::Lambda::Function").unwrap();
        let mut p = props("Code:\n  ZipFile: 'print(1)'\n");
        let out = export_resource("Fn", d, Some(&mut p), ctx(&store, Path::new("/tmp")))
            .await
            .unwrap();
        assert_eq!(out, ResourceOutcome::Skipped(SkipReason::AlreadyMaterialized));

        let d = registry::lookup("AWS::Serverless::Function").unwrap();
        let mut p = props("CodeUri: s3://existing-bucket/code.zip\n");
        let before = p.clone();
        let out = export_resource("Fn", d, Some(&mut p), ctx(&store, Path::new("/tmp")))
            .await
            .unwrap();
        assert_eq!(out, ResourceOutcome::Skipped(SkipReason::AlreadyRemote));
        assert_eq!(p, before);
    }

    #[tokio::test]
    async fn test_pk008_directory_is_zipped_and_released() {
        let dir = tempfile::tempdir().unwrap();
        let code = dir.path().join("code");
        std::fs::create_dir(&code).unwrap();
        std::fs::write(code.join("app.py"), "def handler(e, c): pass").unwrap();

        let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::default();
        let seen_in = seen.clone();
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(1).returning(move |path, _| {
            let bytes = std::fs::read(path).unwrap();
            assert!(bytes.starts_with(b"PK"), "payload must be a zip");
            seen_in.lock().unwrap().push(path.to_path_buf());
            ok_put(None)
        });

        let d = registry::lookup("AWS::Serverless::Function").unwrap();
        let mut p = props("CodeUri: ./code\nHandler: app.handler\n");
        let out = export_resource("Fn", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap();
        assert!(matches!(out, ResourceOutcome::Uploaded(_)));

        let uri = p.get("CodeUri").and_then(|v| v.as_str()).unwrap();
        assert!(uri.starts_with("s3://bkt/artifact/code-"), "got {}", uri);
        for payload in seen.lock().unwrap().iter() {
            assert!(!payload.exists(), "scratch zip must be released");
        }
        assert!(code.join("app.py").exists());
    }

    #[tokio::test]
    async fn test_pk008_force_zip_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.js"), "exports.h = 1").unwrap();

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(|_, dest| dest.starts_with("s3://bkt/artifact/index-") && dest.ends_with(".zip"))
            .times(1)
            .returning(|path, _| {
                let archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
                let names: Vec<_> = archive.file_names().collect();
                assert_eq!(names, vec!["index.js"]);
                ok_put(Some("v1"))
            });

        let d = registry::lookup("AWS::Lambda::Function").unwrap();
        let mut p = props("Code: index.js\n");
        export_resource("Fn", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap();
        let code = p.get("Code").and_then(|v| v.as_mapping()).unwrap();
        assert_eq!(code.get("S3Bucket").and_then(|v| v.as_str()), Some("bkt"));
        assert_eq!(code.get("S3ObjectVersion").and_then(|v| v.as_str()), Some("v1"));
    }

    #[tokio::test]
    async fn test_pk008_force_zip_existing_archive_uploaded_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        std::fs::write(&archive, b"PK\x03\x04original").unwrap();
        let expected = archive.clone();

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(move |path, dest| path == expected && dest.ends_with(".zip"))
            .times(1)
            .returning(|_, _| ok_put(None));

        let d = registry::lookup("AWS::Lambda::LayerVersion").unwrap();
        let mut p = props("Content: bundle.zip\n");
        export_resource("Layer", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap();
        assert!(archive.exists());
    }

    #[tokio::test]
    async fn test_pk008_non_force_zip_file_uploaded_directly() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("job.py"), "print('etl')").unwrap();

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(|path, dest| path.ends_with("job.py") && dest.ends_with(".py"))
            .times(1)
            .returning(|_, _| ok_put(None));

        let d = registry::lookup("AWS::Glue::Job").unwrap();
        let mut p = props("Command:\n  Name: glueetl\n  ScriptLocation: job.py\n");
        export_resource("Job", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap();
        let loc = get_property(&p, "Command.ScriptLocation").and_then(|v| v.as_str()).unwrap();
        assert!(loc.starts_with("s3://bkt/artifact/job-"));
    }

    #[tokio::test]
    async fn test_pk008_upload_failure_releases_scratch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "x").unwrap();

        let seen: Arc<Mutex<Vec<PathBuf>>> = Arc::default();
        let seen_in = seen.clone();
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(1).returning(move |path, _| {
            seen_in.lock().unwrap().push(path.to_path_buf());
            Err("bucket does not exist".into())
        });

        let d = registry::lookup("AWS::Lambda::Function").unwrap();
        let mut p = props("Code: main.py\n");
        let before = p.clone();
        let err = export_resource("Fn", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Storage { .. }));
        assert!(err.to_string().contains("bucket does not exist"));
        assert_eq!(p, before);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].exists());
    }

    #[tokio::test]
    async fn test_pk008_missing_artifact_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockObjectStore::new();
        let d = registry::lookup("AWS::Serverless::Function").unwrap();
        let mut p = props("CodeUri: ./does-not-exist\n");
        let err = export_resource("Fn", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Filesystem { .. }));
    }

    #[tokio::test]
    async fn test_pk008_null_property_packages_template_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.py"), "x").unwrap();

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .times(1)
            .returning(|_, _| ok_put(None));

        let d = registry::lookup("AWS::Serverless::Function").unwrap();
        let mut p = props("Handler: app.handler\n");
        export_resource("Fn", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap();
        let uri = p.get("CodeUri").and_then(|v| v.as_str()).unwrap();
        assert!(uri.starts_with("s3://bkt/artifact/"));
    }

    #[tokio::test]
    async fn test_pk008_inline_code_not_packaged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "x").unwrap();
        let store = MockObjectStore::new();
        let d = registry::lookup("AWS::Serverless::Function").unwrap();

        let mut p = props("InlineCode: 'exports.h = () => 1'\nHandler: index.h\n");
        let before = p.clone();
        let out = export_resource("Fn", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap();
        assert_eq!(out, ResourceOutcome::Skipped(SkipReason::NotPackageable));
        assert_eq!(p, before);

        let mut p = props("PackageType: Image\nImageUri: repo/app:latest\n");
        let before = p.clone();
        let out = export_resource("Fn", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap();
        assert_eq!(out, ResourceOutcome::Skipped(SkipReason::NotPackageable));
        assert_eq!(p, before);
    }

    #[tokio::test]
    async fn test_pk008_force_zip_misnamed_archive_is_zipped() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake.zip");
        std::fs::write(&fake, "plain text, not an archive").unwrap();
        let original = fake.clone();

        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .withf(move |path, dest| path != original && dest.ends_with(".zip"))
            .times(1)
            .returning(|path, _| {
                let mut archive =
                    zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
                let mut body = String::new();
                std::io::Read::read_to_string(&mut archive.by_name("fake.zip").unwrap(), &mut body)
                    .unwrap();
                assert_eq!(body, "plain text, not an archive");
                ok_put(None)
            });

        let d = registry::lookup("AWS::Lambda::Function").unwrap();
        let mut p = props("Code: fake.zip\n");
        export_resource("Fn", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap();
        assert!(fake.exists());
        let key = get_property(&p, "Code.S3Key").and_then(|v| v.as_str()).unwrap();
        assert!(key.starts_with("artifact/fake-") && key.ends_with(".zip"), "got {}", key);
    }

    #[tokio::test]
    async fn test_pk008_nested_reference_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockObjectStore::new();
        let d = registry::lookup("AWS::CloudFormation::Stack").unwrap();
        let mut p = props("TemplateURL: ./child.yaml\n");
        let err = export_resource("Child", d, Some(&mut p), ctx(&store, dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidNestedReference { .. }));
    }

    proptest::proptest! {
        #[test]
        fn test_pk008_key_layout_holds(
            prefix in "[a-z]{0,8}(/[a-z]{1,8}){0,2}/?",
            stem in "[A-Za-z0-9_-]{1,16}",
            ext in "[a-z]{1,4}",
            millis in 0u64..u64::MAX,
        ) {
            let file = PathBuf::from(format!("/w/{}.{}", stem, ext));
            let key = artifact_key(&prefix, &file, KeyExtension::Original, millis);
            let expected_tail = format!("{}/{}-{}.{}", ARTIFACT_DIR, stem, millis, ext);
            proptest::prop_assert!(key.ends_with(&expected_tail));
            proptest::prop_assert!(!key.starts_with('/'));
            proptest::prop_assert!(!key.contains("//"));
        }

        #[test]
        fn test_pk008_set_then_get_dotted(
            segments in proptest::collection::vec("[A-Z][a-z]{0,6}", 1..4),
            value in "[ -~]{0,24}",
        ) {
            let path = segments.join(".");
            let mut p = Mapping::new();
            set_property(&mut p, &path, value.clone().into());
            proptest::prop_assert_eq!(
                get_property(&p, &path).and_then(|v| v.as_str()),
                Some(value.as_str())
            );
        }
    }
}
