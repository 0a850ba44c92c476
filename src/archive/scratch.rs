//! PK-007: Scratch resources — temp directories and zip files for packaging.
//!
//! Every scratch resource is an owned guard. Dropping it removes the
//! resource; [`ScratchDir::release`] / [`ScratchFile::release`] do the same
//! while reporting errors. Release is idempotent: an already-removed path is
//! not an error.

use crate::core::error::ExportError;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const SCRATCH_PREFIX: &str = "stackpack-";

/// Tool-owned directory (local object store, caches) never packed into bundles.
pub const STATE_DIR_NAME: &str = ".stackpack";

/// True for entries below the walk root that live in the tool's own state dir.
fn is_state_dir(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == STATE_DIR_NAME
}

/// A scratch directory removed on release or drop.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory tree now.
    pub fn release(self) -> Result<(), ExportError> {
        let path = self.dir.path().to_path_buf();
        ignore_missing(&path, self.dir.close())
    }
}

/// A scratch file removed on release or drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: TempPath,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now.
    pub fn release(self) -> Result<(), ExportError> {
        let path = self.path.to_path_buf();
        ignore_missing(&path, self.path.close())
    }
}

fn ignore_missing(path: &Path, result: std::io::Result<()>) -> Result<(), ExportError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ExportError::fs(path, e)),
    }
}

/// Copy `path` into a fresh scratch directory under its original base name.
///
/// Used to turn a single file into a one-entry directory so the directory
/// zipping path can be reused.
pub fn copy_into_own_directory(path: &Path) -> Result<ScratchDir, ExportError> {
    let dir = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir()
        .map_err(|e| ExportError::fs(std::env::temp_dir(), e))?;
    let scratch = ScratchDir { dir };

    let name = path
        .file_name()
        .ok_or_else(|| ExportError::fs(path, std::io::Error::other("path has no file name")))?;
    let target = scratch.path().join(name);
    if path.is_dir() {
        copy_tree(path, &target)?;
    } else {
        std::fs::copy(path, &target).map_err(|e| ExportError::fs(path, e))?;
    }
    Ok(scratch)
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), ExportError> {
    for entry in WalkDir::new(from)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_state_dir(e))
    {
        let entry = entry.map_err(|e| ExportError::fs(from, e.into()))?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| ExportError::fs(entry.path(), std::io::Error::other(e)))?;
        let dest = to.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| ExportError::fs(&dest, e))?;
        } else {
            std::fs::copy(entry.path(), &dest).map_err(|e| ExportError::fs(entry.path(), e))?;
        }
    }
    Ok(())
}

/// Zip the contents of `dir` (entries rooted at the archive root) into a
/// uniquely named scratch file, using maximum deflate compression.
///
/// Unix permission bits are carried into the archive. `.stackpack`
/// directories are skipped.
pub fn zip_directory(dir: &Path) -> Result<ScratchFile, ExportError> {
    let tmp = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .suffix(".zip")
        .tempfile()
        .map_err(|e| ExportError::fs(std::env::temp_dir(), e))?;
    let (file, path) = tmp.into_parts();
    let scratch = ScratchFile { path };

    write_zip(dir, file)?;
    tracing::debug!(source = %dir.display(), archive = %scratch.path().display(), "zipped directory");
    Ok(scratch)
}

fn write_zip<W: Write + Seek>(dir: &Path, sink: W) -> Result<(), ExportError> {
    let archive_err = |source| ExportError::Archive {
        path: dir.to_path_buf(),
        source,
    };
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));
    let mut zip = ZipWriter::new(sink);

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_state_dir(e));
    for entry in walker {
        let entry = entry.map_err(|e| ExportError::fs(dir, e.into()))?;
        let name = entry_name(dir, entry.path())?;
        let entry_options = with_permissions(options, &entry)?;
        if entry.file_type().is_dir() {
            zip.add_directory(name, entry_options).map_err(archive_err)?;
        } else {
            zip.start_file(name, entry_options).map_err(archive_err)?;
            let mut src =
                std::fs::File::open(entry.path()).map_err(|e| ExportError::fs(entry.path(), e))?;
            std::io::copy(&mut src, &mut zip).map_err(|e| ExportError::fs(entry.path(), e))?;
        }
    }
    zip.finish().map_err(archive_err)?;
    Ok(())
}

#[cfg(unix)]
fn with_permissions(
    options: SimpleFileOptions,
    entry: &walkdir::DirEntry,
) -> Result<SimpleFileOptions, ExportError> {
    use std::os::unix::fs::PermissionsExt;
    let meta = entry
        .metadata()
        .map_err(|e| ExportError::fs(entry.path(), e.into()))?;
    Ok(options.unix_permissions(meta.permissions().mode()))
}

#[cfg(not(unix))]
fn with_permissions(
    options: SimpleFileOptions,
    _entry: &walkdir::DirEntry,
) -> Result<SimpleFileOptions, ExportError> {
    Ok(options)
}

/// Archive entry name: root-relative with `/` separators.
fn entry_name(root: &Path, path: &Path) -> Result<String, ExportError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|e| ExportError::fs(path, std::io::Error::other(e)))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

/// Remove a file or directory tree; a missing path is not an error.
pub fn release(path: &Path) -> Result<(), ExportError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    ignore_missing(path, result)
}

/// Scratch resources held while one artifact is processed.
#[derive(Debug, Default)]
pub struct ScratchSet {
    dirs: Vec<ScratchDir>,
    files: Vec<ScratchFile>,
}

impl ScratchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold_dir(&mut self, dir: ScratchDir) -> PathBuf {
        let path = dir.path().to_path_buf();
        self.dirs.push(dir);
        path
    }

    pub fn hold_file(&mut self, file: ScratchFile) -> PathBuf {
        let path = file.path().to_path_buf();
        self.files.push(file);
        path
    }

    /// Release everything held, reporting the first failure after attempting all.
    pub fn release(self) -> Result<(), ExportError> {
        let mut first_err = None;
        for f in self.files {
            if let Err(e) = f.release() {
                first_err.get_or_insert(e);
            }
        }
        for d in self.dirs {
            if let Err(e) = d.release() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
