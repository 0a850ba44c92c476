//! PK-006: Archive probe — classify a path as file, directory, or archive.
//!
//! Only paths with a known archive extension are sniffed. The extension alone
//! is not enough: the leading bytes must carry the matching signature, so a
//! misnamed text file is still zipped before upload.

use std::io::Read;
use std::path::Path;

const HEADER_LEN: usize = 8;
const TAR_BLOCK: usize = 512;

/// Classification of a local path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathKind {
    pub is_file: bool,
    pub is_directory: bool,
    pub is_archive: bool,
}

/// Archive families recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFamily {
    Zip,
    Rar,
    SevenZip,
    Gzip,
    Tar,
}

fn family_for(path: &Path) -> Option<ArchiveFamily> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        // jar/war are zip containers
        "zip" | "jar" | "war" => Some(ArchiveFamily::Zip),
        "rar" => Some(ArchiveFamily::Rar),
        "7z" => Some(ArchiveFamily::SevenZip),
        "gz" | "tgz" => Some(ArchiveFamily::Gzip),
        "tar" => Some(ArchiveFamily::Tar),
        _ => None,
    }
}

fn signature_matches(family: ArchiveFamily, header: &[u8]) -> bool {
    match family {
        ArchiveFamily::Zip => header.starts_with(b"PK"),
        ArchiveFamily::Rar => header.starts_with(b"Rar!"),
        ArchiveFamily::SevenZip => header.starts_with(b"7z"),
        ArchiveFamily::Gzip => header.starts_with(&[0x1F, 0x8B]),
        ArchiveFamily::Tar => false,
    }
}

/// Read up to `len` leading bytes of a file.
fn read_prefix(path: &Path, len: usize) -> Option<Vec<u8>> {
    let file = std::fs::File::open(path).ok()?;
    let mut buf = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buf).ok()?;
    Some(buf)
}

/// Tar has no leading magic; validate the first header block instead.
fn is_tar(path: &Path) -> bool {
    let Some(block) = read_prefix(path, TAR_BLOCK) else {
        return false;
    };
    if block.len() < TAR_BLOCK {
        return false;
    }
    let header = tar::Header::from_byte_slice(&block);
    let recognised = header.as_ustar().is_some() || header.as_gnu().is_some();
    let checksum_ok = header
        .cksum()
        .map(|stored| {
            let computed: u32 = block
                .iter()
                .enumerate()
                .map(|(i, b)| if (148..156).contains(&i) { 32 } else { u32::from(*b) })
                .sum();
            stored == computed
        })
        .unwrap_or(false);
    recognised && checksum_ok
}

/// Returns true if `path` is an existing file whose extension and signature
/// both identify an archive.
pub fn is_archive(path: &Path) -> bool {
    let Some(family) = family_for(path) else {
        return false;
    };
    if !path.is_file() {
        return false;
    }
    if family == ArchiveFamily::Tar {
        return is_tar(path);
    }
    read_prefix(path, HEADER_LEN)
        .map(|header| signature_matches(family, &header))
        .unwrap_or(false)
}

/// Classify a path. Missing paths classify as all-false.
pub fn classify(path: &Path) -> PathKind {
    let is_file = path.is_file();
    PathKind {
        is_file,
        is_directory: path.is_dir(),
        is_archive: is_file && is_archive(path),
    }
}
