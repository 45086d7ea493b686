// Covenant: per-user signed append-only ledgers with cross-chain transactions
//
// SPDX-License-Identifier: Apache-2.0

//! Content-addressed references to files, resolved against a caller-supplied
//! array of base directories (a "location array"). A fileref names its base
//! directory by index rather than by absolute path so that a block can
//! reference files under several roots (the chain directory, a peer's
//! transaction directory, a VCS checkout) without embedding any of those
//! roots' absolute paths in the signed content.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash_bytes, Digest};
use crate::magic::FILEREF_MAGIC;

/// A file identified by location index, relative path, and expected digest.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(rename = "pyom_fileref_magic")]
    pub magic: String,
    pub locidx: usize,
    pub filename: String,
    #[serde(rename = "SHA-512")]
    pub sha512: Digest,
}

/// A fileref without a digest, used for directories.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct PathRef {
    pub locidx: usize,
    pub filename: String,
}

impl FileRef {
    pub fn check_magic(&self) -> Result<()> {
        if self.magic != FILEREF_MAGIC {
            return Err(Error::Schema(format!("bad fileref magic: {}", self.magic)));
        }
        Ok(())
    }
}

/// Reads `locidx`-relative `filename` under `root`, hashes it, and returns a
/// fileref. `root` must be the directory named by `locidx` in whatever
/// location array the caller intends to resolve this fileref against later.
pub fn create_fileref(root: &Path, locidx: usize, filename: &str) -> Result<FileRef> {
    let path = root.join(filename);
    let content = std::fs::read(&path)?;
    Ok(FileRef {
        magic: FILEREF_MAGIC.to_owned(),
        locidx,
        filename: filename.to_owned(),
        sha512: hash_bytes(&content),
    })
}

pub fn create_pathref(locidx: usize, filename: &str) -> PathRef {
    PathRef { locidx, filename: filename.to_owned() }
}

/// Resolves a location index + relative path against `locations` to an
/// absolute path, rejecting absolute filenames and any resolution that
/// escapes the named base directory (symlink traversal included).
pub fn resolve(locations: &[PathBuf], locidx: usize, filename: &str) -> Result<PathBuf> {
    let root = locations
        .get(locidx)
        .ok_or_else(|| Error::NotFound(format!("location index {locidx}")))?;
    let rel = Path::new(filename);
    if rel.is_absolute() {
        return Err(Error::PathEscape);
    }
    let joined = root.join(rel);
    let canonical_root = root.canonicalize()?;
    let canonical = joined.canonicalize().map_err(|_| Error::PathEscape)?;
    if canonical.strip_prefix(&canonical_root).is_err() {
        return Err(Error::PathEscape);
    }
    Ok(canonical)
}

pub fn resolve_fileref(locations: &[PathBuf], fileref: &FileRef) -> Result<PathBuf> {
    resolve(locations, fileref.locidx, &fileref.filename)
}

pub fn resolve_pathref(locations: &[PathBuf], pathref: &PathRef) -> Result<PathBuf> {
    resolve(locations, pathref.locidx, &pathref.filename)
}

/// Resolves and reads a fileref, failing with [`Error::HashMismatch`] if the
/// content no longer matches the stored digest.
pub fn load(locations: &[PathBuf], fileref: &FileRef) -> Result<Vec<u8>> {
    fileref.check_magic()?;
    let path = resolve_fileref(locations, fileref)?;
    let content = std::fs::read(&path)?;
    let digest = hash_bytes(&content);
    if digest != fileref.sha512 {
        return Err(Error::HashMismatch { expected: fileref.sha512.to_string(), found: digest.to_string() });
    }
    Ok(content)
}

/// Walks an arbitrary JSON value, finds every object tagged with the fileref
/// magic, and verifies its digest. Used to check every embedded fileref in a
/// block body exactly once before any action is interpreted.
pub fn check_all(value: &serde_json::Value, locations: &[PathBuf]) -> Result<()> {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("pyom_fileref_magic").and_then(|v| v.as_str()) == Some(FILEREF_MAGIC) {
                let fileref: FileRef = serde_json::from_value(value.clone())?;
                load(locations, &fileref)?;
            }
            for v in map.values() {
                check_all(v, locations)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                check_all(item, locations)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), b"hello").unwrap();
        let fileref = create_fileref(dir.path(), 0, "f.txt").unwrap();
        let locations = vec![dir.path().to_path_buf()];
        let content = load(&locations, &fileref).unwrap();
        assert_eq!(content, b"hello");
    }

    #[test]
    fn rejects_absolute_filename() {
        let dir = tempfile::tempdir().unwrap();
        let locations = vec![dir.path().to_path_buf()];
        let err = resolve(&locations, 0, "/etc/passwd").unwrap_err();
        assert!(matches!(err, Error::PathEscape));
    }

    #[test]
    fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let locations = vec![dir.path().join("sub")];
        let err = resolve(&locations, 0, "../../etc/passwd").unwrap_err();
        assert!(matches!(err, Error::PathEscape));
    }

    #[test]
    fn detects_tampered_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), b"hello").unwrap();
        let fileref = create_fileref(dir.path(), 0, "f.txt").unwrap();
        std::fs::write(dir.path().join("f.txt"), b"tampered").unwrap();
        let locations = vec![dir.path().to_path_buf()];
        let err = load(&locations, &fileref).unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
    }
}
