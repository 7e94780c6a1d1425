//! Content fingerprints for staleness detection.
//!
//! Two stamps are recorded for every compiled block:
//!
//! - **Source stamp** ([`block_stamp`]): SHA-256 over the files that sit
//!   directly in the block directory and in every variant directory on the
//!   way down to the block's workspace. Subdirectories that belong to other
//!   variants are not part of the set, so editing `menu/dark/` never
//!   invalidates `menu_light`.
//!
//! - **Output stamp** ([`dir_stamp`]): SHA-256 over every file under the
//!   compiled output directory, recursively. Catches hand edits and deleted
//!   attachments in the output.
//!
//! Both stamps hash `(path, size, mtime)` rather than file contents: a stamp
//! is recomputed for every index entry consulted during a compile, and most
//! of those blocks are unchanged.

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Directory not found: {0}")]
    MissingDir(PathBuf),
    #[error("Workspace directory \"{workspace}\" is not inside the block directory \"{block}\"")]
    OutsideBlock { block: PathBuf, workspace: PathBuf },
}

/// Feed one file's identity into the hasher.
fn hash_entry(hasher: &mut Sha256, name: &str, meta: &fs::Metadata) {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .unwrap_or_default();
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(meta.len().to_le_bytes());
    hasher.update(mtime.as_secs().to_le_bytes());
    hasher.update(mtime.subsec_nanos().to_le_bytes());
}

/// Hash the regular files directly inside `dir` (non-recursive), sorted by name.
fn hash_flat_dir(hasher: &mut Sha256, dir: &Path) -> Result<(), FingerprintError> {
    if !dir.is_dir() {
        return Err(FingerprintError::MissingDir(dir.to_path_buf()));
    }
    let mut files: Vec<(PathBuf, fs::Metadata)> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok().map(|m| (e.path(), m)))
        .filter(|(_, m)| m.is_file())
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    for (path, meta) in &files {
        hash_entry(hasher, &path.to_string_lossy(), meta);
    }
    Ok(())
}

/// Source stamp of a block resolved to `workspace` inside `block_dir`.
///
/// `workspace` may equal `block_dir` (no variant). A workspace that is not
/// inside the block directory is an error.
pub fn block_stamp(block_dir: &Path, workspace: &Path) -> Result<String, FingerprintError> {
    let relative = workspace
        .strip_prefix(block_dir)
        .map_err(|_| FingerprintError::OutsideBlock {
            block: block_dir.to_path_buf(),
            workspace: workspace.to_path_buf(),
        })?;

    let mut hasher = Sha256::new();
    hash_flat_dir(&mut hasher, block_dir)?;

    let mut level = block_dir.to_path_buf();
    for component in relative.components() {
        level.push(component);
        hash_flat_dir(&mut hasher, &level)?;
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Output stamp: every file under `dir`, recursively, by relative path.
pub fn dir_stamp(dir: &Path) -> Result<String, FingerprintError> {
    if !dir.is_dir() {
        return Err(FingerprintError::MissingDir(dir.to_path_buf()));
    }
    let mut hasher = Sha256::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata().map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        hash_entry(&mut hasher, &relative.to_string_lossy(), &meta);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 hex digest of a string, used to key `@font-face` groups.
pub fn hash_str(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}
