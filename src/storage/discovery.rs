//! Source file discovery
//!
//! Exports are named `<Prefix>-YYYY-MM-DD.<ext>` or `<Prefix>YYYYMMDD.<ext>`.
//! Discovery matches the shape of those names loosely; date extraction is
//! strict, so a file that only looks like an export fails on its own
//! without hiding it from callers.

use chrono::NaiveDate;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::storage::error::{StorageError, StorageResult};

/// Filename conventions of the export tool
#[derive(Debug, Clone)]
pub struct FileNaming {
    prefix: String,
    extension: String,
    dashed_shape: Regex,
    compact_shape: Regex,
    dashed_date: Regex,
    compact_date: Regex,
}

impl FileNaming {
    /// Build the filename patterns for a prefix and extension (without dot)
    pub fn new(prefix: &str, extension: &str) -> StorageResult<Self> {
        let p = regex::escape(prefix);
        let e = regex::escape(extension.trim_start_matches('.'));
        let compile = |pattern: String| {
            Regex::new(&pattern).map_err(|err| StorageError::Config(err.to_string()))
        };

        Ok(Self {
            prefix: prefix.to_string(),
            extension: extension.trim_start_matches('.').to_string(),
            dashed_shape: compile(format!(r"^{p}-.{{4}}-.{{2}}-.{{2}}\.{e}$"))?,
            compact_shape: compile(format!(r"^{p}.{{8}}\.{e}$"))?,
            dashed_date: compile(format!(r"^{p}-(\d{{4}})-(\d{{2}})-(\d{{2}})\.{e}$"))?,
            compact_date: compile(format!(r"^{p}(\d{{4}})(\d{{2}})(\d{{2}})\.{e}$"))?,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Check whether a bare filename has the shape of an export
    pub fn is_candidate(&self, file_name: &str) -> bool {
        self.dashed_shape.is_match(file_name) || self.compact_shape.is_match(file_name)
    }

    /// Extract the calendar date encoded in a file's name
    pub fn extract_date(&self, path: &Path) -> StorageResult<NaiveDate> {
        let invalid = || StorageError::InvalidFilename(path.to_path_buf());
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(invalid)?;

        let caps = self
            .dashed_date
            .captures(name)
            .or_else(|| self.compact_date.captures(name))
            .ok_or_else(invalid)?;

        let year: i32 = caps[1].parse().map_err(|_| invalid())?;
        let month: u32 = caps[2].parse().map_err(|_| invalid())?;
        let day: u32 = caps[3].parse().map_err(|_| invalid())?;

        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
    }
}

/// Enumerate export files directly under `root`
///
/// Returns a distinct, lexicographically sorted list. Re-scans the
/// directory on every call.
pub fn discover_files(root: &Path, naming: &FileNaming) -> StorageResult<Vec<PathBuf>> {
    let discovery_error = |source| StorageError::Discovery {
        path: root.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(root).map_err(discovery_error)? {
        let entry = entry.map_err(discovery_error)?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let is_candidate = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| naming.is_candidate(n))
            .unwrap_or(false);

        if is_candidate {
            files.push(path);
        }
    }

    files.sort();
    files.dedup();

    tracing::debug!("Discovered {} export files in {:?}", files.len(), root);
    Ok(files)
}
