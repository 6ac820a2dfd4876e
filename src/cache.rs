//! Local archive cache: a flat directory of downloaded artifacts.
//!
//! The cache is the single local directory the downloader fills and the
//! deployment session reads from. Cleanup is driven by the keep set a
//! download run produces; it never touches subdirectories and treats
//! per-file delete failures as best effort.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::resolve::ArtifactDescriptor;
use crate::status::StatusSink;

/// Errors from cache maintenance.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to read cache directory {dir}: {source}")]
    ReadDir {
        dir: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to delete {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Presence report for a set of artifact descriptors.
///
/// `existing` and `missing` are disjoint and together cover every descriptor
/// that was checked.
#[derive(Debug, Clone, Default)]
pub struct FileReport {
    pub existing: Vec<String>,
    pub missing: Vec<String>,
}

impl FileReport {
    pub fn all_files_exist(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn total(&self) -> usize {
        self.existing.len() + self.missing.len()
    }
}

/// Handle on the local cache directory.
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of a cached file by name.
    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Stat-based existence check; absence is not an error.
    pub fn exists(&self, file_name: &str) -> bool {
        self.path_of(file_name).is_file()
    }

    /// Partition descriptors by presence in the cache.
    pub fn check_files(&self, descriptors: &[ArtifactDescriptor]) -> FileReport {
        let mut report = FileReport::default();
        for descriptor in descriptors {
            if self.exists(&descriptor.local_file_name) {
                report.existing.push(descriptor.local_file_name.clone());
            } else {
                report.missing.push(descriptor.local_file_name.clone());
            }
        }
        report
    }

    /// Delete every regular file directly under the cache directory whose name
    /// is not in the keep set.
    ///
    /// A disabled `auto_clean` flag turns this into a no-op. Subdirectories
    /// are never entered. A file that fails to delete is logged and skipped;
    /// the remaining candidates are still attempted.
    pub fn cleanup(
        &self,
        keep: &BTreeSet<String>,
        auto_clean: bool,
        sink: &dyn StatusSink,
    ) -> Result<Vec<String>, CacheError> {
        if !auto_clean {
            debug!("auto-clean disabled, skipping cache cleanup");
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|source| CacheError::ReadDir {
            dir: self.dir.display().to_string(),
            source,
        })?;

        let mut deleted = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping unreadable cache entry: {err}");
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file || keep.contains(&name) {
                continue;
            }

            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    sink.status(&format!("deleted stale file: {name}"));
                    deleted.push(name);
                }
                Err(err) => {
                    // Best effort: report and keep going.
                    warn!(file = %name, "failed to delete stale cache file: {err}");
                    sink.error(&format!("failed to delete {name}: {err}"));
                }
            }
        }
        Ok(deleted)
    }

    /// Delete exactly the files named by the descriptors that exist.
    ///
    /// Used for the user-initiated "delete all downloaded files" action; the
    /// confirmation itself is the caller's concern.
    pub fn purge(
        &self,
        descriptors: &[ArtifactDescriptor],
        sink: &dyn StatusSink,
    ) -> Result<usize, CacheError> {
        let mut deleted = 0;
        for descriptor in descriptors {
            let path = self.path_of(&descriptor.local_file_name);
            if !path.is_file() {
                continue;
            }
            std::fs::remove_file(&path).map_err(|source| CacheError::Delete {
                path: path.display().to_string(),
                source,
            })?;
            sink.status(&format!("deleted {}", descriptor.local_file_name));
            deleted += 1;
        }
        Ok(deleted)
    }
}
