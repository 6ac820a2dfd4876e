//! Artifact downloader and the cache-filling pipeline.
//!
//! `fetch` pulls a single archive over HTTPS into the cache. Writes go
//! through a temp file in the target directory that is only persisted on
//! success, so a transfer that dies halfway never leaves a file masquerading
//! as a complete archive. `download_all` drives the whole OS x arch cross
//! product, accumulating the keep set that guards the cleanup pass.

use std::collections::BTreeSet;
use std::io::Write;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, CacheStore};
use crate::platform::{PlatformSelection, SelectionError};
use crate::product::ProductIdentity;
use crate::resolve::{ArtifactDescriptor, ArtifactKind, ResolveError, resolve};
use crate::status::StatusSink;

/// Connect timeout for artifact requests. No overall request timeout: server
/// archives are large and transfer time varies too much to cap.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors from fetching artifacts.
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error(transparent)]
    EmptySelection(#[from] SelectionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("download of {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write {file_name}: {source}")]
    Filesystem {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("checksum mismatch for {file_name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file_name: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// How a single fetch concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The archive was transferred and persisted.
    Downloaded,
    /// The destination already existed; no network call was made.
    AlreadyPresent,
}

/// One artifact that could not be fetched.
#[derive(Debug)]
pub struct DownloadFailure {
    pub file_name: String,
    pub error: DownloadError,
}

/// Outcome of a full `download_all` run.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Filenames that existed or were fetched this run; cleanup must not
    /// delete any of these.
    pub keep_set: BTreeSet<String>,
    pub fetched: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<DownloadFailure>,
    pub cleaned: Vec<String>,
}

impl DownloadReport {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Knobs for a download run, lifted from the settings snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Delete files outside the keep set after the run.
    pub auto_clean: bool,
    /// Verify a `<url>.sha256` companion file when one is published.
    pub verify_checksums: bool,
}

/// HTTPS fetcher for server and CLI archives.
pub struct Downloader {
    client: reqwest::blocking::Client,
    verify_checksums: bool,
}

impl Downloader {
    pub fn new(options: DownloadOptions) -> Result<Self, DownloadError> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("osi/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DownloadError::Client)?;
        Ok(Self {
            client,
            verify_checksums: options.verify_checksums,
        })
    }

    /// Fetch one artifact into the cache.
    ///
    /// Skips the network entirely when the destination file already exists.
    /// On any failure the partially written temp file is discarded, leaving
    /// nothing at the destination path.
    pub fn fetch(
        &self,
        descriptor: &ArtifactDescriptor,
        store: &CacheStore,
    ) -> Result<FetchOutcome, DownloadError> {
        let file_name = &descriptor.local_file_name;
        if store.exists(file_name) {
            debug!(file = %file_name, "already cached, skipping download");
            return Ok(FetchOutcome::AlreadyPresent);
        }

        debug!(url = %descriptor.remote_url, file = %file_name, "starting download");
        let mut response = self
            .client
            .get(&descriptor.remote_url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|source| DownloadError::Network {
                url: descriptor.remote_url.clone(),
                source,
            })?;

        let mut tmp =
            NamedTempFile::new_in(store.dir()).map_err(|source| DownloadError::Filesystem {
                file_name: file_name.clone(),
                source,
            })?;

        let digest = if self.verify_checksums {
            let mut writer = HashingWriter::new(tmp.as_file_mut());
            response
                .copy_to(&mut writer)
                .map_err(|source| DownloadError::Network {
                    url: descriptor.remote_url.clone(),
                    source,
                })?;
            Some(writer.finish())
        } else {
            response
                .copy_to(&mut tmp.as_file_mut())
                .map_err(|source| DownloadError::Network {
                    url: descriptor.remote_url.clone(),
                    source,
                })?;
            None
        };

        if let Some(actual) = digest {
            self.verify_digest(descriptor, &actual)?;
        }

        tmp.persist(store.path_of(file_name))
            .map_err(|err| DownloadError::Filesystem {
                file_name: file_name.clone(),
                source: err.error,
            })?;

        info!(file = %file_name, "download complete");
        Ok(FetchOutcome::Downloaded)
    }

    /// Compare the streamed digest against the published `<url>.sha256`.
    ///
    /// An absent or malformed checksum file downgrades to a warning so an
    /// upstream that publishes no checksums still works with verification
    /// turned on; only an actual mismatch fails the fetch.
    fn verify_digest(
        &self,
        descriptor: &ArtifactDescriptor,
        actual: &str,
    ) -> Result<(), DownloadError> {
        let checksum_url = format!("{}.sha256", descriptor.remote_url);
        let body = match self
            .client
            .get(&checksum_url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
        {
            Ok(body) => body,
            Err(err) => {
                warn!(url = %checksum_url, "checksum unavailable, skipping verification: {err}");
                return Ok(());
            }
        };

        // Format is either the bare hash or "hash  filename".
        let expected = body.split_whitespace().next().unwrap_or("").to_lowercase();
        if expected.len() != 64 || !expected.chars().all(|c| c.is_ascii_hexdigit()) {
            warn!(url = %checksum_url, "malformed checksum file, skipping verification");
            return Ok(());
        }

        if expected != actual {
            return Err(DownloadError::ChecksumMismatch {
                file_name: descriptor.local_file_name.clone(),
                expected,
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Fill the cache for every (os, arch) pair of the selection.
    ///
    /// Validates the selection before any I/O. Each pair is attempted
    /// independently; one pair's failure never blocks the others. Filenames
    /// that existed or were fetched join the keep set, as do CLI archives
    /// already cached for the selected architectures. After all pairs are
    /// attempted, the cleanup pass runs against the accumulated keep set.
    pub fn download_all(
        &self,
        identity: &ProductIdentity,
        selection: &PlatformSelection,
        store: &CacheStore,
        options: DownloadOptions,
        sink: &dyn StatusSink,
    ) -> Result<DownloadReport, DownloadError> {
        selection.validate()?;
        let servers = resolve(identity, selection, ArtifactKind::Server)?;
        let clis = resolve(identity, selection, ArtifactKind::Cli)?;

        let mut report = DownloadReport::default();
        for descriptor in &servers {
            let file_name = descriptor.local_file_name.clone();
            sink.status(&format!("fetching {file_name}"));
            match self.fetch(descriptor, store) {
                Ok(FetchOutcome::Downloaded) => {
                    sink.status(&format!("downloaded {file_name}"));
                    report.keep_set.insert(file_name.clone());
                    report.fetched.push(file_name);
                }
                Ok(FetchOutcome::AlreadyPresent) => {
                    sink.status(&format!("already present, skipped {file_name}"));
                    report.keep_set.insert(file_name.clone());
                    report.skipped.push(file_name);
                }
                Err(error) => {
                    sink.error(&format!("failed to download {file_name}: {error}"));
                    report.failures.push(DownloadFailure { file_name, error });
                }
            }
        }

        // CLI bundles are not auto-downloaded, but ones already in the cache
        // are still wanted by the current selection and must survive cleanup.
        for descriptor in &clis {
            if store.exists(&descriptor.local_file_name) {
                report.keep_set.insert(descriptor.local_file_name.clone());
            }
        }

        report.cleaned = store.cleanup(&report.keep_set, options.auto_clean, sink)?;
        Ok(report)
    }
}

/// Write adapter that feeds a SHA-256 hasher alongside the file.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};
    use crate::status::NullSink;
    use tempfile::TempDir;

    fn identity() -> ProductIdentity {
        ProductIdentity {
            short_name: "Code".into(),
            version: "1.96.0".into(),
            commit: "abc123".into(),
        }
    }

    fn unreachable_descriptor(file_name: &str) -> ArtifactDescriptor {
        ArtifactDescriptor {
            kind: ArtifactKind::Server,
            os: Some(Os::Linux),
            arch: Arch::X64,
            // Reserved TEST-NET-1 address; connections fail without touching
            // the real network.
            remote_url: "http://192.0.2.1:9/archive.tar.gz".into(),
            local_file_name: file_name.into(),
        }
    }

    #[test]
    fn fetch_skips_network_when_file_exists() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        std::fs::write(tmp.path().join("cached.tar.gz"), b"payload").unwrap();

        let downloader = Downloader::new(DownloadOptions::default()).unwrap();
        // The URL is unreachable; a skip proves no network call happened.
        let outcome = downloader
            .fetch(&unreachable_descriptor("cached.tar.gz"), &store)
            .unwrap();
        assert_eq!(outcome, FetchOutcome::AlreadyPresent);
        assert_eq!(
            std::fs::read(tmp.path().join("cached.tar.gz")).unwrap(),
            b"payload"
        );
    }

    #[test]
    fn failed_fetch_leaves_no_destination_file() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let downloader = Downloader::new(DownloadOptions::default()).unwrap();

        let err = downloader
            .fetch(&unreachable_descriptor("missing.tar.gz"), &store)
            .unwrap_err();
        assert!(matches!(err, DownloadError::Network { .. }));
        assert!(!tmp.path().join("missing.tar.gz").exists());
        // No stray temp files either.
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
    }

    #[test]
    fn download_all_rejects_empty_selection_before_io() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        let downloader = Downloader::new(DownloadOptions::default()).unwrap();
        let selection = PlatformSelection::new([], [Arch::X64]);

        let err = downloader
            .download_all(
                &identity(),
                &selection,
                &store,
                DownloadOptions::default(),
                &NullSink,
            )
            .unwrap_err();
        assert!(matches!(err, DownloadError::EmptySelection(_)));
    }

    #[test]
    fn download_all_is_idempotent_against_populated_cache() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        // Pre-populate every server artifact of the selection; the run must
        // perform zero network transfers (the real URLs would fail in tests).
        std::fs::write(tmp.path().join("Code-linux-x64-abc123.tar.gz"), b"a").unwrap();
        std::fs::write(tmp.path().join("Code-linux-arm64-abc123.tar.gz"), b"b").unwrap();

        let downloader = Downloader::new(DownloadOptions::default()).unwrap();
        let selection = PlatformSelection::new([Os::Linux], [Arch::X64, Arch::Arm64]);
        let report = downloader
            .download_all(
                &identity(),
                &selection,
                &store,
                DownloadOptions::default(),
                &NullSink,
            )
            .unwrap();

        assert!(report.all_succeeded());
        assert!(report.fetched.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(
            report.keep_set.iter().cloned().collect::<Vec<_>>(),
            vec![
                "Code-linux-arm64-abc123.tar.gz",
                "Code-linux-x64-abc123.tar.gz",
            ]
        );
    }

    #[test]
    fn download_all_accumulates_failures_without_aborting() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        // One pair is satisfied from cache, the other must fail over the
        // network; the failing pair must not block the cached one.
        std::fs::write(tmp.path().join("Code-linux-x64-abc123.tar.gz"), b"a").unwrap();

        let downloader = Downloader::new(DownloadOptions::default()).unwrap();
        let selection = PlatformSelection::new([Os::Linux, Os::Darwin], [Arch::X64]);
        let report = downloader
            .download_all(
                &identity(),
                &selection,
                &store,
                DownloadOptions::default(),
                &NullSink,
            )
            .unwrap();

        assert!(!report.all_succeeded());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            report.failures[0].file_name,
            "Code-darwin-x64-abc123.tar.gz"
        );
        assert!(report.keep_set.contains("Code-linux-x64-abc123.tar.gz"));
        assert!(!report.keep_set.contains("Code-darwin-x64-abc123.tar.gz"));
    }

    #[test]
    fn download_all_keep_set_shields_cli_archives_from_cleanup() {
        let tmp = TempDir::new().unwrap();
        let store = CacheStore::new(tmp.path());
        std::fs::write(tmp.path().join("Code-linux-x64-abc123.tar.gz"), b"a").unwrap();
        std::fs::write(tmp.path().join("Code-cli-x64.tar.gz"), b"cli").unwrap();
        std::fs::write(tmp.path().join("Code-linux-x64-oldcommit.tar.gz"), b"old").unwrap();

        let downloader = Downloader::new(DownloadOptions::default()).unwrap();
        let selection = PlatformSelection::new([Os::Linux], [Arch::X64]);
        let options = DownloadOptions {
            auto_clean: true,
            verify_checksums: false,
        };
        let report = downloader
            .download_all(&identity(), &selection, &store, options, &NullSink)
            .unwrap();

        assert_eq!(report.cleaned, vec!["Code-linux-x64-oldcommit.tar.gz"]);
        assert!(tmp.path().join("Code-cli-x64.tar.gz").is_file());
        assert!(tmp.path().join("Code-linux-x64-abc123.tar.gz").is_file());
        assert!(!tmp.path().join("Code-linux-x64-oldcommit.tar.gz").exists());
    }
}
