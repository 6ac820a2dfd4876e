//! Tagged requests and the single dispatch point.
//!
//! Every operation the tool performs is a [`Request`] value handled by
//! [`Dispatcher::handle`]. One exhaustive match is the only place requests
//! meet the pipeline, so adding a request variant without wiring it up is a
//! compile error.

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::cache::{CacheError, CacheStore, FileReport};
use crate::deploy::{DeployError, DeployOutcome, DeploymentSession, SessionConfig};
use crate::download::{
    DownloadError, DownloadOptions, DownloadReport, Downloader,
};
use crate::platform::{Arch, Os};
use crate::product::ProductIdentity;
use crate::resolve::{ResolveError, resolve_all};
use crate::settings::{Settings, SettingsError};
use crate::status::StatusSink;

/// Errors surfaced by request handling.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

/// One operation request.
pub enum Request {
    /// Fill the cache for the current selection, then clean if configured.
    Download,
    /// Report which artifacts of the selection are cached.
    Check,
    /// Delete every cached artifact of the selection.
    DeleteFiles,
    /// Point the cache at a different directory.
    UpdateTargetPath(PathBuf),
    /// Replace the architecture selection.
    UpdateArchitectures(Vec<Arch>),
    /// Replace the operating system selection.
    UpdateOperatingSystems(Vec<Os>),
    /// Provision a remote host from the cache.
    Deploy(SessionConfig),
}

/// Typed result of a handled request.
pub enum Response {
    Download(DownloadReport),
    Check(FileReport),
    Deleted(usize),
    SettingsUpdated(Settings),
    Deployed(DeployOutcome),
}

/// Owns the settings snapshot and product identity for a run of requests.
///
/// Settings mutations persist to disk and replace the in-memory snapshot, so
/// later requests in the same run observe them.
pub struct Dispatcher {
    settings: Settings,
    settings_path: PathBuf,
    identity: ProductIdentity,
}

impl Dispatcher {
    pub fn new(settings: Settings, settings_path: PathBuf, identity: ProductIdentity) -> Self {
        Self {
            settings,
            settings_path,
            identity,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn store(&self) -> CacheStore {
        CacheStore::new(self.settings.cache_dir())
    }

    pub fn handle(
        &mut self,
        request: Request,
        sink: &dyn StatusSink,
    ) -> Result<Response, RequestError> {
        match request {
            Request::Download => {
                let options = DownloadOptions {
                    auto_clean: self.settings.auto_clean_files,
                    verify_checksums: self.settings.verify_checksums,
                };
                let store = self.store();
                std::fs::create_dir_all(store.dir()).map_err(|source| {
                    DownloadError::Filesystem {
                        file_name: store.dir().display().to_string(),
                        source,
                    }
                })?;
                let downloader = Downloader::new(options)?;
                let report = downloader.download_all(
                    &self.identity,
                    &self.settings.selection(),
                    &store,
                    options,
                    sink,
                )?;
                Ok(Response::Download(report))
            }
            Request::Check => {
                let descriptors = resolve_all(&self.identity, &self.settings.selection())?;
                Ok(Response::Check(self.store().check_files(&descriptors)))
            }
            Request::DeleteFiles => {
                let descriptors = resolve_all(&self.identity, &self.settings.selection())?;
                let deleted = self.store().purge(&descriptors, sink)?;
                Ok(Response::Deleted(deleted))
            }
            Request::UpdateTargetPath(path) => {
                self.update(sink, |settings| settings.target_path = Some(path))
            }
            Request::UpdateArchitectures(arches) => {
                self.update(sink, |settings| settings.architectures = arches)
            }
            Request::UpdateOperatingSystems(oses) => {
                self.update(sink, |settings| settings.operating_systems = oses)
            }
            Request::Deploy(config) => {
                let mut session = DeploymentSession::new(self.identity.clone(), self.store());
                let outcome = session.run(config, sink)?;
                Ok(Response::Deployed(outcome))
            }
        }
    }

    /// Apply a settings mutation, persist it, and swap in the new snapshot.
    fn update(
        &mut self,
        sink: &dyn StatusSink,
        apply: impl FnOnce(&mut Settings),
    ) -> Result<Response, RequestError> {
        let mut next = self.settings.clone();
        apply(&mut next);
        next.save(&self.settings_path)?;
        info!(path = %self.settings_path.display(), "settings updated");
        sink.status("settings updated");
        self.settings = next;
        Ok(Response::SettingsUpdated(self.settings.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::NullSink;
    use tempfile::TempDir;

    fn identity() -> ProductIdentity {
        ProductIdentity {
            short_name: "Code".into(),
            version: "1.96.0".into(),
            commit: "abc123".into(),
        }
    }

    fn dispatcher(tmp: &TempDir) -> Dispatcher {
        let settings = Settings {
            target_path: Some(tmp.path().join("cache")),
            ..Settings::default()
        };
        std::fs::create_dir_all(tmp.path().join("cache")).unwrap();
        Dispatcher::new(settings, tmp.path().join("settings.toml"), identity())
    }

    #[test]
    fn check_reports_cached_and_missing() {
        let tmp = TempDir::new().unwrap();
        let mut dispatcher = dispatcher(&tmp);
        std::fs::write(
            tmp.path().join("cache/Code-linux-x64-abc123.tar.gz"),
            b"srv",
        )
        .unwrap();

        let response = dispatcher.handle(Request::Check, &NullSink).unwrap();
        let Response::Check(report) = response else {
            panic!("expected a check response");
        };
        assert_eq!(report.existing, vec!["Code-linux-x64-abc123.tar.gz"]);
        assert_eq!(report.missing, vec!["Code-cli-x64.tar.gz"]);
    }

    #[test]
    fn delete_files_purges_selection_artifacts_only() {
        let tmp = TempDir::new().unwrap();
        let mut dispatcher = dispatcher(&tmp);
        std::fs::write(
            tmp.path().join("cache/Code-linux-x64-abc123.tar.gz"),
            b"srv",
        )
        .unwrap();
        std::fs::write(tmp.path().join("cache/unrelated.tar.gz"), b"x").unwrap();

        let response = dispatcher.handle(Request::DeleteFiles, &NullSink).unwrap();
        let Response::Deleted(count) = response else {
            panic!("expected a deleted response");
        };
        assert_eq!(count, 1);
        assert!(tmp.path().join("cache/unrelated.tar.gz").is_file());
    }

    #[test]
    fn settings_updates_persist_and_apply_to_later_requests() {
        let tmp = TempDir::new().unwrap();
        let mut dispatcher = dispatcher(&tmp);

        dispatcher
            .handle(
                Request::UpdateArchitectures(vec![Arch::Arm64]),
                &NullSink,
            )
            .unwrap();

        let reloaded = Settings::load(&tmp.path().join("settings.toml")).unwrap();
        assert_eq!(reloaded.architectures, vec![Arch::Arm64]);

        // The in-memory snapshot changed too: check now resolves arm64.
        let Response::Check(report) = dispatcher.handle(Request::Check, &NullSink).unwrap() else {
            panic!("expected a check response");
        };
        assert!(
            report
                .missing
                .contains(&"Code-linux-arm64-abc123.tar.gz".to_string())
        );
    }

    #[test]
    fn update_target_path_moves_the_cache() {
        let tmp = TempDir::new().unwrap();
        let mut dispatcher = dispatcher(&tmp);
        let other = tmp.path().join("elsewhere");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join("Code-linux-x64-abc123.tar.gz"), b"srv").unwrap();

        dispatcher
            .handle(Request::UpdateTargetPath(other.clone()), &NullSink)
            .unwrap();

        let Response::Check(report) = dispatcher.handle(Request::Check, &NullSink).unwrap() else {
            panic!("expected a check response");
        };
        assert_eq!(report.existing, vec!["Code-linux-x64-abc123.tar.gz"]);
    }
}
