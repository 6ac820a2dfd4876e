//! Settings snapshot for the provisioning pipeline.
//!
//! Settings live in a TOML file (default
//! `~/.config/offline-server-install/settings.toml`). A [`Settings`] value is
//! an immutable snapshot passed explicitly into the pipeline; callers re-read
//! it with [`Settings::load`] whenever an external change is signaled instead
//! of sharing mutable state.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::{Arch, Os, PlatformSelection};

/// Errors loading or persisting settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write settings at {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// One immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// Architectures to provision artifacts for.
    pub architectures: Vec<Arch>,
    /// Operating systems to provision artifacts for.
    pub operating_systems: Vec<Os>,
    /// Local cache directory for downloaded archives.
    pub target_path: Option<PathBuf>,
    /// Download server files automatically at startup.
    pub auto_update_server_file: bool,
    /// Delete files outside the keep set after a download run.
    pub auto_clean_files: bool,
    /// Verify published sha256 companions of downloaded archives.
    pub verify_checksums: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            architectures: vec![Arch::X64],
            operating_systems: vec![Os::Linux],
            target_path: None,
            auto_update_server_file: false,
            auto_clean_files: false,
            verify_checksums: false,
        }
    }
}

impl Settings {
    /// Default settings file location.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("io", "offline-server-install", "offline-server-install")
            .map_or_else(
                || PathBuf::from("settings.toml"),
                |dirs| dirs.config_dir().join("settings.toml"),
            )
    }

    /// Load a snapshot from disk. A missing file yields the defaults; a
    /// malformed file is an error rather than a silent reset.
    pub fn load(path: &Path) -> Result<Settings, SettingsError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        toml::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Persist the snapshot, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: path.display().to_string(),
                source,
            })?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|source| SettingsError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Resolved cache directory: the configured target path, or the
    /// platform data directory when none is set.
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(path) = &self.target_path {
            return path.clone();
        }
        directories::ProjectDirs::from("io", "offline-server-install", "offline-server-install")
            .map_or_else(
                || PathBuf::from("cache"),
                |dirs| dirs.data_dir().join("cache"),
            )
    }

    /// The platform selection this snapshot describes.
    pub fn selection(&self) -> PlatformSelection {
        PlatformSelection::new(
            self.operating_systems.iter().copied(),
            self.architectures.iter().copied(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(&tmp.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn save_and_reload_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/settings.toml");

        let settings = Settings {
            architectures: vec![Arch::X64, Arch::Arm64],
            operating_systems: vec![Os::Linux, Os::Darwin],
            target_path: Some(PathBuf::from("/srv/cache")),
            auto_update_server_file: true,
            auto_clean_files: true,
            verify_checksums: true,
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.toml");
        std::fs::write(&path, "architectures = 7").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(SettingsError::Parse { .. })
        ));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.toml");
        std::fs::write(&path, "auto_clean_files = true\n").unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert!(loaded.auto_clean_files);
        assert_eq!(loaded.architectures, vec![Arch::X64]);
        assert_eq!(loaded.operating_systems, vec![Os::Linux]);
    }

    #[test]
    fn cache_dir_prefers_configured_target_path() {
        let settings = Settings {
            target_path: Some(PathBuf::from("/srv/cache")),
            ..Settings::default()
        };
        assert_eq!(settings.cache_dir(), PathBuf::from("/srv/cache"));
    }

    #[test]
    fn selection_reflects_settings() {
        let settings = Settings {
            operating_systems: vec![Os::Darwin, Os::Linux],
            architectures: vec![Arch::Arm64],
            ..Settings::default()
        };
        let selection = settings.selection();
        assert_eq!(selection.oses(), &[Os::Linux, Os::Darwin]);
        assert_eq!(selection.arches(), &[Arch::Arm64]);
    }
}
