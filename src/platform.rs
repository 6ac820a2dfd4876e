//! Target platform vocabulary: operating systems, CPU architectures, and the
//! OS x arch cross product a provisioning run operates on.
//!
//! Raw `uname` output from a remote host is mapped into the same vocabulary so
//! the deployment step can match a detected platform against locally cached
//! artifacts without string juggling.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operating systems a server bundle is published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Darwin,
    Win32,
}

impl Os {
    /// Identifier used in artifact filenames and download URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Win32 => "win32",
        }
    }

    /// All supported operating systems, in filename-template order.
    pub fn all() -> [Os; 3] {
        [Os::Linux, Os::Darwin, Os::Win32]
    }

    /// Map `uname -s` output to the platform vocabulary.
    ///
    /// Returns `None` for anything unrecognized; callers must surface that
    /// explicitly rather than guess an artifact.
    pub fn from_uname(raw: &str) -> Option<Os> {
        match raw.trim() {
            "Linux" => Some(Os::Linux),
            "Darwin" => Some(Os::Darwin),
            "Windows" => Some(Os::Win32),
            _ => None,
        }
    }

    /// Parse a settings/CLI identifier.
    pub fn parse(value: &str) -> Option<Os> {
        match value.trim().to_ascii_lowercase().as_str() {
            "linux" => Some(Os::Linux),
            "darwin" | "macos" => Some(Os::Darwin),
            "win32" | "windows" => Some(Os::Win32),
            _ => None,
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architectures a server bundle is published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    Arm64,
}

impl Arch {
    /// Identifier used in artifact filenames and download URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::Arm64 => "arm64",
        }
    }

    /// All supported architectures, in filename-template order.
    pub fn all() -> [Arch; 2] {
        [Arch::X64, Arch::Arm64]
    }

    /// Map `uname -m` output to the platform vocabulary.
    pub fn from_uname(raw: &str) -> Option<Arch> {
        match raw.trim() {
            "x86_64" => Some(Arch::X64),
            "aarch64" | "arm64" => Some(Arch::Arm64),
            _ => None,
        }
    }

    /// Parse a settings/CLI identifier.
    pub fn parse(value: &str) -> Option<Arch> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x64" | "x86_64" => Some(Arch::X64),
            "arm64" | "aarch64" => Some(Arch::Arm64),
            _ => None,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from validating a platform selection.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no operating system selected; pick at least one of linux, darwin, win32")]
    NoOperatingSystems,

    #[error("no architecture selected; pick at least one of x64, arm64")]
    NoArchitectures,
}

/// The OS and architecture sets one provisioning run targets.
///
/// A run operates on the full cross product of the two sets. Both sets must be
/// non-empty; [`PlatformSelection::validate`] is called before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSelection {
    oses: Vec<Os>,
    arches: Vec<Arch>,
}

impl PlatformSelection {
    /// Build a selection, deduplicating while preserving deterministic order
    /// (declaration order of the enums, not insertion order).
    pub fn new(oses: impl IntoIterator<Item = Os>, arches: impl IntoIterator<Item = Arch>) -> Self {
        let requested_os: Vec<Os> = oses.into_iter().collect();
        let requested_arch: Vec<Arch> = arches.into_iter().collect();
        Self {
            oses: Os::all()
                .into_iter()
                .filter(|os| requested_os.contains(os))
                .collect(),
            arches: Arch::all()
                .into_iter()
                .filter(|arch| requested_arch.contains(arch))
                .collect(),
        }
    }

    /// Reject empty OS or architecture sets before any work happens.
    pub fn validate(&self) -> Result<(), SelectionError> {
        if self.oses.is_empty() {
            return Err(SelectionError::NoOperatingSystems);
        }
        if self.arches.is_empty() {
            return Err(SelectionError::NoArchitectures);
        }
        Ok(())
    }

    pub fn oses(&self) -> &[Os] {
        &self.oses
    }

    pub fn arches(&self) -> &[Arch] {
        &self.arches
    }

    /// Cross product in deterministic OS-major, arch-minor order.
    pub fn pairs(&self) -> impl Iterator<Item = (Os, Arch)> + '_ {
        self.oses
            .iter()
            .flat_map(|os| self.arches.iter().map(move |arch| (*os, *arch)))
    }

    /// Number of (os, arch) pairs in the cross product.
    pub fn pair_count(&self) -> usize {
        self.oses.len() * self.arches.len()
    }
}
