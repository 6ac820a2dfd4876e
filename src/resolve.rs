//! Artifact resolution: product identity + platform selection in, download
//! URLs and cache filenames out.
//!
//! This is a pure computation with no network or filesystem access. The
//! filename templates are a wire contract shared with the remote host's
//! install layout and must stay bit-exact:
//!
//! - server archive: `<shortName>-<os>-<arch>-<commitId>.tar.gz`
//! - CLI archive:    `<shortName>-cli-<arch>.tar.gz` (one per arch, OS-free)

use thiserror::Error;

use crate::platform::{Arch, Os, PlatformSelection};
use crate::product::{ProductIdentity, ProductKind};

/// Download base for VS Code stable server builds.
const CODE_DOWNLOAD_BASE: &str = "https://vscode.download.prss.microsoft.com/dbazure/download/stable";

/// Download base for Cursor remote releases.
const CURSOR_DOWNLOAD_BASE: &str = "https://cursor.blob.core.windows.net/remote-releases";

/// Errors from artifact resolution.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("unsupported product '{short_name}'; expected one of: Code, Cursor")]
    UnsupportedProduct { short_name: String },
}

/// What kind of archive an artifact is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// The remote server payload, one archive per (os, arch) pair.
    Server,
    /// The CLI bundle, one archive per arch.
    Cli,
}

/// One downloadable archive: where it lives upstream and what it is called in
/// the local cache. Derived deterministically per run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub kind: ArtifactKind,
    /// `Some` for server archives; `None` for the OS-independent CLI bundle.
    pub os: Option<Os>,
    pub arch: Arch,
    pub remote_url: String,
    pub local_file_name: String,
}

/// Compute the descriptors for one artifact kind across a platform selection.
///
/// Server resolution yields exactly |OS| x |arch| descriptors in OS-major,
/// arch-minor order; CLI resolution yields one descriptor per arch. Fails only
/// for a product short name outside the known kinds.
pub fn resolve(
    identity: &ProductIdentity,
    selection: &PlatformSelection,
    kind: ArtifactKind,
) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
    let product = identity
        .kind()
        .ok_or_else(|| ResolveError::UnsupportedProduct {
            short_name: identity.short_name.clone(),
        })?;

    let descriptors = match kind {
        ArtifactKind::Server => selection
            .pairs()
            .map(|(os, arch)| server_descriptor(product, identity, os, arch))
            .collect(),
        ArtifactKind::Cli => selection
            .arches()
            .iter()
            .map(|arch| cli_descriptor(product, identity, *arch))
            .collect(),
    };
    Ok(descriptors)
}

/// Server and CLI descriptors for the whole selection, servers first.
pub fn resolve_all(
    identity: &ProductIdentity,
    selection: &PlatformSelection,
) -> Result<Vec<ArtifactDescriptor>, ResolveError> {
    let mut descriptors = resolve(identity, selection, ArtifactKind::Server)?;
    descriptors.extend(resolve(identity, selection, ArtifactKind::Cli)?);
    Ok(descriptors)
}

/// The cache filename of the server archive for one (os, arch) pair.
pub fn server_file_name(identity: &ProductIdentity, os: Os, arch: Arch) -> String {
    format!(
        "{}-{}-{}-{}.tar.gz",
        identity.short_name, os, arch, identity.commit
    )
}

/// The cache filename of the CLI archive for one arch.
pub fn cli_file_name(identity: &ProductIdentity, arch: Arch) -> String {
    format!("{}-cli-{}.tar.gz", identity.short_name, arch)
}

fn server_descriptor(
    product: ProductKind,
    identity: &ProductIdentity,
    os: Os,
    arch: Arch,
) -> ArtifactDescriptor {
    let remote_url = match product {
        ProductKind::Code => format!(
            "{CODE_DOWNLOAD_BASE}/{}/vscode-server-{}-{}.tar.gz",
            identity.commit, os, arch
        ),
        ProductKind::Cursor => format!(
            "{CURSOR_DOWNLOAD_BASE}/{}-{}/vscode-reh-{}-{}.tar.gz",
            identity.version, identity.commit, os, arch
        ),
    };
    ArtifactDescriptor {
        kind: ArtifactKind::Server,
        os: Some(os),
        arch,
        remote_url,
        local_file_name: server_file_name(identity, os, arch),
    }
}

fn cli_descriptor(product: ProductKind, identity: &ProductIdentity, arch: Arch) -> ArtifactDescriptor {
    // CLI builds are statically linked and published once per arch; the
    // archive works on any of the supported server operating systems.
    let remote_url = match product {
        ProductKind::Code => format!(
            "{CODE_DOWNLOAD_BASE}/{}/vscode_cli_alpine_{}_cli.tar.gz",
            identity.commit, arch
        ),
        ProductKind::Cursor => format!(
            "{CURSOR_DOWNLOAD_BASE}/{}-{}/cli-alpine-{}.tar.gz",
            identity.version, identity.commit, arch
        ),
    };
    ArtifactDescriptor {
        kind: ArtifactKind::Cli,
        os: None,
        arch,
        remote_url,
        local_file_name: cli_file_name(identity, arch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn code_identity() -> ProductIdentity {
        ProductIdentity {
            short_name: "Code".into(),
            version: "1.96.0".into(),
            commit: "abc123".into(),
        }
    }

    fn cursor_identity() -> ProductIdentity {
        ProductIdentity {
            short_name: "Cursor".into(),
            version: "0.44.5".into(),
            commit: "fee1dead".into(),
        }
    }

    #[test]
    fn server_filenames_are_bit_exact() {
        let descriptors = resolve(
            &code_identity(),
            &PlatformSelection::new([Os::Linux], [Arch::X64]),
            ArtifactKind::Server,
        )
        .unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].local_file_name, "Code-linux-x64-abc123.tar.gz");
        assert_eq!(
            descriptors[0].remote_url,
            "https://vscode.download.prss.microsoft.com/dbazure/download/stable/abc123/vscode-server-linux-x64.tar.gz"
        );
    }

    #[test]
    fn cursor_server_url_embeds_version_and_commit() {
        let descriptors = resolve(
            &cursor_identity(),
            &PlatformSelection::new([Os::Darwin], [Arch::Arm64]),
            ArtifactKind::Server,
        )
        .unwrap();
        assert_eq!(
            descriptors[0].remote_url,
            "https://cursor.blob.core.windows.net/remote-releases/0.44.5-fee1dead/vscode-reh-darwin-arm64.tar.gz"
        );
        assert_eq!(
            descriptors[0].local_file_name,
            "Cursor-darwin-arm64-fee1dead.tar.gz"
        );
    }

    #[test]
    fn cli_descriptors_are_per_arch_and_os_free() {
        let selection = PlatformSelection::new([Os::Linux, Os::Darwin, Os::Win32], [Arch::X64, Arch::Arm64]);
        let descriptors = resolve(&code_identity(), &selection, ArtifactKind::Cli).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors.iter().all(|d| d.os.is_none()));
        assert_eq!(descriptors[0].local_file_name, "Code-cli-x64.tar.gz");
        assert_eq!(descriptors[1].local_file_name, "Code-cli-arm64.tar.gz");
    }

    #[test]
    fn unsupported_product_is_rejected_without_io() {
        let identity = ProductIdentity {
            short_name: "Unknown".into(),
            version: "1.0.0".into(),
            commit: "abc".into(),
        };
        let err = resolve(
            &identity,
            &PlatformSelection::new([Os::Linux], [Arch::X64]),
            ArtifactKind::Server,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnsupportedProduct {
                short_name: "Unknown".into()
            }
        );
    }

    #[test]
    fn resolve_all_has_no_duplicate_filenames() {
        let selection = PlatformSelection::new(Os::all(), Arch::all());
        let descriptors = resolve_all(&cursor_identity(), &selection).unwrap();
        // 3 OS x 2 arch servers + 2 CLI bundles
        assert_eq!(descriptors.len(), 8);
        let names: HashSet<_> = descriptors.iter().map(|d| &d.local_file_name).collect();
        assert_eq!(names.len(), descriptors.len());
    }

    proptest! {
        /// For every non-empty selection, server resolution produces exactly
        /// |OS| x |arch| descriptors with pairwise-distinct local filenames.
        #[test]
        fn server_cross_product_property(
            os_mask in 1u8..8,
            arch_mask in 1u8..4,
        ) {
            let oses: Vec<Os> = Os::all()
                .into_iter()
                .enumerate()
                .filter(|(i, _)| os_mask & (1 << i) != 0)
                .map(|(_, os)| os)
                .collect();
            let arches: Vec<Arch> = Arch::all()
                .into_iter()
                .enumerate()
                .filter(|(i, _)| arch_mask & (1 << i) != 0)
                .map(|(_, arch)| arch)
                .collect();

            let selection = PlatformSelection::new(oses.clone(), arches.clone());
            let descriptors = resolve(&code_identity(), &selection, ArtifactKind::Server).unwrap();

            prop_assert_eq!(descriptors.len(), oses.len() * arches.len());
            let names: HashSet<_> = descriptors.iter().map(|d| d.local_file_name.clone()).collect();
            prop_assert_eq!(names.len(), descriptors.len());
        }
    }
}
