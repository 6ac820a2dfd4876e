//! Remote directory layout and the shell commands that realize it.
//!
//! The layout is a wire contract with the editor's own remote-server
//! bootstrap: it looks for the server under
//! `<base>/cli/servers/Stable-<commit>/server` and for the CLI under
//! `<base>/<cliName>-<commit>`. Every command is built from individually
//! quoted arguments; remote paths never reach the shell unescaped.

use crate::product::ProductKind;

/// Computed install layout on the destination host for one product/commit.
///
/// Exists only inside one deployment run, after the remote home directory is
/// known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    /// `~/.vscode-server` or `~/.cursor-server`, expanded.
    pub base_dir: String,
    /// Final server subtree the archive extracts into.
    pub server_dir: String,
    /// Upload path of the server archive.
    pub server_archive: String,
    /// Upload path of the CLI archive.
    pub cli_staging: String,
    /// Final CLI directory, commit id embedded.
    pub cli_dir: String,
    /// Directory name the CLI archive extracts to before the rename.
    cli_extracted: String,
}

impl RemoteLayout {
    /// Compute the layout from the product kind, commit id, and the remote
    /// home directory reported by the host.
    pub fn compute(product: ProductKind, commit: &str, home: &str) -> RemoteLayout {
        let home = home.trim_end_matches('/');
        let base_dir = format!("{home}/{}", product.remote_base_dir_name());
        let staging_stem = match product {
            ProductKind::Code => format!("{base_dir}/vscode-server"),
            ProductKind::Cursor => format!("{base_dir}/cursor-{commit}"),
        };
        RemoteLayout {
            server_dir: format!("{base_dir}/cli/servers/Stable-{commit}/server"),
            server_archive: format!("{staging_stem}.tar.gz"),
            cli_staging: staging_stem,
            cli_dir: format!("{base_dir}/{}-{commit}", product.cli_name()),
            cli_extracted: format!("{base_dir}/{}", product.cli_name()),
            base_dir,
        }
    }

    /// `mkdir -p` commands for the base and server directories. Idempotent on
    /// the remote side.
    pub fn create_dir_commands(&self) -> [String; 2] {
        [
            command(&["mkdir", "-p", &self.base_dir]),
            command(&["mkdir", "-p", &self.server_dir]),
        ]
    }

    /// Extract the server archive into the final server subtree, dropping the
    /// archive's top-level directory component.
    pub fn extract_server_command(&self) -> String {
        command(&[
            "tar",
            "-xzf",
            &self.server_archive,
            "-C",
            &self.server_dir,
            "--strip-components",
            "1",
        ])
    }

    /// Remove the uploaded server archive.
    pub fn remove_server_archive_command(&self) -> String {
        command(&["rm", "-f", &self.server_archive])
    }

    /// Extract the CLI archive into the base directory.
    pub fn extract_cli_command(&self) -> String {
        command(&["tar", "-xzf", &self.cli_staging, "-C", &self.base_dir])
    }

    /// Remove the uploaded CLI archive.
    pub fn remove_cli_archive_command(&self) -> String {
        command(&["rm", "-f", &self.cli_staging])
    }

    /// Rename the extracted CLI directory to embed the commit id, so multiple
    /// installed versions can live side by side.
    pub fn rename_cli_command(&self) -> String {
        command(&["mv", &self.cli_extracted, &self.cli_dir])
    }
}

/// Join arguments into one shell command, quoting each as needed.
fn command(args: &[&str]) -> String {
    args.iter()
        .map(|arg| shell_words::quote(arg).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
