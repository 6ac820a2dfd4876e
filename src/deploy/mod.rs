//! Remote deployment session.
//!
//! One session is one end-to-end connect -> detect -> provision -> disconnect
//! cycle against a single host:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Provisioning -> Closed
//!                     \______________\_____________\--> Failed
//! ```
//!
//! Steps are strictly ordered; each remote command or transfer observes the
//! completion of the previous one. A failure anywhere moves the session to
//! `Failed` and propagates a typed error, but teardown is guaranteed on both
//! paths. Nothing is retried; callers re-invoke the whole session.

pub mod layout;
pub mod transport;

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use zeroize::Zeroizing;

use crate::cache::CacheStore;
use crate::platform::{Arch, Os};
use crate::product::{ProductIdentity, ProductKind};
use crate::resolve::{cli_file_name, server_file_name};
use crate::status::StatusSink;

pub use layout::RemoteLayout;
pub use transport::{ExecOutput, RemoteShell, Ssh2Shell, TransportError};

/// Errors from a deployment session.
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("connection failed: {0}")]
    Connection(#[source] TransportError),

    #[error("unsupported product '{short_name}'; expected one of: Code, Cursor")]
    UnsupportedProduct { short_name: String },

    #[error("remote platform detection failed for {what}: unrecognized '{raw}'")]
    UnknownPlatform { what: &'static str, raw: String },

    #[error("server artifact {file_name} is missing from the local cache; download it first")]
    MissingArtifact { file_name: String },

    #[error("transfer of {file_name} failed: {source}")]
    Transfer {
        file_name: String,
        #[source]
        source: TransportError,
    },

    #[error("remote step '{step}' failed with exit code {exit_code}: {stderr}")]
    RemoteCommand {
        step: &'static str,
        exit_code: i32,
        stderr: String,
    },

    #[error("remote step '{step}' failed: {source}")]
    RemoteExec {
        step: &'static str,
        #[source]
        source: TransportError,
    },
}

/// How to authenticate the SSH session. Credential material is zeroized on
/// drop and only lives for the duration of one session.
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<Zeroizing<String>>,
    },
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
            AuthMethod::PrivateKey { path, .. } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

/// Connection parameters for one deployment session. Never persisted.
#[derive(Debug)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
}

/// Lifecycle of a deployment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Provisioning,
    Closed,
    Failed,
}

/// Result of a completed deployment.
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub os: Os,
    pub arch: Arch,
    pub layout: RemoteLayout,
}

/// What the remote host reported about itself.
#[derive(Debug, Clone)]
struct DetectedPlatform {
    home: String,
    os: Option<Os>,
    arch: Option<Arch>,
    raw_os: String,
    raw_arch: String,
}

/// One remote deployment run against a single host.
pub struct DeploymentSession {
    identity: ProductIdentity,
    cache: CacheStore,
    state: SessionState,
}

impl DeploymentSession {
    pub fn new(identity: ProductIdentity, cache: CacheStore) -> Self {
        Self {
            identity,
            cache,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Connect over SSH and run the full provisioning sequence.
    ///
    /// The session config (and its credential) is consumed and dropped when
    /// the run ends, regardless of outcome.
    pub fn run(
        &mut self,
        config: SessionConfig,
        sink: &dyn StatusSink,
    ) -> Result<DeployOutcome, DeployError> {
        self.state = SessionState::Connecting;
        sink.status(&format!("connecting to {}...", config.host));

        let mut shell = match Ssh2Shell::connect(&config) {
            Ok(shell) => shell,
            Err(err) => {
                self.state = SessionState::Failed;
                let err = DeployError::Connection(err);
                sink.error(&err.to_string());
                return Err(err);
            }
        };

        self.run_with(&mut shell, sink)
    }

    /// Run the post-connect sequence over an already-open shell.
    ///
    /// Teardown is guaranteed: `close` is called on the shell whether
    /// provisioning succeeds or fails.
    pub fn run_with<S: RemoteShell>(
        &mut self,
        shell: &mut S,
        sink: &dyn StatusSink,
    ) -> Result<DeployOutcome, DeployError> {
        self.state = SessionState::Connected;
        sink.status("connected, detecting remote platform...");

        let result = self.provision(shell, sink);
        shell.close();

        match &result {
            Ok(outcome) => {
                self.state = SessionState::Closed;
                sink.status(&format!(
                    "deployment complete: {}-{} installed under {}",
                    outcome.os, outcome.arch, outcome.layout.base_dir
                ));
            }
            Err(err) => {
                self.state = SessionState::Failed;
                sink.error(&format!("deployment failed: {err}"));
            }
        }
        result
    }

    fn provision<S: RemoteShell>(
        &mut self,
        shell: &mut S,
        sink: &dyn StatusSink,
    ) -> Result<DeployOutcome, DeployError> {
        let product = self.product()?;
        let detected = self.detect(shell)?;

        // Step 1: the layout needs a recognized platform; an unknown uname
        // fails here instead of deploying the wrong artifact.
        let os = detected.os.ok_or_else(|| DeployError::UnknownPlatform {
            what: "operating system",
            raw: detected.raw_os.clone(),
        })?;
        let arch = detected.arch.ok_or_else(|| DeployError::UnknownPlatform {
            what: "architecture",
            raw: detected.raw_arch.clone(),
        })?;
        self.state = SessionState::Provisioning;
        sink.status(&format!("remote platform: {os}-{arch}"));

        let layout = RemoteLayout::compute(product, &self.identity.commit, &detected.home);

        // Step 2: directories, idempotent on the remote side.
        for command in layout.create_dir_commands() {
            self.run_step(shell, "create remote directories", &command)?;
        }

        // Step 3: the server artifact must already be cached; downloading
        // inline is out of scope for the deployment step.
        let server_name = server_file_name(&self.identity, os, arch);
        if !self.cache.exists(&server_name) {
            return Err(DeployError::MissingArtifact {
                file_name: server_name,
            });
        }

        // Step 4: server payload to its staging path.
        sink.status(&format!("uploading {server_name}..."));
        self.upload(shell, &server_name, &layout.server_archive)?;

        // Step 5: CLI bundle, same missing-artifact contract.
        if product.requires_cli() {
            let cli_name = cli_file_name(&self.identity, arch);
            if !self.cache.exists(&cli_name) {
                return Err(DeployError::MissingArtifact {
                    file_name: cli_name,
                });
            }
            sink.status(&format!("uploading {cli_name}..."));
            self.upload(shell, &cli_name, &layout.cli_staging)?;
        }

        // Step 6: extract and arrange, one discrete command per step.
        sink.status("extracting server archive...");
        self.run_step(shell, "extract server archive", &layout.extract_server_command())?;
        self.run_step(
            shell,
            "remove server archive",
            &layout.remove_server_archive_command(),
        )?;

        if product.requires_cli() {
            sink.status("extracting cli archive...");
            self.run_step(shell, "extract cli archive", &layout.extract_cli_command())?;
            self.run_step(
                shell,
                "remove cli archive",
                &layout.remove_cli_archive_command(),
            )?;
            self.run_step(shell, "rename cli directory", &layout.rename_cli_command())?;
        }

        info!(os = %os, arch = %arch, base = %layout.base_dir, "provisioning finished");
        Ok(DeployOutcome { os, arch, layout })
    }

    fn product(&self) -> Result<ProductKind, DeployError> {
        self.identity
            .kind()
            .ok_or_else(|| DeployError::UnsupportedProduct {
                short_name: self.identity.short_name.clone(),
            })
    }

    /// Two introspection commands plus the home directory, mapped into the
    /// platform vocabulary. Unrecognized values are carried as `None`.
    fn detect<S: RemoteShell>(&self, shell: &mut S) -> Result<DetectedPlatform, DeployError> {
        let home = self
            .run_step(shell, "detect home directory", "echo $HOME")?
            .trimmed()
            .to_string();
        let raw_os = self
            .run_step(shell, "detect operating system", "uname -s")?
            .trimmed()
            .to_string();
        let raw_arch = self
            .run_step(shell, "detect architecture", "uname -m")?
            .trimmed()
            .to_string();

        Ok(DetectedPlatform {
            os: Os::from_uname(&raw_os),
            arch: Arch::from_uname(&raw_arch),
            home,
            raw_os,
            raw_arch,
        })
    }

    fn run_step<S: RemoteShell>(
        &self,
        shell: &mut S,
        step: &'static str,
        command: &str,
    ) -> Result<ExecOutput, DeployError> {
        let output = shell
            .exec(command)
            .map_err(|source| DeployError::RemoteExec { step, source })?;
        if !output.success() {
            return Err(DeployError::RemoteCommand {
                step,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn upload<S: RemoteShell>(
        &self,
        shell: &mut S,
        file_name: &str,
        remote: &str,
    ) -> Result<(), DeployError> {
        shell
            .upload(&self.cache.path_of(file_name), remote)
            .map_err(|source| DeployError::Transfer {
                file_name: file_name.to_string(),
                source,
            })
    }
}
