//! Remote shell and file transfer over SSH.
//!
//! [`RemoteShell`] is the seam between the deployment state machine and the
//! wire: the real implementation speaks ssh2 (exec channels + SFTP), tests
//! script a fake. Every operation is synchronous; the session is strictly
//! sequential by construction.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::{AuthMethod, SessionConfig};

/// TCP connect timeout for session setup.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors from the SSH transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("ssh handshake failed: {0}")]
    Handshake(#[source] ssh2::Error),

    #[error("authentication failed for {username}: {source}")]
    Auth {
        username: String,
        #[source]
        source: ssh2::Error,
    },

    #[error("failed to read private key {path}: {source}")]
    ReadKey {
        path: String,
        #[source]
        source: ssh2::Error,
    },

    #[error("remote exec failed: {0}")]
    Exec(#[source] ssh2::Error),

    #[error("failed to read remote command output: {0}")]
    ExecRead(#[source] std::io::Error),

    #[error("sftp transfer to {remote} failed: {source}")]
    Sftp {
        remote: String,
        #[source]
        source: ssh2::Error,
    },

    #[error("failed to read local file {path}: {source}")]
    LocalRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write remote file {remote}: {source}")]
    RemoteWrite {
        remote: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of one remote command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout with surrounding whitespace removed, the shape `uname` and
    /// `echo $HOME` answers come in.
    pub fn trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// One remote session: command execution and file upload.
///
/// Implementations must observe strict ordering: each call sees the effects
/// of every previous call.
pub trait RemoteShell {
    fn exec(&mut self, command: &str) -> Result<ExecOutput, TransportError>;

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// Tear the session down. Idempotent; called on success and failure.
    fn close(&mut self);
}

/// ssh2-backed transport.
pub struct Ssh2Shell {
    session: ssh2::Session,
}

impl Ssh2Shell {
    /// Open a session and authenticate. No remote state is touched on
    /// failure.
    pub fn connect(config: &SessionConfig) -> Result<Ssh2Shell, TransportError> {
        use std::net::ToSocketAddrs;

        let addr = (config.host.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: config.host.clone(),
                port: config.port,
                source,
            })?
            .next()
            .ok_or_else(|| TransportError::Resolve {
                host: config.host.clone(),
                port: config.port,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no addresses resolved",
                ),
            })?;

        let tcp = TcpStream::connect_timeout(&addr, Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .map_err(|source| TransportError::Connect {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;

        let mut session = ssh2::Session::new().map_err(TransportError::Handshake)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(TransportError::Handshake)?;

        match &config.auth {
            AuthMethod::Password(password) => session
                .userauth_password(&config.username, password.as_str())
                .map_err(|source| TransportError::Auth {
                    username: config.username.clone(),
                    source,
                })?,
            AuthMethod::PrivateKey { path, passphrase } => session
                .userauth_pubkey_file(
                    &config.username,
                    None,
                    path,
                    passphrase.as_ref().map(|p| p.as_str()),
                )
                .map_err(|source| TransportError::ReadKey {
                    path: path.display().to_string(),
                    source,
                })?,
        }

        debug!(host = %config.host, user = %config.username, "ssh session established");
        Ok(Ssh2Shell { session })
    }
}

impl RemoteShell for Ssh2Shell {
    fn exec(&mut self, command: &str) -> Result<ExecOutput, TransportError> {
        let mut channel = self
            .session
            .channel_session()
            .map_err(TransportError::Exec)?;
        channel.exec(command).map_err(TransportError::Exec)?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(TransportError::ExecRead)?;
        let mut stderr = String::new();
        let _ = channel.stderr().read_to_string(&mut stderr);

        channel.wait_close().map_err(TransportError::Exec)?;
        let exit_code = channel.exit_status().map_err(TransportError::Exec)?;

        debug!(%command, exit_code, "remote command finished");
        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let sftp = self.session.sftp().map_err(|source| TransportError::Sftp {
            remote: remote.to_string(),
            source,
        })?;
        let mut remote_file =
            sftp.create(Path::new(remote))
                .map_err(|source| TransportError::Sftp {
                    remote: remote.to_string(),
                    source,
                })?;

        let mut local_file = std::fs::File::open(local).map_err(|source| {
            TransportError::LocalRead {
                path: local.display().to_string(),
                source,
            }
        })?;
        std::io::copy(&mut local_file, &mut remote_file).map_err(|source| {
            TransportError::RemoteWrite {
                remote: remote.to_string(),
                source,
            }
        })?;

        debug!(local = %local.display(), remote, "uploaded file");
        Ok(())
    }

    fn close(&mut self) {
        // Drop also disconnects; an explicit goodbye keeps the far end tidy.
        let _ = self.session.disconnect(None, "deployment finished", None);
    }
}
