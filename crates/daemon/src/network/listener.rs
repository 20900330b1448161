//! Transport listener and serving loop.
//!
//! [`SftpServer`] owns the SSH configuration built from the host identity
//! and the configured MAC policy. [`SftpServer::serve`] accepts connections
//! until the lifecycle asks it to stop: either the last SFTP client left
//! (`Ok`) or a failure escalated under the process-wide failure policy
//! (`Err`).

use std::borrow::Cow;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use russh::server::Config as SshConfig;
use russh::{mac, MethodKind, Preferred};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::handler::SessionHandler;
use crate::auth::Authenticator;
use crate::channel::ChannelDispatcher;
use crate::config::{Config, ConfigError, FilesConfig};
use crate::error::{Result, ServerError};
use crate::identity::HostIdentity;
use crate::lifecycle::{FailurePolicy, Lifecycle, Termination};

/// Delay before answering a rejected authentication attempt.
const AUTH_REJECTION_TIME: Duration = Duration::from_secs(1);

/// Maps a configured MAC name onto the transport's algorithm name.
pub fn mac_algorithm(name: &str) -> Option<mac::Name> {
    match name {
        "hmac-sha1" => Some(mac::HMAC_SHA1),
        "hmac-sha2-256" => Some(mac::HMAC_SHA256),
        "hmac-sha2-512" => Some(mac::HMAC_SHA512),
        "hmac-sha1-etm@openssh.com" => Some(mac::HMAC_SHA1_ETM),
        "hmac-sha2-256-etm@openssh.com" => Some(mac::HMAC_SHA256_ETM),
        "hmac-sha2-512-etm@openssh.com" => Some(mac::HMAC_SHA512_ETM),
        _ => None,
    }
}

/// Builds the SSH server configuration.
pub fn ssh_config(
    identity: &HostIdentity,
    macs: &[String],
) -> std::result::Result<SshConfig, ConfigError> {
    if macs.is_empty() {
        return Err(ConfigError::NoMacs);
    }
    let macs = macs
        .iter()
        .map(|name| mac_algorithm(name).ok_or_else(|| ConfigError::UnsupportedMac(name.clone())))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(SshConfig {
        keys: vec![identity.private_key().clone()],
        preferred: Preferred {
            mac: Cow::Owned(macs),
            ..Preferred::default()
        },
        methods: (&[MethodKind::PublicKey][..]).into(),
        auth_rejection_time: AUTH_REJECTION_TIME,
        auth_rejection_time_initial: Some(Duration::ZERO),
        inactivity_timeout: None,
        ..Default::default()
    })
}

/// Binds the listening socket. Failure is fatal to startup.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Accept errors that concern a single connection rather than the socket.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
    )
}

/// The host folder SFTP server.
pub struct SftpServer {
    ssh_config: Arc<SshConfig>,
    authenticator: Arc<dyn Authenticator>,
    files: Arc<FilesConfig>,
    policy: FailurePolicy,
}

impl SftpServer {
    /// Creates a server from validated configuration.
    pub fn new(
        config: &Config,
        identity: &HostIdentity,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self> {
        let ssh_config = ssh_config(identity, &config.server.macs)?;
        Ok(Self {
            ssh_config: Arc::new(ssh_config),
            authenticator,
            files: Arc::new(config.files.clone()),
            policy: config.server.failure_policy,
        })
    }

    /// Returns the failure policy in force.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Accepts connections until the server should stop.
    ///
    /// Returns `Ok(())` once the last SFTP client has exited and the error
    /// that ended the server otherwise.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let (lifecycle, mut termination) = Lifecycle::new(self.policy);

        loop {
            tokio::select! {
                biased;

                notice = termination.recv() => {
                    return match notice {
                        Some(Termination::Fatal(err)) => Err(err),
                        Some(Termination::LastClientExited) | None => Ok(()),
                    };
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer, lifecycle.clone()),
                    Err(err) if is_transient(&err) => {
                        warn!(error = %err, "failed to accept connection, continuing");
                    }
                    Err(err) => return Err(ServerError::Accept(err)),
                },
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, lifecycle: Lifecycle) {
        info!(%peer, "Connection accepted");

        let established = Arc::new(AtomicBool::new(false));
        let dispatcher = ChannelDispatcher::new(peer, lifecycle.clone(), self.files.clone());
        let handler = SessionHandler::new(
            self.authenticator.clone(),
            dispatcher,
            established.clone(),
        );
        let config = self.ssh_config.clone();

        tokio::spawn(async move {
            let result = match russh::server::run_stream(config, stream, handler).await {
                Ok(session) => session.await,
                Err(err) => Err(err),
            };

            match result {
                Ok(()) => debug!(%peer, "connection closed"),
                Err(ServerError::Auth(err)) => {
                    warn!(%peer, error = %err, "authenticator failed, dropping connection");
                }
                Err(err) if !established.load(Ordering::Acquire) => {
                    lifecycle.fail(ServerError::Handshake {
                        peer,
                        reason: err.to_string(),
                    });
                }
                Err(err) => warn!(%peer, error = %err, "connection ended with error"),
            }
        });
    }
}
