//! Server error type.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::identity::IdentityError;

/// Errors raised while serving connections.
///
/// This is also the error type of the SSH session handler, so transport
/// errors convert into it.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The host identity could not be provisioned.
    #[error("unable to create host key: {0}")]
    HostKey(#[from] IdentityError),

    /// The configuration cannot be turned into a transport configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The listening socket could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The listening socket stopped accepting connections.
    #[error("failed to accept incoming connection: {0}")]
    Accept(#[source] io::Error),

    /// The transport handshake with a client failed.
    #[error("failed to handshake with {peer}: {reason}")]
    Handshake {
        /// Remote address of the client.
        peer: SocketAddr,
        /// Transport-level reason.
        reason: String,
    },

    /// The authenticator hook failed for one connection.
    #[error("authenticator failed: {0}")]
    Auth(#[from] AuthError),

    /// The SFTP server ended with something other than a clean end of stream.
    #[error("sftp server completed with error: {0}")]
    Transfer(#[source] io::Error),

    /// Transport error from the SSH layer.
    #[error("ssh transport error: {0}")]
    Transport(#[from] russh::Error),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
