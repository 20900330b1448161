//! # Host Folder SFTP Daemon Library
//!
//! This crate provides an ephemeral SFTP server that shares a host folder
//! with clients and exits on its own once the last client has left.
//!
//! ## Overview
//!
//! The daemon is a short-lived helper started on demand. It provides:
//!
//! - **Host Identity**: A fresh RSA host key generated on every start
//! - **Authentication Hook**: A pluggable policy consulted for every client key
//! - **Channel Dispatch**: Only `session` channels carrying the `sftp` subsystem
//! - **Live-Connection Accounting**: An atomic count of SFTP sessions that
//!   ends the process when it drops back to zero
//! - **Host Folder Backend**: SFTP file operations beneath a configured root
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   SftpServer (accept loop)                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  per connection:  SessionHandler (SSH handshake, Authenticator) │
//! │                                                                 │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                  ChannelDispatcher                        │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │  per channel:                                                   │
//! │  ┌─────────────────────────┐   ┌────────────────────────────┐   │
//! │  │  Request handler        │   │  File-transfer session     │   │
//! │  │  (subsystem "sftp")     │   │  (SFTP over HostFolder)    │   │
//! │  └────────────┬────────────┘   └─────────────┬──────────────┘   │
//! │               │ admit                retire  │                  │
//! │  ┌────────────▼──────────────────────────────▼──────────────┐   │
//! │  │        Lifecycle (live-connection counter)               │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use daemon::auth::AcceptAll;
//! use daemon::identity::HostIdentity;
//! use daemon::network::{bind, SftpServer};
//! use daemon::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     config.validate()?;
//!
//!     let identity = HostIdentity::generate()?;
//!     let server = SftpServer::new(&config, &identity, Arc::new(AcceptAll))?;
//!     let listener = bind(&config.listen_address(2022)).await?;
//!
//!     // Returns once the last SFTP client has disconnected.
//!     server.serve(listener).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`identity`]: Host key generation
//! - [`auth`]: Authentication hook
//! - [`network`]: Listener and SSH session handler
//! - [`channel`]: Channel dispatch, subsystem negotiation, transfer sessions
//! - [`lifecycle`]: Live-connection counter and termination
//! - [`files`]: Host folder SFTP backend
//! - [`error`]: Server error type

pub mod auth;
pub mod channel;
pub mod config;
pub mod error;
pub mod files;
pub mod identity;
pub mod lifecycle;
pub mod network;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::Config;

// Re-export error types for convenience
pub use error::{Result, ServerError};

// Re-export lifecycle types for convenience
pub use lifecycle::{FailurePolicy, Lifecycle, LiveConnectionCounter, SessionTicket, Termination};

// Re-export server types for convenience
pub use network::SftpServer;
