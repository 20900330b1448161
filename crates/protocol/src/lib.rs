//! # Host Folder Protocol Library
//!
//! This crate provides the transport-independent vocabulary of the host
//! folder SFTP server: how channel-open requests are classified and how
//! out-of-band channel requests are modelled and decoded.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        SFTP (russh-sftp, external)      │
//! ├─────────────────────────────────────────┤
//! │   Subsystem negotiation  (request)      │  "subsystem" + SSH string
//! ├─────────────────────────────────────────┤
//! │   Channel classification (channel)      │  only "session"
//! ├─────────────────────────────────────────┤
//! │         SSH transport (russh)           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{classify, ChannelRequest, SFTP_SUBSYSTEM};
//!
//! assert!(classify("session").is_accept());
//!
//! let request = ChannelRequest::subsystem(SFTP_SUBSYSTEM, true);
//! assert_eq!(request.subsystem_name().unwrap(), Some("sftp"));
//! ```
//!
//! ## Modules
//!
//! - [`channel`]: Channel-type classification and rejection reasons
//! - [`request`]: Out-of-band request model and subsystem payload codec
//! - [`error`]: Error types

pub mod channel;
pub mod error;
pub mod request;

pub use channel::{classify, ChannelDecision, OpenRejection, SESSION_CHANNEL};
pub use error::{ProtocolError, Result};
pub use request::{
    decode_subsystem_name, encode_strings, ChannelRequest, LENGTH_PREFIX_SIZE, SFTP_SUBSYSTEM,
    SUBSYSTEM_REQUEST,
};
