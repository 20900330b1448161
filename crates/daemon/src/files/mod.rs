//! Host folder served over SFTP.
//!
//! This module provides the file-access backend bound to every negotiated
//! SFTP channel:
//! - Virtual path resolution beneath the configured root
//! - File, directory and link operations on the host filesystem
//! - Read-only enforcement
//!
//! # Security
//!
//! Client paths are normalised lexically before they touch the host
//! filesystem, so `..` components cannot leave the served root. Symlinks
//! already present inside the root are followed as the host resolves them.

pub mod host_folder;
pub mod paths;

pub use host_folder::{status_for, HostFolder, MAX_READ_LEN};
pub use paths::VirtualRoot;
