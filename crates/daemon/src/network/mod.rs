//! Network module for SSH connections.
//!
//! This module provides:
//! - The TCP listener and the serving loop that decides when to exit
//! - The per-connection SSH handler bridging transport callbacks to the
//!   channel dispatcher

pub mod handler;
pub mod listener;

pub use handler::SessionHandler;
pub use listener::{bind, mac_algorithm, ssh_config, SftpServer};
