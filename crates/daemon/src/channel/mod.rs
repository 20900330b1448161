//! Logical channel handling.
//!
//! This module provides everything that happens after a transport session
//! is authenticated:
//! - Channel classification and fan-out ([`dispatcher`])
//! - Subsystem negotiation and reply discipline ([`requests`])
//! - The SFTP session bound to the channel stream ([`transfer`])

pub mod dispatcher;
pub mod requests;
pub mod transfer;

pub use dispatcher::ChannelDispatcher;
pub use requests::{negotiate, serve_requests, submit, PendingRequest, RequestSink, RequestStream};
pub use transfer::{run_transfer, MonitoredStream, StreamEnd};
