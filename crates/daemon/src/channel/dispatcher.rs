//! Channel dispatch for one transport session.
//!
//! The dispatcher classifies every channel-open request. Accepted `session`
//! channels get two independent tasks: one deciding the channel's
//! out-of-band requests and one serving SFTP over its byte stream. The two
//! share a [`SessionTicket`] so the channel is counted and released at most
//! once.

use std::net::SocketAddr;
use std::sync::Arc;

use protocol::{classify, ChannelDecision};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::requests::{serve_requests, RequestSink};
use super::transfer::run_transfer;
use crate::config::FilesConfig;
use crate::files::HostFolder;
use crate::lifecycle::{Lifecycle, SessionTicket};

/// Spawns request handlers and file-transfer sessions for a session's channels.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    peer: SocketAddr,
    lifecycle: Lifecycle,
    files: Arc<FilesConfig>,
}

impl ChannelDispatcher {
    /// Creates a dispatcher for the session with `peer`.
    pub fn new(peer: SocketAddr, lifecycle: Lifecycle, files: Arc<FilesConfig>) -> Self {
        Self {
            peer,
            lifecycle,
            files,
        }
    }

    /// Returns the remote address of the session.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the shared lifecycle.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Decides whether a channel of `channel_type` is served.
    pub fn classify(&self, channel_type: &str) -> ChannelDecision {
        info!(peer = %self.peer, channel_type, "Incoming channel");
        let decision = classify(channel_type);
        if let ChannelDecision::Reject(reason) = decision {
            debug!(peer = %self.peer, channel_type, %reason, "rejecting channel");
        }
        decision
    }

    /// Starts serving an accepted channel.
    ///
    /// `stream` is the channel's byte stream. Returns the sink the transport
    /// submits the channel's out-of-band requests to; dropping it ends the
    /// request handler.
    pub fn accept<S>(&self, stream: S) -> RequestSink
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ticket = SessionTicket::new();
        let (sink, requests) = mpsc::unbounded_channel();

        tokio::spawn(serve_requests(
            requests,
            ticket.clone(),
            self.lifecycle.clone(),
        ));

        let backend = HostFolder::new(self.files.root.clone(), self.files.read_only);
        tokio::spawn(run_transfer(
            stream,
            backend,
            ticket,
            self.lifecycle.clone(),
        ));

        sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::requests::submit;
    use crate::lifecycle::{FailurePolicy, Termination};
    use protocol::{ChannelRequest, OpenRejection};
    use std::time::Duration;
    use tempfile::TempDir;

    fn dispatcher(dir: &TempDir) -> (ChannelDispatcher, crate::lifecycle::TerminationReceiver) {
        let (lifecycle, termination) = Lifecycle::new(FailurePolicy::Process);
        let files = FilesConfig {
            root: dir.path().to_path_buf(),
            read_only: false,
        };
        let dispatcher = ChannelDispatcher::new(
            "127.0.0.1:50000".parse().unwrap(),
            lifecycle,
            Arc::new(files),
        );
        (dispatcher, termination)
    }

    #[test]
    fn test_classify_session_and_others() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, _termination) = dispatcher(&dir);

        assert_eq!(dispatcher.classify("session"), ChannelDecision::Accept);
        for kind in ["direct-tcpip", "x11", "forwarded-tcpip", "auth-agent@openssh.com"] {
            assert_eq!(
                dispatcher.classify(kind),
                ChannelDecision::Reject(OpenRejection::UnknownChannelType)
            );
        }
        assert_eq!(dispatcher.lifecycle().counter().current(), 0);
    }

    #[tokio::test]
    async fn test_accepted_channel_counts_and_releases() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, mut termination) = dispatcher(&dir);
        let (client, server) = tokio::io::duplex(4096);

        let sink = dispatcher.accept(server);
        assert!(submit(&sink, ChannelRequest::subsystem("sftp", true)).await);
        assert_eq!(dispatcher.lifecycle().counter().current(), 1);

        drop(client);
        let notice = tokio::time::timeout(Duration::from_secs(5), termination.recv())
            .await
            .unwrap();
        assert!(matches!(notice, Some(Termination::LastClientExited)));
        assert_eq!(dispatcher.lifecycle().counter().current(), 0);
    }

    #[tokio::test]
    async fn test_channel_without_subsystem_does_not_terminate() {
        let dir = TempDir::new().unwrap();
        let (dispatcher, mut termination) = dispatcher(&dir);

        let (keep_client, keep_server) = tokio::io::duplex(4096);
        let keep = dispatcher.accept(keep_server);
        assert!(submit(&keep, ChannelRequest::subsystem("sftp", true)).await);

        let (idle_client, idle_server) = tokio::io::duplex(4096);
        let _idle = dispatcher.accept(idle_server);
        drop(idle_client);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(termination.try_recv().is_err());
        assert_eq!(dispatcher.lifecycle().counter().current(), 1);

        drop(keep_client);
    }
}
