//! Out-of-band request handling for one channel.
//!
//! Each accepted channel gets a dedicated task that consumes its requests in
//! arrival order. Only a `subsystem` request naming `sftp` is granted, and a
//! grant is what counts the channel as a live SFTP session.
//!
//! The task only decides. Every request travels with a oneshot that carries
//! the verdict back to the transport callback that received it, and that
//! callback sends the reply before the transport reads the next request.
//! Replies therefore always answer the request they belong to, and the
//! transport drops replies the client did not ask for.

use protocol::{ChannelRequest, SFTP_SUBSYSTEM};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::lifecycle::{Lifecycle, SessionTicket};

/// A request waiting for its verdict.
#[derive(Debug)]
pub struct PendingRequest {
    /// The request as received.
    pub request: ChannelRequest,
    verdict: oneshot::Sender<bool>,
}

impl PendingRequest {
    /// Wraps `request`, returning it with the receiver for its verdict.
    pub fn new(request: ChannelRequest) -> (Self, oneshot::Receiver<bool>) {
        let (verdict, rx) = oneshot::channel();
        (Self { request, verdict }, rx)
    }

    /// Delivers the verdict. Returns false if nobody waits for it anymore.
    pub fn answer(self, accepted: bool) -> bool {
        self.verdict.send(accepted).is_ok()
    }
}

/// Sending half of a channel's request queue.
pub type RequestSink = mpsc::UnboundedSender<PendingRequest>;

/// Receiving half of a channel's request queue.
pub type RequestStream = mpsc::UnboundedReceiver<PendingRequest>;

/// Queues `request` on `sink` and waits for its verdict.
///
/// A channel whose request handler is gone refuses everything.
pub async fn submit(sink: &RequestSink, request: ChannelRequest) -> bool {
    let (pending, verdict) = PendingRequest::new(request);
    if sink.send(pending).is_err() {
        debug!("request handler already stopped");
        return false;
    }
    verdict.await.unwrap_or(false)
}

/// Decides a single request, counting the channel if an SFTP subsystem is granted.
///
/// Never fails: malformed payloads, foreign subsystem names and every other
/// request type are simply refused.
pub fn negotiate(
    request: &ChannelRequest,
    ticket: &SessionTicket,
    lifecycle: &Lifecycle,
) -> bool {
    info!(kind = %request.kind, "Request");

    match request.subsystem_name() {
        Ok(Some(name)) => {
            info!(subsystem = name, "Subsystem");
            if name != SFTP_SUBSYSTEM {
                return false;
            }
            if lifecycle.admit(ticket) {
                true
            } else {
                warn!("sftp subsystem already negotiated or finished on this channel");
                false
            }
        }
        Ok(None) => false,
        Err(err) => {
            warn!(error = %err, "malformed subsystem request");
            false
        }
    }
}

/// Consumes `requests` until the channel goes away, answering each one in
/// arrival order.
pub async fn serve_requests(
    mut requests: RequestStream,
    ticket: SessionTicket,
    lifecycle: Lifecycle,
) {
    while let Some(pending) = requests.recv().await {
        let accepted = negotiate(&pending.request, &ticket, &lifecycle);
        if !pending.answer(accepted) {
            debug!(accepted, "verdict dropped, transport stopped waiting");
        }
    }
    debug!("request stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::FailurePolicy;
    use protocol::SUBSYSTEM_REQUEST;

    fn harness() -> (RequestSink, SessionTicket, Lifecycle) {
        let (lifecycle, _rx) = Lifecycle::new(FailurePolicy::Process);
        let ticket = SessionTicket::new();
        let (sink, stream) = mpsc::unbounded_channel();
        tokio::spawn(serve_requests(stream, ticket.clone(), lifecycle.clone()));
        (sink, ticket, lifecycle)
    }

    #[test]
    fn test_negotiate_sftp_counts_once() {
        let (lifecycle, _rx) = Lifecycle::new(FailurePolicy::Process);
        let ticket = SessionTicket::new();
        let request = ChannelRequest::subsystem("sftp", true);

        assert!(negotiate(&request, &ticket, &lifecycle));
        assert_eq!(lifecycle.counter().current(), 1);

        assert!(!negotiate(&request, &ticket, &lifecycle));
        assert_eq!(lifecycle.counter().current(), 1);
    }

    #[test]
    fn test_negotiate_rejects_other_subsystems() {
        let (lifecycle, _rx) = Lifecycle::new(FailurePolicy::Process);
        let ticket = SessionTicket::new();

        for name in ["SFTP", "sftp ", "scp", ""] {
            let request = ChannelRequest::subsystem(name, true);
            assert!(!negotiate(&request, &ticket, &lifecycle));
        }
        assert_eq!(lifecycle.counter().current(), 0);
        assert!(!ticket.is_counted());
    }

    #[test]
    fn test_negotiate_rejects_non_subsystem_requests() {
        let (lifecycle, _rx) = Lifecycle::new(FailurePolicy::Process);
        let ticket = SessionTicket::new();

        for request in [
            ChannelRequest::shell(true),
            ChannelRequest::exec(b"sftp", true),
            ChannelRequest::env("SUBSYSTEM", "sftp", true),
            ChannelRequest::pty("xterm", 80, 24, true),
        ] {
            assert!(!negotiate(&request, &ticket, &lifecycle));
        }
        assert_eq!(lifecycle.counter().current(), 0);
    }

    #[test]
    fn test_negotiate_malformed_payload_is_rejected() {
        let (lifecycle, _rx) = Lifecycle::new(FailurePolicy::Process);
        let ticket = SessionTicket::new();
        let request = ChannelRequest::new(SUBSYSTEM_REQUEST, true, vec![0, 0, 0, 40, b's']);

        assert!(!negotiate(&request, &ticket, &lifecycle));
        assert_eq!(lifecycle.counter().current(), 0);
    }

    #[tokio::test]
    async fn test_wrong_name_then_sftp_on_same_channel() {
        let (sink, ticket, lifecycle) = harness();

        assert!(!submit(&sink, ChannelRequest::subsystem("shell", true)).await);
        assert_eq!(lifecycle.counter().current(), 0);

        assert!(submit(&sink, ChannelRequest::subsystem("sftp", true)).await);
        assert_eq!(lifecycle.counter().current(), 1);
        assert!(ticket.is_counted());
    }

    #[tokio::test]
    async fn test_env_requests_do_not_disturb_subsystem_verdict() {
        let (sink, _ticket, lifecycle) = harness();

        assert!(!submit(&sink, ChannelRequest::env("LANG", "C.UTF-8", false)).await);
        assert!(!submit(&sink, ChannelRequest::env("LC_ALL", "C", false)).await);
        assert!(submit(&sink, ChannelRequest::subsystem("sftp", true)).await);
        assert_eq!(lifecycle.counter().current(), 1);
    }

    #[tokio::test]
    async fn test_verdicts_follow_request_order() {
        let (sink, _ticket, _lifecycle) = harness();

        let mut verdicts = Vec::new();
        for request in [
            ChannelRequest::pty("vt100", 80, 24, true),
            ChannelRequest::subsystem("sftp", true),
            ChannelRequest::exec(b"ls", true),
        ] {
            let (pending, verdict) = PendingRequest::new(request);
            sink.send(pending).unwrap();
            verdicts.push(verdict);
        }

        let mut answers = Vec::new();
        for verdict in verdicts {
            answers.push(verdict.await.unwrap());
        }
        assert_eq!(answers, vec![false, true, false]);
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_stop_handler() {
        let (sink, _ticket, lifecycle) = harness();

        let (pending, verdict) = PendingRequest::new(ChannelRequest::shell(true));
        drop(verdict);
        sink.send(pending).unwrap();

        assert!(submit(&sink, ChannelRequest::subsystem("sftp", true)).await);
        assert_eq!(lifecycle.counter().current(), 1);
    }

    #[tokio::test]
    async fn test_submit_after_handler_stopped_is_refused() {
        let (sink, stream) = mpsc::unbounded_channel();
        drop(stream);

        assert!(!submit(&sink, ChannelRequest::subsystem("sftp", true)).await);
    }
}
