//! Live-connection accounting and process lifecycle.
//!
//! The server is ephemeral: it lives exactly as long as at least one client
//! has a negotiated SFTP session. Every channel gets a [`SessionTicket`]; the
//! subsystem request handler admits the ticket (incrementing the shared
//! [`LiveConnectionCounter`]) and the file-transfer session retires it
//! (decrementing). The retirement whose atomic decrement observes zero ends
//! the serving loop with [`Termination::LastClientExited`].
//!
//! Fatal runtime errors travel the same route as [`Termination::Fatal`],
//! subject to the configured [`FailurePolicy`].

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::ServerError;

/// Process-wide count of live SFTP sessions.
///
/// Only ever mutated through atomic read-modify-write operations; the
/// post-operation values they return are the only values decisions are
/// made on.
#[derive(Debug, Default)]
pub struct LiveConnectionCounter {
    count: AtomicU64,
}

impl LiveConnectionCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter, returning the new value.
    pub fn acquire(&self) -> u64 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the counter, returning the new value.
    ///
    /// Returns `None` without modifying the counter if it is already zero.
    pub fn release(&self) -> Option<u64> {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    /// Returns the current value. For reporting only.
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

const TICKET_IDLE: u8 = 0;
const TICKET_COUNTED: u8 = 1;
const TICKET_CLOSED: u8 = 2;

/// Per-channel accounting state shared by its request handler and its
/// file-transfer session.
///
/// A ticket is counted at most once and closed exactly once. Once closed it
/// can no longer be counted.
#[derive(Debug, Clone, Default)]
pub struct SessionTicket {
    state: Arc<AtomicU8>,
}

impl SessionTicket {
    /// Creates a fresh, uncounted ticket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the ticket as counted. Returns false if it was already counted or closed.
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(
                TICKET_IDLE,
                TICKET_COUNTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Closes the ticket. Returns true if it had been counted.
    fn close(&self) -> bool {
        self.state.swap(TICKET_CLOSED, Ordering::AcqRel) == TICKET_COUNTED
    }

    /// Returns true while the ticket holds a live count.
    pub fn is_counted(&self) -> bool {
        self.state.load(Ordering::Acquire) == TICKET_COUNTED
    }

    /// Returns true once the file-transfer session has ended.
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == TICKET_CLOSED
    }
}

/// How far a handshake or file-transfer failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any handshake or transfer failure terminates the whole server.
    #[default]
    Process,
    /// Failures close only the offending connection or channel.
    Connection,
}

/// Why the serving loop must stop.
#[derive(Debug)]
pub enum Termination {
    /// The last live SFTP session ended cleanly.
    LastClientExited,
    /// A failure escalated under [`FailurePolicy::Process`].
    Fatal(ServerError),
}

/// Receiving end for [`Termination`] notices, owned by the serving loop.
pub type TerminationReceiver = mpsc::UnboundedReceiver<Termination>;

/// Shared handle to the counter and termination channel.
///
/// Cheap to clone; every connection, request handler and transfer session
/// holds one.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    counter: Arc<LiveConnectionCounter>,
    policy: FailurePolicy,
    termination_tx: mpsc::UnboundedSender<Termination>,
}

impl Lifecycle {
    /// Creates a lifecycle and the receiver the serving loop waits on.
    pub fn new(policy: FailurePolicy) -> (Self, TerminationReceiver) {
        let (termination_tx, termination_rx) = mpsc::unbounded_channel();
        let lifecycle = Self {
            counter: Arc::new(LiveConnectionCounter::new()),
            policy,
            termination_tx,
        };
        (lifecycle, termination_rx)
    }

    /// Returns the shared counter.
    pub fn counter(&self) -> &LiveConnectionCounter {
        &self.counter
    }

    /// Returns the configured failure policy.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Counts a successfully negotiated SFTP subsystem on `ticket`'s channel.
    ///
    /// Returns false, leaving the counter unchanged, if the channel is
    /// already counted or its session has already ended.
    pub fn admit(&self, ticket: &SessionTicket) -> bool {
        // Increment before claiming so a concurrent retire never releases a
        // count that has not been added yet.
        let live = self.counter.acquire();
        if ticket.claim() {
            debug!(live, "sftp session counted");
            true
        } else {
            self.counter.release();
            false
        }
    }

    /// Retires `ticket` after its file-transfer session ended.
    ///
    /// If the ticket was counted, the counter is decremented; the retirement
    /// that brings it to zero requests termination.
    pub fn retire(&self, ticket: &SessionTicket) {
        if !ticket.close() {
            debug!("channel closed without a negotiated sftp session");
            return;
        }

        match self.counter.release() {
            Some(0) => {
                info!("last sftp client exited");
                self.terminate(Termination::LastClientExited);
            }
            Some(remaining) => {
                info!(remaining, "sftp client exited session");
            }
            None => {
                warn!("sftp session ended but the live-connection counter was already zero");
            }
        }
    }

    /// Handles a handshake or transfer failure according to the policy.
    pub fn fail(&self, err: ServerError) {
        match self.policy {
            FailurePolicy::Process => {
                error!(error = %err, "fatal server error");
                self.terminate(Termination::Fatal(err));
            }
            FailurePolicy::Connection => {
                warn!(error = %err, "connection failed, continuing to serve others");
            }
        }
    }

    fn terminate(&self, termination: Termination) {
        if self.termination_tx.send(termination).is_err() {
            debug!("serving loop already stopped");
        }
    }
}
