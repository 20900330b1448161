//! Logical channel classification.
//!
//! Clients open typed channels inside a transport session. Only the
//! `session` type carries file-transfer work; every other type is refused
//! with the standard "unknown channel type" reason.

use std::fmt;

/// Channel type tag that carries subsystem sessions.
pub const SESSION_CHANNEL: &str = "session";

/// Standard reason codes for refusing a channel open (RFC 4254 section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum OpenRejection {
    /// The server refuses this kind of channel by policy.
    AdministrativelyProhibited = 1,
    /// The channel target could not be reached.
    ConnectFailed = 2,
    /// The server does not know the requested channel type.
    UnknownChannelType = 3,
    /// The server lacks resources to open the channel.
    ResourceShortage = 4,
}

impl OpenRejection {
    /// Returns the numeric reason code sent on the wire.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Returns the human-readable description sent with the rejection.
    pub fn description(self) -> &'static str {
        match self {
            OpenRejection::AdministrativelyProhibited => "administratively prohibited",
            OpenRejection::ConnectFailed => "connect failed",
            OpenRejection::UnknownChannelType => "unknown channel type",
            OpenRejection::ResourceShortage => "resource shortage",
        }
    }
}

impl fmt::Display for OpenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// What to do with an incoming channel-open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelDecision {
    /// Accept the channel and attach a request handler and file-transfer session.
    Accept,
    /// Refuse the channel with the given reason.
    Reject(OpenRejection),
}

impl ChannelDecision {
    /// Returns true if the channel should be accepted.
    pub fn is_accept(&self) -> bool {
        matches!(self, ChannelDecision::Accept)
    }
}

/// Decides whether a channel of `channel_type` is served.
pub fn classify(channel_type: &str) -> ChannelDecision {
    if channel_type == SESSION_CHANNEL {
        ChannelDecision::Accept
    } else {
        ChannelDecision::Reject(OpenRejection::UnknownChannelType)
    }
}
