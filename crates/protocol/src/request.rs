//! Out-of-band channel requests.
//!
//! Session channels carry typed control messages next to their byte stream:
//! `subsystem`, `shell`, `exec`, `env`, `pty-req` and so on. Each request has
//! a type tag, a reply-expected flag and a raw payload. Only a `subsystem`
//! request naming [`SFTP_SUBSYSTEM`] is meaningful to the server.
//!
//! ## Subsystem payload
//!
//! ```text
//! ┌──────────────────┬─────────────────────────┐
//! │ length (u32, BE) │ name (UTF-8, length B)  │
//! └──────────────────┴─────────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};

/// Request type tag for subsystem negotiation.
pub const SUBSYSTEM_REQUEST: &str = "subsystem";

/// The only subsystem name the server accepts.
pub const SFTP_SUBSYSTEM: &str = "sftp";

/// Size of the big-endian length prefix on SSH strings.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// A typed out-of-band request received on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    /// Request type tag, e.g. `subsystem` or `pty-req`.
    pub kind: String,
    /// Whether the client waits for a success/failure reply.
    pub want_reply: bool,
    /// Raw type-specific payload.
    pub payload: Bytes,
}

impl ChannelRequest {
    /// Creates a request from its raw parts.
    pub fn new(kind: impl Into<String>, want_reply: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: kind.into(),
            want_reply,
            payload: payload.into(),
        }
    }

    /// Creates a `subsystem` request for `name`.
    pub fn subsystem(name: &str, want_reply: bool) -> Self {
        Self::new(SUBSYSTEM_REQUEST, want_reply, encode_strings(&[name]))
    }

    /// Creates an `exec` request for `command`.
    pub fn exec(command: &[u8], want_reply: bool) -> Self {
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + command.len());
        put_string(&mut buf, command);
        Self::new("exec", want_reply, buf.freeze())
    }

    /// Creates an `env` request setting `name` to `value`.
    pub fn env(name: &str, value: &str, want_reply: bool) -> Self {
        Self::new("env", want_reply, encode_strings(&[name, value]))
    }

    /// Creates a `shell` request.
    pub fn shell(want_reply: bool) -> Self {
        Self::new("shell", want_reply, Bytes::new())
    }

    /// Creates a `pty-req` request for terminal `term` of the given size.
    ///
    /// Terminal modes are not carried; the server never grants a pty.
    pub fn pty(term: &str, cols: u32, rows: u32, want_reply: bool) -> Self {
        let mut buf = BytesMut::new();
        put_string(&mut buf, term.as_bytes());
        buf.put_u32(cols);
        buf.put_u32(rows);
        buf.put_u32(0);
        buf.put_u32(0);
        put_string(&mut buf, &[]);
        Self::new("pty-req", want_reply, buf.freeze())
    }

    /// Returns true if this is a `subsystem` request.
    pub fn is_subsystem(&self) -> bool {
        self.kind == SUBSYSTEM_REQUEST
    }

    /// Returns the requested subsystem name.
    ///
    /// Returns `Ok(None)` for any other request type and an error for a
    /// malformed subsystem payload.
    pub fn subsystem_name(&self) -> Result<Option<&str>> {
        if !self.is_subsystem() {
            return Ok(None);
        }
        decode_subsystem_name(&self.payload).map(Some)
    }
}

/// Decodes the subsystem name from a `subsystem` request payload.
///
/// The payload is a single SSH string: a 4-byte big-endian length followed by
/// that many bytes of UTF-8. Short payloads, lengths that overrun the payload
/// and trailing bytes are all rejected.
pub fn decode_subsystem_name(payload: &[u8]) -> Result<&str> {
    let mut buf = payload;
    if buf.remaining() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Truncated {
            needed: LENGTH_PREFIX_SIZE,
            available: buf.remaining(),
        });
    }

    let len = buf.get_u32() as usize;
    if len > buf.remaining() {
        return Err(ProtocolError::Truncated {
            needed: len,
            available: buf.remaining(),
        });
    }

    let (name, rest) = buf.split_at(len);
    if !rest.is_empty() {
        return Err(ProtocolError::TrailingBytes(rest.len()));
    }

    std::str::from_utf8(name).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Encodes a sequence of strings as concatenated SSH strings.
pub fn encode_strings(values: &[&str]) -> Bytes {
    let capacity = values
        .iter()
        .map(|v| LENGTH_PREFIX_SIZE + v.len())
        .sum();
    let mut buf = BytesMut::with_capacity(capacity);
    for value in values {
        put_string(&mut buf, value.as_bytes());
    }
    buf.freeze()
}

fn put_string(buf: &mut BytesMut, value: &[u8]) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value);
}
