//! SSH session handler.
//!
//! One [`SessionHandler`] serves one transport connection. It consults the
//! [`Authenticator`] during the handshake, hands accepted channels to the
//! [`ChannelDispatcher`] and submits every out-of-band channel request to
//! the handler task owning that channel.
//!
//! Each request callback waits for its verdict and replies before
//! returning. The transport tracks only the reply flag of the request it is
//! currently delivering, and sends a reply only if the client asked for one.
//!
//! Channel types the transport recognizes (`x11`, `direct-tcpip`,
//! `forwarded-tcpip`, agent and stream-local forwarding) are refused on the
//! wire as administratively prohibited; other unknown types are refused by
//! the transport itself with "unknown channel type".

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use protocol::{encode_strings, ChannelRequest, SESSION_CHANNEL};
use russh::keys::PublicKey;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, Pty};
use tracing::{debug, info, warn};

use crate::auth::{AuthDecision, Authenticator, ClientIdentity};
use crate::channel::{submit, ChannelDispatcher, RequestSink};
use crate::error::ServerError;

/// Per-connection SSH handler.
pub struct SessionHandler {
    authenticator: Arc<dyn Authenticator>,
    dispatcher: ChannelDispatcher,
    established: Arc<AtomicBool>,
    channels: HashMap<ChannelId, RequestSink>,
}

impl SessionHandler {
    /// Creates a handler for one accepted connection.
    ///
    /// `established` is raised once a client identity has been accepted,
    /// which is what separates handshake failures from later errors.
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        dispatcher: ChannelDispatcher,
        established: Arc<AtomicBool>,
    ) -> Self {
        Self {
            authenticator,
            dispatcher,
            established,
            channels: HashMap::new(),
        }
    }

    fn peer(&self) -> SocketAddr {
        self.dispatcher.peer()
    }

    /// Submits `request` to the channel's handler and replies with its verdict.
    ///
    /// Requests are built as reply-wanted; the transport drops the reply when
    /// the client did not ask for one.
    async fn decide(
        &self,
        channel: ChannelId,
        request: ChannelRequest,
        session: &mut Session,
    ) -> Result<(), ServerError> {
        let accepted = match self.channels.get(&channel) {
            Some(sink) => submit(sink, request).await,
            None => {
                debug!(peer = %self.peer(), ?channel, "request for a channel that is gone");
                false
            }
        };

        if accepted {
            session.channel_success(channel)?;
        } else {
            session.channel_failure(channel)?;
        }
        Ok(())
    }
}

impl Handler for SessionHandler {
    type Error = ServerError;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let identity = ClientIdentity { user, public_key };

        match self.authenticator.authenticate(&identity)? {
            AuthDecision::Accept(permissions) => {
                self.established.store(true, Ordering::Release);
                info!(
                    peer = %self.peer(),
                    user,
                    fingerprint = %identity.fingerprint(),
                    critical_options = permissions.critical_options.len(),
                    extensions = permissions.extensions.len(),
                    "Handshake established"
                );
                Ok(Auth::Accept)
            }
            AuthDecision::Reject => {
                info!(
                    peer = %self.peer(),
                    user,
                    fingerprint = %identity.fingerprint(),
                    "public key rejected"
                );
                Ok(Auth::Reject {
                    proceed_with_methods: None,
                    partial_success: false,
                })
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if !self.dispatcher.classify(SESSION_CHANNEL).is_accept() {
            return Ok(false);
        }

        let id = channel.id();
        let sink = self.dispatcher.accept(channel.into_stream());
        self.channels.insert(id, sink);
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!(host_to_connect, port_to_connect, "port forwarding requested");
        Ok(self.dispatcher.classify("direct-tcpip").is_accept())
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        originator_address: &str,
        originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        debug!(originator_address, originator_port, "x11 forwarding requested");
        Ok(self.dispatcher.classify("x11").is_accept())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.decide(channel, ChannelRequest::subsystem(name, true), session)
            .await
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.decide(channel, ChannelRequest::shell(true), session).await
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        self.decide(channel, ChannelRequest::exec(data, true), session)
            .await
    }

    async fn env_request(
        &mut self,
        channel: ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let request = ChannelRequest::env(variable_name, variable_value, true);
        self.decide(channel, request, session).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let request = ChannelRequest::pty(term, col_width, row_height, true);
        self.decide(channel, request, session).await
    }

    async fn x11_request(
        &mut self,
        channel: ChannelId,
        _single_connection: bool,
        x11_auth_protocol: &str,
        x11_auth_cookie: &str,
        _x11_screen_number: u32,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let payload = encode_strings(&[x11_auth_protocol, x11_auth_cookie]);
        let request = ChannelRequest::new("x11-req", true, payload);
        self.decide(channel, request, session).await
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if self.channels.remove(&channel).is_none() {
            warn!(peer = %self.peer(), ?channel, "close for an unknown channel");
        }
        Ok(())
    }
}
