//! The smart socket role: parse one service request, rewire the pair.
//!
//! A smart socket is the transient far end of a freshly accepted
//! connection. It accumulates the length-prefixed request its local peer
//! reads from the client, then takes one of three exits:
//! - answer a host query in place and tear the pair down,
//! - bind the peer to a resolved host service and bow out,
//! - convert the peer into a transport-bound relay via OPEN and bow out.
//!
//! Failing any of that closes the smart socket, which the enqueueing peer
//! observes as the closed sentinel.

use bytes::BytesMut;
use tracing::trace;

use crate::constants::MAX_PAYLOAD;
use crate::protocol::{self, Packet};
use crate::services::{HostRequestOutcome, ServiceHooks};
use crate::transport::{ConnectionState, TransportType};

use super::{BridgeSide, EnqueueResult, Role, SocketMux, SocketToken};

#[derive(Default)]
pub(crate) struct SmartSocket {
    /// Accumulated request bytes, prefix included.
    pub(crate) buffer: Option<BytesMut>,
}

enum Parse {
    Wait,
    Fail,
    Request(String),
}

impl SocketMux {
    pub(crate) fn smart_enqueue(
        &mut self,
        token: SocketToken,
        packet: Packet,
        hooks: &mut dyn ServiceHooks,
    ) -> EnqueueResult {
        let max = self.max_payload(token);

        let (parse, peer) = {
            let Some(sock) = self.socket_mut(token) else {
                return EnqueueResult::Closed;
            };
            let peer = sock.peer;
            let Role::Smart(ss) = &mut sock.role else {
                debug_assert!(false, "smart_enqueue on non-smart socket");
                return EnqueueResult::NotReady;
            };

            let buffer = ss.buffer.get_or_insert_with(BytesMut::new);
            let parse = if buffer.len() + packet.remaining() > max {
                trace!(%token, "smart request overflow");
                Parse::Fail
            } else {
                buffer.extend_from_slice(&packet.payload);
                match protocol::decode_request(buffer) {
                    Ok(None) => Parse::Wait,
                    Err(_) => Parse::Fail,
                    Ok(Some(request)) => match std::str::from_utf8(request) {
                        Ok(text) => Parse::Request(text.to_owned()),
                        Err(_) => Parse::Fail,
                    },
                }
            };
            (parse, peer)
        };

        let service = match parse {
            Parse::Wait => return EnqueueResult::Ready,
            Parse::Fail => return self.smart_fail(token),
            Parse::Request(service) => service,
        };
        trace!(%token, service = %service, "smart request");

        if let Some(request) = protocol::parse_host_request(&service) {
            let command = request.command.to_owned();
            let serial = request.serial.map(str::to_owned);
            let transport_type = request.transport_type;
            return self.smart_host_dispatch(token, peer, &command, transport_type, serial, hooks);
        }

        self.smart_remote_connect(token, peer, &service, hooks)
    }

    /// Host-side exit: answer in place, stay bound for more requests, or
    /// splice the peer onto a host service.
    fn smart_host_dispatch(
        &mut self,
        token: SocketToken,
        peer: Option<SocketToken>,
        command: &str,
        transport_type: TransportType,
        serial: Option<String>,
        hooks: &mut dyn ServiceHooks,
    ) -> EnqueueResult {
        let Some(peer_token) = peer else {
            return self.smart_fail(token);
        };

        let outcome = self
            .local_stream_mut(peer_token)
            .map(|reply| hooks.handle_host_request(command, transport_type, serial.as_deref(), reply));
        let Some(outcome) = outcome else {
            return self.smart_fail(token);
        };
        match outcome {
            HostRequestOutcome::Handled => {
                // The handler sent its own OKAY or FAIL; nothing left to
                // relay on this connection.
                trace!(%token, command, "host request handled in place");
                return self.smart_fail(token);
            }
            HostRequestOutcome::SwitchTransport(transport) => {
                if let Some(sock) = self.socket_mut(token) {
                    sock.transport = Some(transport);
                }
            }
            HostRequestOutcome::Unhandled => {}
        }

        if command.starts_with("transport") {
            // The connection stays parked on this smart socket; later
            // requests ride the transport bound above.
            trace!(%token, "transport bound, awaiting next request");
            if let Some(Role::Smart(ss)) = self.socket_mut(token).map(|s| &mut s.role) {
                if let Some(buffer) = &mut ss.buffer {
                    buffer.clear();
                }
            }
            return EnqueueResult::Ready;
        }

        match hooks.host_service_to_socket(command, serial.as_deref()) {
            None => {
                trace!(%token, command, "unknown host service");
                if let Some(reply) = self.local_stream_mut(peer_token) {
                    let _ = protocol::write_fail(reply, "unknown host service");
                }
                self.smart_fail(token)
            }
            Some(stream) => {
                let service_token = self.create_local_socket(stream);
                trace!(%token, command, %service_token, "bound host service");
                if let Some(reply) = self.local_stream_mut(peer_token) {
                    let _ = protocol::write_okay(reply);
                }

                // The requester becomes a plain relay bound to the
                // service socket; this smart socket's work is done.
                if let Some(Role::Local(ls)) =
                    self.socket_mut(peer_token).map(|s| &mut s.role)
                {
                    ls.notify_on_connect = false;
                }
                self.pair(peer_token, service_token);
                if let Some(sock) = self.socket_mut(token) {
                    sock.peer = None;
                }
                self.close(token);

                // Initial state is "ready".
                self.ready(service_token);
                EnqueueResult::Ready
            }
        }
    }

    /// Device-facing exit: hand the peer our transport and request the
    /// far-side service with OPEN.
    fn smart_remote_connect(
        &mut self,
        token: SocketToken,
        peer: Option<SocketToken>,
        destination: &str,
        hooks: &mut dyn ServiceHooks,
    ) -> EnqueueResult {
        if self.side() == BridgeSide::Device && self.transport_of(token).is_none() {
            match hooks.acquire_one_transport(TransportType::Any) {
                Ok(transport) => {
                    if let Some(sock) = self.socket_mut(token) {
                        sock.transport = Some(transport);
                    }
                }
                Err(message) => {
                    return self.smart_fail_with(token, peer, &message);
                }
            }
        }

        let Some(transport) = self.transport_of(token) else {
            return self.smart_fail_with(token, peer, "device offline (no transport)");
        };
        if transport.connection_state() == ConnectionState::Offline {
            return self.smart_fail_with(token, peer, "device offline (transport offline)");
        }

        let Some(peer_token) = peer else {
            return self.smart_fail(token);
        };

        // The peer inherits this transport; the OPEN payload must fit its
        // new ceiling.
        let ceiling = MAX_PAYLOAD.min(transport.max_payload());
        if destination.len() + 1 > ceiling - 1 {
            return self.smart_fail_with(token, peer, "destination oversized");
        }

        // Rig the peer to pass the success or fail message back once the
        // far side answers, then detach and request the connection.
        if let Some(sock) = self.socket_mut(peer_token) {
            if let Role::Local(ls) = &mut sock.role {
                ls.notify_on_connect = true;
            }
            sock.peer = None;
            sock.transport = Some(transport);
        }
        self.connect_to_remote(peer_token, destination);

        if let Some(sock) = self.socket_mut(token) {
            sock.peer = None;
        }
        self.close(token);
        EnqueueResult::NotReady
    }

    pub(crate) fn smart_close(&mut self, token: SocketToken) {
        let peer = self.socket(token).and_then(|s| s.peer);
        if let Some(peer_token) = peer {
            if let Some(p) = self.socket_mut(peer_token) {
                p.peer = None;
            }
            self.close(peer_token);
        }
        trace!(%token, "smart socket closed");
        // The accumulated request buffer is dropped with the socket.
        self.remove_from_arena(token);
    }

    /// Close self; the enqueueing peer sees this as "closed you too".
    fn smart_fail(&mut self, token: SocketToken) -> EnqueueResult {
        self.close(token);
        EnqueueResult::Closed
    }

    /// Report `message` to the requesting client, then fail.
    fn smart_fail_with(
        &mut self,
        token: SocketToken,
        peer: Option<SocketToken>,
        message: &str,
    ) -> EnqueueResult {
        if let Some(stream) = peer.and_then(|p| self.local_stream_mut(p)) {
            let _ = protocol::write_fail(stream, message);
        }
        self.smart_fail(token)
    }
}
