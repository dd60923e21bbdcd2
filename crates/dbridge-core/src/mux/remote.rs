//! The remote socket role: translating pair operations into protocol
//! packets.
//!
//! A remote socket has no stream and no queue; its id was allocated by the
//! far side. Enqueued bytes become WRTE packets, credit becomes OKAY, and
//! shutdown becomes CLSE, all emitted through the bound transport.

use tracing::trace;

use crate::protocol::{Command, Packet};

use super::{EnqueueResult, SocketMux, SocketToken};

impl SocketMux {
    pub(crate) fn remote_enqueue(&mut self, token: SocketToken, mut packet: Packet) -> EnqueueResult {
        let Some(sock) = self.socket(token) else {
            return EnqueueResult::Closed;
        };
        let Some(transport) = sock.transport.clone() else {
            debug_assert!(false, "remote socket without transport");
            return EnqueueResult::NotReady;
        };
        let id = sock.id;
        let peer_id = sock
            .peer
            .and_then(|p| self.socket(p))
            .map(|p| p.id)
            .unwrap_or(0);

        trace!(id, peer_id, len = packet.remaining(), "remote enqueue");
        packet.header.command = Command::Write;
        packet.header.arg0 = peer_id;
        packet.header.arg1 = id;
        packet.header.finish(&packet.payload);
        transport.send_packet(packet);

        // The far side grants more credit with OKAY.
        EnqueueResult::NotReady
    }

    pub(crate) fn remote_ready(&mut self, token: SocketToken) {
        let Some(sock) = self.socket(token) else {
            return;
        };
        let Some(transport) = sock.transport.clone() else {
            debug_assert!(false, "remote socket without transport");
            return;
        };
        let id = sock.id;
        let peer_id = sock
            .peer
            .and_then(|p| self.socket(p))
            .map(|p| p.id)
            .unwrap_or(0);

        trace!(id, peer_id, "remote ready, sending OKAY");
        transport.send_packet(Packet::control(Command::Okay, peer_id, id));
    }

    pub(crate) fn remote_shutdown(&mut self, token: SocketToken) {
        let Some(sock) = self.socket(token) else {
            return;
        };
        let Some(transport) = sock.transport.clone() else {
            debug_assert!(false, "remote socket without transport");
            return;
        };
        let id = sock.id;
        // arg0 stays 0 when the peer is already gone.
        let peer_id = sock
            .peer
            .and_then(|p| self.socket(p))
            .map(|p| p.id)
            .unwrap_or(0);

        trace!(id, peer_id, "remote shutdown, sending CLSE");
        transport.send_packet(Packet::control(Command::Close, peer_id, id));
    }

    pub(crate) fn remote_close(&mut self, token: SocketToken) {
        let peer = self.socket(token).and_then(|s| s.peer);
        if let Some(peer_token) = peer {
            if let Some(p) = self.socket_mut(peer_token) {
                p.peer = None;
            }
            self.close(peer_token);
        }
        trace!(%token, "remote socket closed");
        self.remove_from_arena(token);
    }
}
