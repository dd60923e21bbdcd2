//! Registry operations: the main and closing lists.
//!
//! Local sockets are registered with a process-unique non-zero id so the
//! packet demultiplexer can route OKAY/WRTE/CLSE to them. A socket whose
//! close is deferred moves from the main list to the closing list until
//! its write queue drains; the two lists never share a socket.

use tracing::trace;

use crate::transport::{same_transport, TransportHandle};

use super::{Role, SocketMux, SocketToken};

impl SocketMux {
    /// Assign the next registry id and insert into the main list.
    pub(crate) fn install_local_socket(&mut self, token: SocketToken) {
        let id = self.next_local_id;
        self.next_local_id = self.next_local_id.wrapping_add(1);
        // Socket ids should never be 0.
        if self.next_local_id == 0 {
            panic!("local socket id overflow");
        }
        if let Some(sock) = self.socket_mut(token) {
            sock.id = id;
        }
        self.main_list.push(token);
    }

    /// Find the registered socket with id `local_id`.
    ///
    /// When `peer_id` is non-zero, the socket must additionally be paired
    /// with a peer carrying that id.
    pub fn find_local_socket(&self, local_id: u32, peer_id: u32) -> Option<SocketToken> {
        for &token in &self.main_list {
            let Some(sock) = self.socket(token) else {
                continue;
            };
            if sock.id != local_id {
                continue;
            }
            if peer_id == 0 {
                return Some(token);
            }
            let peer_matches = sock
                .peer
                .and_then(|p| self.socket(p))
                .map(|p| p.id == peer_id)
                .unwrap_or(false);
            return peer_matches.then_some(token);
        }
        None
    }

    /// Detach a socket from whichever list holds it and retire its id.
    pub(crate) fn remove_socket(&mut self, token: SocketToken) {
        let registered = self.main_list.iter().any(|&t| t == token)
            || self.closing_list.iter().any(|&t| t == token);
        if !registered {
            return;
        }
        self.main_list.retain(|&t| t != token);
        self.closing_list.retain(|&t| t != token);
        if let Some(sock) = self.socket_mut(token) {
            sock.id = 0;
        }
    }

    /// Close every registered socket bound to `transport`, directly or
    /// through its peer.
    ///
    /// Closing a socket mutates the list out from under the walk, so the
    /// scan restarts from the top after every hit. Sockets already
    /// draining on the closing list cannot be closed harder; their
    /// transport reference is dropped instead so none survives this call.
    pub fn close_all_sockets(&mut self, transport: &TransportHandle) {
        loop {
            let victim = self.main_list.iter().copied().find(|&token| {
                let Some(sock) = self.socket(token) else {
                    return false;
                };
                let own = sock
                    .transport
                    .as_ref()
                    .is_some_and(|t| same_transport(t, transport));
                let via_peer = sock
                    .peer
                    .and_then(|p| self.socket(p))
                    .and_then(|p| p.transport.as_ref())
                    .is_some_and(|t| same_transport(t, transport));
                own || via_peer
            });
            match victim {
                Some(token) => {
                    trace!(%token, "closing socket for dying transport");
                    self.close(token);
                }
                None => break,
            }
        }

        for token in self.closing_tokens() {
            let drop_ref = self
                .socket(token)
                .and_then(|s| s.transport.as_ref())
                .is_some_and(|t| same_transport(t, transport));
            if drop_ref {
                if let Some(sock) = self.socket_mut(token) {
                    sock.transport = None;
                }
            }
        }
    }

    /// Whether a registered socket still holds `closing = false`.
    ///
    /// Main-list sockets are live and readable; only closing-list sockets
    /// drain toward destruction.
    pub(crate) fn debug_check_lists(&self) -> bool {
        self.main_list.iter().all(|&t| !self.is_closing(t))
            && self.closing_list.iter().all(|&t| {
                self.is_closing(t)
                    && match self.socket(t).map(|s| &s.role) {
                        Some(Role::Local(ls)) => !ls.queue.is_empty(),
                        _ => false,
                    }
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use crate::mux::{BridgeSide, SocketMux};
    use crate::protocol::Packet;
    use crate::stream::ByteStream;
    use crate::transport::{ConnectionState, Transport, TransportHandle};

    struct Inert;

    impl ByteStream for Inert {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
    }

    #[derive(Debug)]
    struct Wire;

    impl Transport for Wire {
        fn send_packet(&self, _packet: Packet) {}
        fn max_payload(&self) -> usize {
            crate::constants::MAX_PAYLOAD
        }
        fn connection_state(&self) -> ConnectionState {
            ConnectionState::Online
        }
    }

    #[test]
    fn ids_are_monotonic_and_non_zero() {
        let mut mux = SocketMux::new(BridgeSide::Host);
        let a = mux.create_local_socket(Box::new(Inert));
        let b = mux.create_local_socket(Box::new(Inert));
        let c = mux.create_local_socket(Box::new(Inert));

        let ids = [mux.raw_id(a), mux.raw_id(b), mux.raw_id(c)];
        assert!(ids.iter().all(|&id| id != 0));
        assert!(ids[0] < ids[1] && ids[1] < ids[2]);
    }

    #[test]
    fn find_matches_id_and_optional_peer() {
        let mut mux = SocketMux::new(BridgeSide::Host);
        let t: TransportHandle = Arc::new(Wire);

        let local = mux.create_local_socket(Box::new(Inert));
        let remote = mux.create_remote_socket(99, &t);
        mux.pair(local, remote);
        let id = mux.raw_id(local);

        assert_eq!(mux.find_local_socket(id, 0), Some(local));
        assert_eq!(mux.find_local_socket(id, 99), Some(local));
        assert_eq!(mux.find_local_socket(id, 98), None);
        assert_eq!(mux.find_local_socket(id + 1000, 0), None);
    }

    #[test]
    fn find_ignores_unregistered_remote_ids() {
        let mut mux = SocketMux::new(BridgeSide::Host);
        let t: TransportHandle = Arc::new(Wire);
        let remote = mux.create_remote_socket(7, &t);

        // Remote ids belong to the far side's registry.
        assert_eq!(mux.find_local_socket(7, 0), None);
        assert!(mux.contains(remote));
    }

    #[test]
    fn remove_retires_the_id() {
        let mut mux = SocketMux::new(BridgeSide::Host);
        let a = mux.create_local_socket(Box::new(Inert));
        let id = mux.raw_id(a);

        mux.remove_socket(a);
        assert_eq!(mux.raw_id(a), 0);
        assert_eq!(mux.find_local_socket(id, 0), None);
        assert!(mux.main_tokens().is_empty());
    }

    #[test]
    fn close_all_takes_both_halves_of_a_pair() {
        let mut mux = SocketMux::new(BridgeSide::Host);
        let t: TransportHandle = Arc::new(Wire);
        let other: TransportHandle = Arc::new(Wire);

        let local = mux.create_local_socket(Box::new(Inert));
        let remote = mux.create_remote_socket(5, &t);
        mux.pair(local, remote);

        let unrelated = mux.create_local_socket(Box::new(Inert));
        let unrelated_remote = mux.create_remote_socket(6, &other);
        mux.pair(unrelated, unrelated_remote);

        mux.close_all_sockets(&t);

        assert!(!mux.contains(local));
        assert!(!mux.contains(remote));
        assert!(mux.contains(unrelated));
        assert!(mux.contains(unrelated_remote));

        for token in mux.tokens() {
            let refs = mux
                .transport_of(token)
                .is_some_and(|h| crate::transport::same_transport(&h, &t));
            assert!(!refs);
        }
    }

    #[test]
    fn list_discipline_holds_after_churn() {
        let mut mux = SocketMux::new(BridgeSide::Host);
        let a = mux.create_local_socket(Box::new(Inert));
        let b = mux.create_local_socket(Box::new(Inert));
        mux.pair(a, b);
        mux.close(a);

        assert!(mux.debug_check_lists());
    }
}
