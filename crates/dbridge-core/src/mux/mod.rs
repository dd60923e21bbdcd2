//! The socket multiplexer.
//!
//! This module provides:
//! - [`SocketMux`], the arena and registry owning every logical socket
//! - The three socket roles: local (fd-backed), remote (transport-backed),
//!   and smart (request parser)
//! - Pair lifecycle: pairing, credit-based flow control, cascading close
//!
//! All sockets live in a single arena keyed by [`SocketToken`] and refer to
//! their peers by token, never by reference. Every operation re-resolves
//! tokens on entry, so a socket freed by a nested close simply stops
//! resolving: there are no dangling peers, and calling into a dead token is
//! a no-op. The embedder's event loop is the only caller; nothing here
//! blocks.

mod local;
mod registry;
mod remote;
mod smart;

#[cfg(test)]
mod proptest;

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use crate::constants::MAX_PAYLOAD;
use crate::fdevent::{FdEvents, FdWatcher, NullWatcher};
use crate::protocol::Packet;
use crate::services::ServiceHooks;
use crate::stream::ByteStream;
use crate::transport::TransportHandle;

pub(crate) use local::LocalSocket;
pub(crate) use smart::SmartSocket;

// =============================================================================
// Identifiers and Results
// =============================================================================

/// Arena handle for a socket. Never reused within a [`SocketMux`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketToken(u64);

impl fmt::Display for SocketToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{}", self.0)
    }
}

/// Result of delivering a packet to a socket.
///
/// Callers must check for [`EnqueueResult::Closed`] before touching the
/// callee again: it means the callee closed itself (and, by cascade, the
/// caller's half of the pair) while handling the packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    /// Packet consumed; keep feeding.
    Ready,
    /// Packet accepted but the socket is saturated; wait for `ready()`.
    NotReady,
    /// The socket closed itself as a side effect of this call.
    Closed,
}

/// Which half of the bridge this multiplexer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeSide {
    /// The host daemon: answers `host:*` queries, relays to devices.
    Host,
    /// The device daemon: opens local services, may self-acquire a
    /// transport for outbound requests.
    Device,
}

/// Typed request to terminate the process, raised by destroying a socket
/// with the exit-on-close property. The loop owner polls
/// [`SocketMux::take_exit_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRequest {
    /// Process exit code.
    pub code: i32,
}

// =============================================================================
// Socket
// =============================================================================

pub(crate) enum Role {
    Local(LocalSocket),
    Remote,
    Smart(SmartSocket),
}

#[derive(Clone, Copy)]
enum RoleKind {
    Local,
    Remote,
    Smart,
}

pub(crate) struct Socket {
    /// Registry id for local sockets, far-side id for remote sockets,
    /// 0 when unassigned.
    pub(crate) id: u32,
    pub(crate) peer: Option<SocketToken>,
    pub(crate) transport: Option<TransportHandle>,
    pub(crate) role: Role,
}

// =============================================================================
// SocketMux
// =============================================================================

/// Process-wide socket arena, registry, and role behavior.
///
/// Single-owner by design: the embedder's loop thread holds the one
/// `&mut SocketMux` and every mutation funnels through it, which is what
/// the close cascade relies on in place of a recursive lock.
pub struct SocketMux {
    side: BridgeSide,
    sockets: HashMap<SocketToken, Socket>,
    pub(crate) main_list: Vec<SocketToken>,
    pub(crate) closing_list: Vec<SocketToken>,
    pub(crate) next_local_id: u32,
    next_token: u64,
    pub(crate) watcher: Box<dyn FdWatcher>,
    exit_request: Option<ExitRequest>,
}

impl SocketMux {
    /// Create a multiplexer with no readiness registrar.
    pub fn new(side: BridgeSide) -> Self {
        Self::with_watcher(side, Box::new(NullWatcher))
    }

    /// Create a multiplexer that reports interest changes to `watcher`.
    pub fn with_watcher(side: BridgeSide, watcher: Box<dyn FdWatcher>) -> Self {
        Self {
            side,
            sockets: HashMap::new(),
            main_list: Vec::new(),
            closing_list: Vec::new(),
            next_local_id: 1,
            next_token: 1,
            watcher,
            exit_request: None,
        }
    }

    /// Which side of the bridge this multiplexer serves.
    pub fn side(&self) -> BridgeSide {
        self.side
    }

    fn alloc_token(&mut self) -> SocketToken {
        let token = SocketToken(self.next_token);
        self.next_token += 1;
        token
    }

    // =========================================================================
    // Socket creation
    // =========================================================================

    /// Wrap a fresh byte stream in a registered local socket.
    ///
    /// The socket starts with no readiness interest; its first `ready()`
    /// (peer credit) arms reading.
    pub fn create_local_socket(&mut self, stream: Box<dyn ByteStream>) -> SocketToken {
        let token = self.alloc_token();
        self.sockets.insert(
            token,
            Socket {
                id: 0,
                peer: None,
                transport: None,
                role: Role::Local(LocalSocket::new(stream)),
            },
        );
        self.install_local_socket(token);
        self.watcher.install(token);
        trace!(%token, id = self.raw_id(token), "local socket created");
        token
    }

    /// Open a device-side service by name and wrap it in a local socket.
    ///
    /// Returns `None` when no such service exists. Applies the
    /// exit-on-close rules for the restart-style services.
    pub fn create_local_service_socket(
        &mut self,
        name: &str,
        transport: Option<&TransportHandle>,
        hooks: &mut dyn ServiceHooks,
    ) -> Option<SocketToken> {
        if self.side == BridgeSide::Device {
            if let Some(stream) = hooks.special_service_socket(name) {
                return Some(self.create_local_socket(stream));
            }
        }

        let stream = hooks.service_to_fd(name, transport)?;
        let token = self.create_local_socket(stream);
        trace!(%token, name, "local socket bound to service");

        if self.side == BridgeSide::Device && exits_on_close(name, hooks) {
            trace!(%token, name, "enabling exit on close");
            if let Some(Role::Local(ls)) = self.sockets.get_mut(&token).map(|s| &mut s.role) {
                ls.exit_on_close = true;
            }
        }

        Some(token)
    }

    /// Create the local half of a stream whose service lives on the far
    /// side of `transport`. `remote_id` is allocated by the far side and
    /// cannot be 0.
    ///
    /// Remote sockets are not registered: their id belongs to the far
    /// side's registry.
    pub fn create_remote_socket(
        &mut self,
        remote_id: u32,
        transport: &TransportHandle,
    ) -> SocketToken {
        assert!(remote_id != 0, "invalid remote socket id (0)");
        let token = self.alloc_token();
        self.sockets.insert(
            token,
            Socket {
                id: remote_id,
                peer: None,
                transport: Some(transport.clone()),
                role: Role::Remote,
            },
        );
        trace!(%token, id = remote_id, "remote socket created");
        token
    }

    fn create_smart_socket(&mut self) -> SocketToken {
        let token = self.alloc_token();
        self.sockets.insert(
            token,
            Socket {
                id: 0,
                peer: None,
                transport: None,
                role: Role::Smart(SmartSocket::default()),
            },
        );
        trace!(%token, "smart socket created");
        token
    }

    /// Pair an accepted connection with a fresh smart socket and start
    /// reading its request.
    pub fn connect_to_smartsocket(&mut self, local: SocketToken) {
        let smart = self.create_smart_socket();
        self.pair(local, smart);
        self.ready(local);
    }

    /// Emit an OPEN for `destination` on the socket's transport.
    ///
    /// Panics if the destination cannot fit the negotiated payload
    /// ceiling; callers on the wire path check the size first.
    pub fn connect_to_remote(&mut self, token: SocketToken, destination: &str) {
        let max = self.max_payload(token);
        assert!(destination.len() + 1 <= max - 1, "destination oversized");

        let Some(sock) = self.sockets.get(&token) else {
            return;
        };
        let Some(transport) = sock.transport.clone() else {
            debug_assert!(false, "connect_to_remote without transport");
            return;
        };

        trace!(%token, id = sock.id, destination, "connecting to remote service");
        let mut payload = bytes::BytesMut::with_capacity(destination.len() + 1);
        payload.extend_from_slice(destination.as_bytes());
        payload.extend_from_slice(&[0]);

        let mut packet = Packet::data(payload);
        packet.header.command = crate::protocol::Command::Open;
        packet.header.arg0 = sock.id;
        packet.header.arg1 = 0;
        packet.header.finish(&packet.payload);
        transport.send_packet(packet);
    }

    /// Link two live sockets as peers.
    ///
    /// The link is mutual by construction: both sides are written under
    /// the same call, so `a.peer == b` if and only if `b.peer == a`.
    pub fn pair(&mut self, a: SocketToken, b: SocketToken) {
        assert_ne!(a, b, "socket cannot pair with itself");
        assert!(
            self.sockets.contains_key(&a) && self.sockets.contains_key(&b),
            "pairing requires two live sockets"
        );
        if let Some(sa) = self.sockets.get_mut(&a) {
            sa.peer = Some(b);
        }
        if let Some(sb) = self.sockets.get_mut(&b) {
            sb.peer = Some(a);
        }
    }

    // =========================================================================
    // Role dispatch
    // =========================================================================

    fn role_kind(&self, token: SocketToken) -> Option<RoleKind> {
        self.sockets.get(&token).map(|s| match s.role {
            Role::Local(_) => RoleKind::Local,
            Role::Remote => RoleKind::Remote,
            Role::Smart(_) => RoleKind::Smart,
        })
    }

    /// Deliver a packet to a socket.
    pub fn enqueue(
        &mut self,
        token: SocketToken,
        packet: Packet,
        hooks: &mut dyn ServiceHooks,
    ) -> EnqueueResult {
        match self.role_kind(token) {
            None => EnqueueResult::Closed,
            Some(RoleKind::Local) => self.local_enqueue(token, packet),
            Some(RoleKind::Remote) => self.remote_enqueue(token, packet),
            Some(RoleKind::Smart) => self.smart_enqueue(token, packet, hooks),
        }
    }

    /// Grant a socket one more packet of credit.
    pub fn ready(&mut self, token: SocketToken) {
        match self.role_kind(token) {
            None => {}
            Some(RoleKind::Local) => self.local_ready(token),
            Some(RoleKind::Remote) => self.remote_ready(token),
            Some(RoleKind::Smart) => trace!(%token, "smart socket ready (ignored)"),
        }
    }

    /// Notify the far side that this socket's pair is going away.
    ///
    /// Runs before peer back-references are nulled, so remote sockets can
    /// still name the local id in their CLSE.
    pub(crate) fn shutdown(&mut self, token: SocketToken) {
        if let Some(RoleKind::Remote) = self.role_kind(token) {
            self.remote_shutdown(token);
        }
    }

    /// Close a socket and cascade to its peer.
    ///
    /// Idempotent on dead tokens.
    pub fn close(&mut self, token: SocketToken) {
        match self.role_kind(token) {
            None => {}
            Some(RoleKind::Local) => self.local_close(token),
            Some(RoleKind::Remote) => self.remote_close(token),
            Some(RoleKind::Smart) => self.smart_close(token),
        }
    }

    /// Process readiness events reported by the embedder's loop.
    pub fn handle_fd_event(
        &mut self,
        token: SocketToken,
        events: FdEvents,
        hooks: &mut dyn ServiceHooks,
    ) {
        if let Some(RoleKind::Local) = self.role_kind(token) {
            self.local_event(token, events, hooks);
        }
    }

    // =========================================================================
    // Shared queries
    // =========================================================================

    /// Largest payload this socket's pair can carry in one packet.
    pub fn max_payload(&self, token: SocketToken) -> usize {
        let mut max = MAX_PAYLOAD;
        if let Some(sock) = self.sockets.get(&token) {
            if let Some(t) = &sock.transport {
                max = max.min(t.max_payload());
            }
            if let Some(peer) = sock.peer.and_then(|p| self.sockets.get(&p)) {
                if let Some(t) = &peer.transport {
                    max = max.min(t.max_payload());
                }
            }
        }
        max
    }

    /// Force the next quiescent read on a local socket to report EOF.
    pub fn set_force_eof(&mut self, token: SocketToken) {
        if let Some(Role::Local(ls)) = self.sockets.get_mut(&token).map(|s| &mut s.role) {
            ls.force_eof = true;
        }
    }

    /// Take a pending termination request raised by an exit-on-close
    /// socket.
    pub fn take_exit_request(&mut self) -> Option<ExitRequest> {
        self.exit_request.take()
    }

    pub(crate) fn request_exit(&mut self, code: i32) {
        self.exit_request = Some(ExitRequest { code });
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Whether the token still names a live socket.
    pub fn contains(&self, token: SocketToken) -> bool {
        self.sockets.contains_key(&token)
    }

    /// The socket's id (registry id for locals, far-side id for remotes,
    /// 0 when unassigned).
    pub fn raw_id(&self, token: SocketToken) -> u32 {
        self.sockets.get(&token).map(|s| s.id).unwrap_or(0)
    }

    /// The socket's peer, when paired.
    pub fn peer_of(&self, token: SocketToken) -> Option<SocketToken> {
        self.sockets.get(&token).and_then(|s| s.peer)
    }

    /// The transport the socket is bound to, when any.
    pub fn transport_of(&self, token: SocketToken) -> Option<TransportHandle> {
        self.sockets.get(&token).and_then(|s| s.transport.clone())
    }

    /// Whether a local socket is draining toward destruction.
    pub fn is_closing(&self, token: SocketToken) -> bool {
        matches!(
            self.sockets.get(&token).map(|s| &s.role),
            Some(Role::Local(ls)) if ls.closing
        )
    }

    /// Packets waiting for write readiness on a local socket.
    pub fn queued_packets(&self, token: SocketToken) -> usize {
        match self.sockets.get(&token).map(|s| &s.role) {
            Some(Role::Local(ls)) => ls.queue.len(),
            _ => 0,
        }
    }

    /// Current readiness interest of a local socket.
    pub fn interest(&self, token: SocketToken) -> FdEvents {
        match self.sockets.get(&token).map(|s| &s.role) {
            Some(Role::Local(ls)) => ls.interest,
            _ => FdEvents::empty(),
        }
    }

    /// Tokens of every live socket, in no particular order.
    pub fn tokens(&self) -> Vec<SocketToken> {
        self.sockets.keys().copied().collect()
    }

    /// Tokens currently registered in the main list, in install order.
    pub fn main_tokens(&self) -> Vec<SocketToken> {
        self.main_list.clone()
    }

    /// Tokens currently draining on the closing list.
    pub fn closing_tokens(&self) -> Vec<SocketToken> {
        self.closing_list.clone()
    }

    // =========================================================================
    // Arena access for role modules
    // =========================================================================

    pub(crate) fn socket(&self, token: SocketToken) -> Option<&Socket> {
        self.sockets.get(&token)
    }

    pub(crate) fn socket_mut(&mut self, token: SocketToken) -> Option<&mut Socket> {
        self.sockets.get_mut(&token)
    }

    pub(crate) fn remove_from_arena(&mut self, token: SocketToken) -> Option<Socket> {
        self.sockets.remove(&token)
    }

    /// The byte stream of a local socket, for status replies.
    pub(crate) fn local_stream_mut(&mut self, token: SocketToken) -> Option<&mut dyn ByteStream> {
        match self.sockets.get_mut(&token).map(|s| &mut s.role) {
            Some(Role::Local(ls)) => Some(&mut *ls.stream),
            _ => None,
        }
    }

    /// Arm readiness interest, notifying the watcher on a transition.
    pub(crate) fn interest_add(&mut self, token: SocketToken, events: FdEvents) {
        let mut changed = false;
        if let Some(Role::Local(ls)) = self.sockets.get_mut(&token).map(|s| &mut s.role) {
            if !ls.interest.contains(events) {
                ls.interest.insert(events);
                changed = true;
            }
        }
        if changed {
            self.watcher.add(token, events);
        }
    }

    /// Disarm readiness interest, notifying the watcher on a transition.
    pub(crate) fn interest_del(&mut self, token: SocketToken, events: FdEvents) {
        let mut changed = false;
        if let Some(Role::Local(ls)) = self.sockets.get_mut(&token).map(|s| &mut s.role) {
            if ls.interest.intersects(events) {
                ls.interest.remove(events);
                changed = true;
            }
        }
        if changed {
            self.watcher.del(token, events);
        }
    }
}

fn exits_on_close(name: &str, hooks: &dyn ServiceHooks) -> bool {
    (name.starts_with("root:") && hooks.uid() != 0 && hooks.is_debuggable())
        || (name.starts_with("unroot:") && hooks.uid() == 0)
        || name.starts_with("usb:")
        || name.starts_with("tcpip:")
}
