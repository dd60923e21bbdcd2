//! The local socket role: bridging a byte stream to a peer.
//!
//! A local socket owns the stream and a FIFO write queue. Delivery is
//! credit-based: it only reads from its stream after its peer grants
//! `ready()`, and it reports saturation back through the enqueue result so
//! the peer stops reading in turn.

use std::collections::VecDeque;
use std::io;

use bytes::BytesMut;
use tracing::trace;

use crate::fdevent::FdEvents;
use crate::protocol::{self, Packet};
use crate::services::ServiceHooks;
use crate::stream::ByteStream;

use super::{EnqueueResult, Role, SocketMux, SocketToken};

pub(crate) struct LocalSocket {
    pub(crate) stream: Box<dyn ByteStream>,
    pub(crate) queue: VecDeque<Packet>,
    pub(crate) interest: FdEvents,
    pub(crate) closing: bool,
    pub(crate) has_write_error: bool,
    pub(crate) exit_on_close: bool,
    pub(crate) force_eof: bool,
    /// One-shot connect status: when set, the next `ready()` reports OKAY
    /// and the next `close()` reports FAIL to the stream, then the socket
    /// behaves as a plain relay.
    pub(crate) notify_on_connect: bool,
}

impl LocalSocket {
    pub(crate) fn new(stream: Box<dyn ByteStream>) -> Self {
        Self {
            stream,
            queue: VecDeque::new(),
            interest: FdEvents::empty(),
            closing: false,
            has_write_error: false,
            exit_on_close: false,
            force_eof: false,
            notify_on_connect: false,
        }
    }
}

enum WriteOutcome {
    Drained,
    Queued,
    Failed,
}

enum DrainStep {
    QueueEmpty,
    Blocked,
    Failed,
}

impl SocketMux {
    pub(crate) fn local_enqueue(&mut self, token: SocketToken, mut packet: Packet) -> EnqueueResult {
        let outcome = {
            let Some(sock) = self.socket_mut(token) else {
                return EnqueueResult::Closed;
            };
            let id = sock.id;
            let Role::Local(ls) = &mut sock.role else {
                debug_assert!(false, "local_enqueue on non-local socket");
                return EnqueueResult::NotReady;
            };
            trace!(id, len = packet.remaining(), "local enqueue");

            if !ls.queue.is_empty() {
                // Already backlogged; writable events will drain the tail.
                ls.queue.push_back(packet);
                WriteOutcome::Queued
            } else {
                // Write as much as we can until we would block or fail.
                let mut outcome = WriteOutcome::Drained;
                while packet.remaining() > 0 {
                    match ls.stream.write(&packet.payload) {
                        Ok(n) if n > 0 => packet.advance(n),
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Ok(_) | Err(_) => {
                            outcome = WriteOutcome::Failed;
                            break;
                        }
                    }
                }
                match outcome {
                    WriteOutcome::Failed => {
                        trace!(id, "local enqueue: stream not ready, closing");
                        ls.has_write_error = true;
                        WriteOutcome::Failed
                    }
                    _ if packet.remaining() > 0 => {
                        ls.queue.push_back(packet);
                        WriteOutcome::Queued
                    }
                    _ => WriteOutcome::Drained,
                }
            }
        };

        match outcome {
            WriteOutcome::Drained => EnqueueResult::Ready,
            WriteOutcome::Queued => {
                self.interest_add(token, FdEvents::WRITE);
                EnqueueResult::NotReady
            }
            WriteOutcome::Failed => {
                self.close(token);
                EnqueueResult::NotReady
            }
        }
    }

    pub(crate) fn local_ready(&mut self, token: SocketToken) {
        if self.take_connect_notify(token) {
            let ok = self
                .local_stream_mut(token)
                .map(|stream| protocol::write_okay(stream).is_ok())
                .unwrap_or(false);
            if !ok {
                trace!(%token, "connect status lost on dead stream");
            }
        }
        // Far side is ready for data; pay attention to readable events.
        self.interest_add(token, FdEvents::READ);
    }

    pub(crate) fn local_close(&mut self, token: SocketToken) {
        if self.take_connect_notify(token) {
            // Closed before the connection resolved; report the failure.
            if let Some(stream) = self.local_stream_mut(token) {
                let _ = protocol::write_fail(stream, "closed");
            }
        }

        let peer = self.socket(token).and_then(|s| s.peer);
        if let Some(peer_token) = peer {
            // Shutdown runs before the back-reference is nulled so the
            // peer can still name our id in its CLSE.
            self.shutdown(peer_token);
            if let Some(p) = self.socket_mut(peer_token) {
                p.peer = None;
            }
            self.close(peer_token);
            if let Some(sock) = self.socket_mut(token) {
                sock.peer = None;
            }
        }

        let destroy = {
            let Some(sock) = self.socket(token) else {
                return;
            };
            let Role::Local(ls) = &sock.role else {
                return;
            };
            ls.closing || ls.has_write_error || ls.queue.is_empty()
        };

        if destroy {
            let id = self.raw_id(token);
            self.destroy_local(token);
            trace!(id, "local socket closed");
            return;
        }

        // Defer: stop reading, keep draining the queue.
        let id = self.raw_id(token);
        trace!(id, "local socket closing, draining queue");
        if let Some(Role::Local(ls)) = self.socket_mut(token).map(|s| &mut s.role) {
            ls.closing = true;
        }
        self.interest_del(token, FdEvents::READ);
        self.remove_socket(token);
        self.closing_list.push(token);
        debug_assert!(self.interest(token).contains(FdEvents::WRITE));
    }

    /// Free a local socket: stop watching (which releases the stream),
    /// discard queued packets, unregister.
    pub(crate) fn destroy_local(&mut self, token: SocketToken) {
        self.watcher.remove(token);
        self.remove_socket(token);
        let Some(sock) = self.remove_from_arena(token) else {
            return;
        };
        if let Role::Local(ls) = sock.role {
            for packet in &ls.queue {
                trace!(discarded = packet.remaining(), "dropping unwritten bytes");
            }
            if ls.exit_on_close {
                trace!("exit-on-close socket destroyed, requesting termination");
                self.request_exit(1);
            }
        }
    }

    /// Readiness callback for a local socket's stream.
    ///
    /// Writes are processed before reads so a drained queue can hand out
    /// credit in the same pass.
    pub(crate) fn local_event(
        &mut self,
        token: SocketToken,
        events: FdEvents,
        hooks: &mut dyn ServiceHooks,
    ) {
        if events.contains(FdEvents::WRITE) {
            let step = {
                let Some(sock) = self.socket_mut(token) else {
                    return;
                };
                let Role::Local(ls) = &mut sock.role else {
                    return;
                };
                let LocalSocket {
                    queue,
                    stream,
                    has_write_error,
                    ..
                } = ls;

                let mut step = DrainStep::QueueEmpty;
                'queue: while let Some(head) = queue.front_mut() {
                    while !head.is_drained() {
                        match stream.write(&head.payload) {
                            Ok(n) if n > 0 => head.advance(n),
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                                // The next writable event resumes from the
                                // advanced cursor.
                                step = DrainStep::Blocked;
                                break 'queue;
                            }
                            Ok(_) | Err(_) => {
                                *has_write_error = true;
                                step = DrainStep::Failed;
                                break 'queue;
                            }
                        }
                    }
                    queue.pop_front();
                }
                step
            };

            match step {
                DrainStep::Blocked => return,
                DrainStep::Failed => {
                    trace!(%token, "closing after write failure");
                    self.close(token);
                    return;
                }
                DrainStep::QueueEmpty => {}
            }

            // If we sent the last packet of a closing socket, we can now
            // destroy it.
            let (closing, peer) = {
                let Some(sock) = self.socket(token) else {
                    return;
                };
                let Role::Local(ls) = &sock.role else {
                    return;
                };
                (ls.closing, sock.peer)
            };
            if closing {
                self.close(token);
                return;
            }

            self.interest_del(token, FdEvents::WRITE);
            if let Some(peer_token) = peer {
                self.ready(peer_token);
            }
        }

        if events.contains(FdEvents::READ) {
            let capacity = self.max_payload(token);
            let mut payload = BytesMut::zeroed(capacity);
            let mut filled = 0usize;
            let mut is_eof = false;
            let mut last: i64 = 0;

            let (force_eof, peer) = {
                let Some(sock) = self.socket_mut(token) else {
                    return;
                };
                let peer = sock.peer;
                let Role::Local(ls) = &mut sock.role else {
                    return;
                };

                while filled < capacity {
                    match ls.stream.read(&mut payload[filled..]) {
                        Ok(n) if n > 0 => {
                            filled += n;
                            last = n as i64;
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            last = -1;
                            break;
                        }
                        Ok(_) | Err(_) => {
                            is_eof = true;
                            last = 0;
                            break;
                        }
                    }
                }
                (ls.force_eof, peer)
            };
            trace!(%token, filled, is_eof, force_eof, "local read");

            match peer {
                Some(peer_token) if filled > 0 => {
                    payload.truncate(filled);
                    let packet = Packet::data(payload);
                    let result = self.enqueue(peer_token, packet, hooks);
                    if result == EnqueueResult::Closed || !self.contains(token) {
                        // The peer closed us as a side effect; if packets
                        // remain queued, the closing list finishes them.
                        return;
                    }
                    last = match result {
                        EnqueueResult::Ready => 0,
                        EnqueueResult::NotReady => 1,
                        EnqueueResult::Closed => unreachable!(),
                    };
                    if result == EnqueueResult::NotReady {
                        // Saturated peer; reads resume on its ready().
                        self.interest_del(token, FdEvents::READ);
                    }
                }
                _ => {
                    // Nothing read, or nowhere to deliver.
                    drop(payload);
                }
            }

            // Don't allow a forced eof if data is still in flight.
            if (force_eof && last == 0) || is_eof {
                trace!(%token, is_eof, "closing after read");
                self.close(token);
                return;
            }
        }

        if events.contains(FdEvents::ERROR) {
            // Surfaces on the next read or write instead; acting here
            // could skip the last readable bytes.
            trace!(%token, "stream error event ignored");
        }
    }

    /// Clear and report the pending one-shot connect status, if any.
    fn take_connect_notify(&mut self, token: SocketToken) -> bool {
        match self.socket_mut(token).map(|s| &mut s.role) {
            Some(Role::Local(ls)) if ls.notify_on_connect => {
                ls.notify_on_connect = false;
                true
            }
            _ => false,
        }
    }
}
