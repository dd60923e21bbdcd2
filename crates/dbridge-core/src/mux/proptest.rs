//! Property-based tests for the multiplexer.
//!
//! These tests drive a [`SocketMux`] with random interleavings of pair
//! creation, enqueue, readiness, and close events, asserting the
//! structural invariants after every step:
//! - pair links are mutual
//! - registered ids are unique and non-zero
//! - the main and closing lists respect the closing discipline
//! - a closed socket is freed unless it still has bytes to drain
//! - tearing down a transport leaves no reference behind
//! - bytes delivered to a stream preserve enqueue order

#![cfg(test)]

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use proptest::prelude::*;

use crate::fdevent::FdEvents;
use crate::mux::{BridgeSide, SocketMux, SocketToken};
use crate::protocol::Packet;
use crate::services::{HostRequestOutcome, ServiceHooks};
use crate::stream::ByteStream;
use crate::transport::{ConnectionState, Transport, TransportHandle, TransportType};

// =============================================================================
// Chaos fixtures
// =============================================================================

/// Shared-state stream with a canned read script and a write budget.
#[derive(Clone, Default)]
struct ChaosStream {
    inner: Arc<Mutex<ChaosInner>>,
}

#[derive(Default)]
struct ChaosInner {
    reads: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    budget: usize,
}

impl ChaosStream {
    fn new(reads: Vec<Vec<u8>>, budget: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChaosInner {
                reads: reads.into(),
                written: Vec::new(),
                budget,
            })),
        }
    }
}

impl ByteStream for ChaosStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        match inner.reads.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    chunk.drain(..n);
                    inner.reads.push_front(chunk);
                }
                Ok(n)
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let n = buf.len().min(inner.budget);
        if n == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        inner.budget -= n;
        inner.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }
}

#[derive(Debug, Default)]
struct ChaosWire {
    sent: Mutex<Vec<Packet>>,
}

impl Transport for ChaosWire {
    fn send_packet(&self, packet: Packet) {
        self.sent.lock().unwrap().push(packet);
    }
    fn max_payload(&self) -> usize {
        crate::constants::MAX_PAYLOAD
    }
    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Online
    }
}

struct NoHooks;

impl ServiceHooks for NoHooks {
    fn service_to_fd(
        &mut self,
        _name: &str,
        _transport: Option<&TransportHandle>,
    ) -> Option<Box<dyn ByteStream>> {
        None
    }
    fn host_service_to_socket(
        &mut self,
        _name: &str,
        _serial: Option<&str>,
    ) -> Option<Box<dyn ByteStream>> {
        None
    }
    fn handle_host_request(
        &mut self,
        _command: &str,
        _transport_type: TransportType,
        _serial: Option<&str>,
        _reply: &mut dyn ByteStream,
    ) -> HostRequestOutcome {
        HostRequestOutcome::Unhandled
    }
    fn acquire_one_transport(
        &mut self,
        _transport_type: TransportType,
    ) -> std::result::Result<TransportHandle, String> {
        Err("no devices".into())
    }
}

// =============================================================================
// Operations
// =============================================================================

#[derive(Debug, Clone)]
enum Op {
    LocalPair { budget_a: usize, budget_b: usize },
    RemotePair,
    SmartPair,
    Enqueue { sock: usize, data: Vec<u8> },
    ReadEvent { sock: usize, data: Vec<u8> },
    WriteEvent { sock: usize },
    Ready { sock: usize },
    Close { sock: usize },
    CloseAllForTransport,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..16, 0usize..16).prop_map(|(budget_a, budget_b)| Op::LocalPair {
            budget_a,
            budget_b
        }),
        Just(Op::RemotePair),
        Just(Op::SmartPair),
        (any::<usize>(), prop::collection::vec(any::<u8>(), 1..32))
            .prop_map(|(sock, data)| Op::Enqueue { sock, data }),
        (any::<usize>(), prop::collection::vec(any::<u8>(), 0..32))
            .prop_map(|(sock, data)| Op::ReadEvent { sock, data }),
        any::<usize>().prop_map(|sock| Op::WriteEvent { sock }),
        any::<usize>().prop_map(|sock| Op::Ready { sock }),
        any::<usize>().prop_map(|sock| Op::Close { sock }),
        Just(Op::CloseAllForTransport),
    ]
}

struct Harness {
    mux: SocketMux,
    wire: TransportHandle,
    streams: Vec<(SocketToken, ChaosStream)>,
    next_remote_id: u32,
}

impl Harness {
    fn new() -> Self {
        Self {
            mux: SocketMux::new(BridgeSide::Host),
            wire: Arc::new(ChaosWire::default()),
            streams: Vec::new(),
            next_remote_id: 1,
        }
    }

    fn pick(&self, index: usize) -> Option<SocketToken> {
        let mut tokens = self.mux.tokens();
        if tokens.is_empty() {
            return None;
        }
        tokens.sort();
        Some(tokens[index % tokens.len()])
    }

    fn stream_of(&self, token: SocketToken) -> Option<ChaosStream> {
        self.streams
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, s)| s.clone())
    }

    fn apply(&mut self, op: &Op) {
        let mut hooks = NoHooks;
        match op {
            Op::LocalPair { budget_a, budget_b } => {
                let sa = ChaosStream::new(Vec::new(), *budget_a);
                let sb = ChaosStream::new(Vec::new(), *budget_b);
                let a = self.mux.create_local_socket(Box::new(sa.clone()));
                let b = self.mux.create_local_socket(Box::new(sb.clone()));
                self.streams.push((a, sa));
                self.streams.push((b, sb));
                self.mux.pair(a, b);
                self.mux.ready(a);
            }
            Op::RemotePair => {
                let sa = ChaosStream::new(Vec::new(), 8);
                let local = self.mux.create_local_socket(Box::new(sa.clone()));
                self.streams.push((local, sa));
                let remote = self.mux.create_remote_socket(self.next_remote_id, &self.wire);
                self.next_remote_id += 1;
                self.mux.pair(local, remote);
            }
            Op::SmartPair => {
                let sa = ChaosStream::new(Vec::new(), 8);
                let local = self.mux.create_local_socket(Box::new(sa.clone()));
                self.streams.push((local, sa));
                self.mux.connect_to_smartsocket(local);
            }
            Op::Enqueue { sock, data } => {
                if let Some(token) = self.pick(*sock) {
                    let packet = Packet::data(BytesMut::from(&data[..]));
                    let _ = self.mux.enqueue(token, packet, &mut hooks);
                }
            }
            Op::ReadEvent { sock, data } => {
                if let Some(token) = self.pick(*sock) {
                    if let Some(stream) = self.stream_of(token) {
                        if !data.is_empty() {
                            stream.inner.lock().unwrap().reads.push_back(data.clone());
                        }
                    }
                    self.mux.handle_fd_event(token, FdEvents::READ, &mut hooks);
                }
            }
            Op::WriteEvent { sock } => {
                if let Some(token) = self.pick(*sock) {
                    if let Some(stream) = self.stream_of(token) {
                        stream.inner.lock().unwrap().budget += 16;
                    }
                    self.mux.handle_fd_event(token, FdEvents::WRITE, &mut hooks);
                }
            }
            Op::Ready { sock } => {
                if let Some(token) = self.pick(*sock) {
                    self.mux.ready(token);
                }
            }
            Op::Close { sock } => {
                if let Some(token) = self.pick(*sock) {
                    self.mux.close(token);
                    // Freed outright, or parked on the closing list with
                    // bytes still owed.
                    assert!(
                        !self.mux.contains(token)
                            || (self.mux.is_closing(token)
                                && self.mux.queued_packets(token) > 0),
                        "close left a socket in limbo"
                    );
                }
            }
            Op::CloseAllForTransport => {
                let wire = self.wire.clone();
                self.mux.close_all_sockets(&wire);
                for token in self.mux.tokens() {
                    let refs = self
                        .mux
                        .transport_of(token)
                        .is_some_and(|t| crate::transport::same_transport(&t, &wire));
                    assert!(!refs, "socket survived close_all with its transport");
                }
            }
        }
    }

    fn check_invariants(&self) {
        // Pair links are mutual and never dangle.
        for token in self.mux.tokens() {
            if let Some(peer) = self.mux.peer_of(token) {
                assert!(self.mux.contains(peer), "peer link dangles");
                assert_eq!(
                    self.mux.peer_of(peer),
                    Some(token),
                    "peer link is not mutual"
                );
            }
        }

        // Registered ids are unique and non-zero.
        let ids: Vec<u32> = self
            .mux
            .main_tokens()
            .iter()
            .map(|&t| self.mux.raw_id(t))
            .collect();
        assert!(ids.iter().all(|&id| id != 0), "registered socket with id 0");
        let unique: HashSet<u32> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate registered ids");

        // List discipline: closing flag and queue state match the lists.
        assert!(self.mux.debug_check_lists(), "list discipline violated");

        // A socket appears in at most one list.
        let main: HashSet<SocketToken> = self.mux.main_tokens().into_iter().collect();
        let closing: HashSet<SocketToken> = self.mux.closing_tokens().into_iter().collect();
        assert!(main.is_disjoint(&closing), "socket on both lists");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_under_random_interleavings(
        ops in prop::collection::vec(arb_op(), 1..80),
    ) {
        let mut harness = Harness::new();
        for op in &ops {
            harness.apply(op);
            harness.check_invariants();
        }
    }

    #[test]
    fn delivery_preserves_enqueue_order(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..16), 1..16),
        budgets in prop::collection::vec(0usize..8, 1..64),
    ) {
        let mut mux = SocketMux::new(BridgeSide::Host);
        let mut hooks = NoHooks;
        let stream = ChaosStream::new(Vec::new(), 0);
        let token = mux.create_local_socket(Box::new(stream.clone()));

        for chunk in &chunks {
            let packet = Packet::data(BytesMut::from(&chunk[..]));
            let _ = mux.enqueue(token, packet, &mut hooks);
        }

        // Drain with arbitrary write budgets, then unbounded.
        for budget in budgets {
            stream.inner.lock().unwrap().budget += budget;
            mux.handle_fd_event(token, FdEvents::WRITE, &mut hooks);
        }
        stream.inner.lock().unwrap().budget = usize::MAX;
        mux.handle_fd_event(token, FdEvents::WRITE, &mut hooks);

        let expected: Vec<u8> = chunks.concat();
        let written = stream.inner.lock().unwrap().written.clone();
        prop_assert_eq!(written, expected);
    }
}
