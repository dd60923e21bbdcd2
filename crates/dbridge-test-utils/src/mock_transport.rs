//! Mock transport for testing without real device connections.

use std::sync::Mutex;

use dbridge_core::protocol::Packet;
use dbridge_core::transport::{ConnectionState, Transport};

/// In-memory transport that records every packet handed to it.
///
/// Wrap in an `Arc` to use as a
/// [`TransportHandle`](dbridge_core::transport::TransportHandle); keep a
/// clone to inspect traffic afterwards.
#[derive(Debug)]
pub struct MockTransport {
    sent: Mutex<Vec<Packet>>,
    state: Mutex<ConnectionState>,
    max_payload: usize,
}

impl MockTransport {
    /// Online transport with the default payload ceiling.
    pub fn new() -> Self {
        Self::with_max_payload(dbridge_core::constants::MAX_PAYLOAD)
    }

    /// Online transport advertising a specific payload ceiling.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            state: Mutex::new(ConnectionState::Online),
            max_payload,
        }
    }

    /// Flip the advertised connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Snapshot of every packet sent so far, in order.
    pub fn sent(&self) -> Vec<Packet> {
        self.sent.lock().unwrap().clone()
    }

    /// Drain the recorded packets.
    pub fn take_sent(&self) -> Vec<Packet> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn send_packet(&self, packet: Packet) {
        self.sent.lock().unwrap().push(packet);
    }

    fn max_payload(&self) -> usize {
        self.max_payload
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }
}
