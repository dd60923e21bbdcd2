//! Transport abstractions for dbridge.
//!
//! A transport is the physical connection to one device (or to the host,
//! seen from the device side). The multiplexer never frames bytes onto the
//! wire itself: it hands finished packets to [`Transport::send_packet`] and
//! consults the transport for its payload ceiling and connection state.
//! Real implementations (USB endpoints, TCP links) live with the transport
//! layer; tests use the mock in `dbridge-test-utils`.

use std::fmt;
use std::sync::Arc;

use crate::protocol::Packet;

/// Kind of transport a request wants to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// A USB-attached device.
    Usb,
    /// A network-emulated device.
    Local,
    /// Whatever single device is available.
    Any,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Usb => write!(f, "usb"),
            TransportType::Local => write!(f, "local"),
            TransportType::Any => write!(f, "any"),
        }
    }
}

/// Connection state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The device is connected and answering.
    Online,
    /// The device is known but not currently reachable.
    Offline,
}

/// A physical device connection.
///
/// Handles are shared (`Arc<dyn Transport>`); the multiplexer compares them
/// by pointer identity when tearing down every socket bound to a dying
/// transport.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Queue a finished packet for transmission.
    ///
    /// Packets handed to one transport are emitted in program order.
    fn send_packet(&self, packet: Packet);

    /// The largest payload this transport can carry in one packet.
    fn max_payload(&self) -> usize;

    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;
}

/// Shared handle to a transport.
pub type TransportHandle = Arc<dyn Transport>;

/// Pointer-identity comparison for transport handles.
pub fn same_transport(a: &TransportHandle, b: &TransportHandle) -> bool {
    Arc::ptr_eq(a, b)
}
