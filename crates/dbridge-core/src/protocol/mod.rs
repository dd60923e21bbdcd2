//! Wire protocol for the bridge.
//!
//! This module provides:
//! - Packet and header types with their fixed binary encoding
//! - Service request framing and status replies
//! - Host request routing and serial parsing

mod framing;
mod packet;
mod serial;

#[cfg(test)]
mod proptest;

pub use framing::{decode_request, write_fail, write_okay};
pub use packet::{payload_checksum, Command, Packet, PacketHeader};
pub use serial::{parse_host_request, skip_host_serial, HostRequest};
