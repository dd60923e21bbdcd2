//! Packet types for the bridge wire protocol.
//!
//! This module provides:
//! - The four protocol commands and their wire values
//! - The fixed 24-byte little-endian packet header
//! - The owned packet type carried between sockets and transports
//!
//! A packet has exactly one owner at any instant: handing it to a socket's
//! enqueue operation or to a transport moves it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::WIRE_HEADER_LEN;
use crate::error::{Error, Result};

// =============================================================================
// Commands
// =============================================================================

/// Protocol command carried in a packet header.
///
/// Wire values are the command's ASCII name read as a little-endian u32,
/// so they appear as readable text in hex dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Open a stream to a named destination service.
    Open,
    /// Acknowledge a packet; grants the sender one more write.
    Okay,
    /// Carry stream payload bytes.
    Write,
    /// Close one half of a pair.
    Close,
}

impl Command {
    /// Encode to the wire value.
    pub fn to_wire(self) -> u32 {
        match self {
            Command::Open => u32::from_le_bytes(*b"OPEN"),
            Command::Okay => u32::from_le_bytes(*b"OKAY"),
            Command::Write => u32::from_le_bytes(*b"WRTE"),
            Command::Close => u32::from_le_bytes(*b"CLSE"),
        }
    }

    /// Decode from the wire value.
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            v if v == Command::Open.to_wire() => Some(Command::Open),
            v if v == Command::Okay.to_wire() => Some(Command::Okay),
            v if v == Command::Write.to_wire() => Some(Command::Write),
            v if v == Command::Close.to_wire() => Some(Command::Close),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Open => write!(f, "OPEN"),
            Command::Okay => write!(f, "OKAY"),
            Command::Write => write!(f, "WRTE"),
            Command::Close => write!(f, "CLSE"),
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// Fixed packet header preceding every payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Protocol command.
    pub command: Command,
    /// First argument; meaning depends on the command.
    pub arg0: u32,
    /// Second argument; meaning depends on the command.
    pub arg1: u32,
    /// Payload length in bytes.
    pub data_length: u32,
    /// Byte sum of the payload.
    pub data_check: u32,
    /// Bitwise complement of the command's wire value.
    pub magic: u32,
}

impl PacketHeader {
    /// Create a header for `command` with an empty payload.
    pub fn new(command: Command, arg0: u32, arg1: u32) -> Self {
        Self {
            command,
            arg0,
            arg1,
            data_length: 0,
            data_check: 0,
            magic: command.to_wire() ^ 0xffff_ffff,
        }
    }

    /// Stamp the length and checksum fields from `payload`.
    pub fn finish(&mut self, payload: &[u8]) {
        self.data_length = payload.len() as u32;
        self.data_check = payload_checksum(payload);
        self.magic = self.command.to_wire() ^ 0xffff_ffff;
    }

    /// Encode to the 24-byte wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(WIRE_HEADER_LEN);
        buf.put_u32_le(self.command.to_wire());
        buf.put_u32_le(self.arg0);
        buf.put_u32_le(self.arg1);
        buf.put_u32_le(self.data_length);
        buf.put_u32_le(self.data_check);
        buf.put_u32_le(self.magic);
        buf.freeze()
    }

    /// Decode from the wire form.
    ///
    /// Returns `Ok(None)` when fewer than [`WIRE_HEADER_LEN`] bytes are
    /// available; the buffer is only consumed on success.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>> {
        if buf.len() < WIRE_HEADER_LEN {
            return Ok(None);
        }

        let raw_command = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let command = Command::from_wire(raw_command).ok_or_else(|| Error::Framing {
            message: format!("unknown command 0x{raw_command:08x}"),
        })?;

        buf.advance(4);
        let arg0 = buf.get_u32_le();
        let arg1 = buf.get_u32_le();
        let data_length = buf.get_u32_le();
        let data_check = buf.get_u32_le();
        let magic = buf.get_u32_le();

        Ok(Some(Self {
            command,
            arg0,
            arg1,
            data_length,
            data_check,
            magic,
        }))
    }

    /// Check the magic and payload checksum fields against `payload`.
    pub fn verify(&self, payload: &[u8]) -> bool {
        self.magic == self.command.to_wire() ^ 0xffff_ffff
            && self.data_length as usize == payload.len()
            && self.data_check == payload_checksum(payload)
    }
}

/// Byte sum of a payload, as carried in [`PacketHeader::data_check`].
pub fn payload_checksum(payload: &[u8]) -> u32 {
    payload.iter().fold(0u32, |sum, &b| sum.wrapping_add(b as u32))
}

// =============================================================================
// Packet
// =============================================================================

/// An owned protocol packet.
///
/// The payload doubles as the write cursor: sockets draining a packet into
/// a stream advance it with [`Packet::advance`], so the bytes still owed
/// are always exactly [`Packet::remaining`].
#[derive(Debug, Clone)]
pub struct Packet {
    /// Protocol header; stamped by the sending socket before transmission.
    pub header: PacketHeader,
    /// Payload bytes not yet delivered.
    pub payload: BytesMut,
}

impl Packet {
    /// Create a data packet from raw stream bytes.
    ///
    /// The header is stamped as WRTE by the remote socket that forwards it;
    /// until then the arguments are zero.
    pub fn data(payload: BytesMut) -> Self {
        let mut header = PacketHeader::new(Command::Write, 0, 0);
        header.finish(&payload);
        Self { header, payload }
    }

    /// Create an empty control packet.
    pub fn control(command: Command, arg0: u32, arg1: u32) -> Self {
        Self {
            header: PacketHeader::new(command, arg0, arg1),
            payload: BytesMut::new(),
        }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.payload.len()
    }

    /// Whether all payload bytes have been consumed.
    pub fn is_drained(&self) -> bool {
        self.payload.is_empty()
    }

    /// Advance the read cursor past `n` delivered bytes.
    pub fn advance(&mut self, n: usize) {
        self.payload.advance(n);
    }
}
