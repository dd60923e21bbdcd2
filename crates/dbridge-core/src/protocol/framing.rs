//! Request framing and status replies.
//!
//! This module provides:
//! - The 4-hex-digit length prefix framing used by service requests
//! - Incremental request decoding (partial input returns `Ok(None)`)
//! - The `OKAY` / `FAIL<4-hex-len><message>` status replies written back
//!   to a requesting client
//!
//! The request frame is ASCII: four case-insensitive hex digits giving the
//! request length in bytes, followed by exactly that many request bytes.

use bytes::{BufMut, BytesMut};

use crate::constants::{MAX_PAYLOAD_V1, REQUEST_LEN_DIGITS};
use crate::error::{Error, Result};
use crate::stream::ByteStream;

/// Value returned by [`decode_len_prefix`] for any non-hex digit.
///
/// The sentinel is above every admissible length, so it fails the range
/// check the same way an oversized length does.
const LEN_SENTINEL: u32 = 0xffff_ffff;

/// Decode a hex digit sequence into a length.
///
/// Any character outside `[0-9a-fA-F]` yields [`LEN_SENTINEL`].
fn decode_len_prefix(digits: &[u8]) -> u32 {
    let mut n: u32 = 0;
    for &c in digits {
        let v = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            _ => return LEN_SENTINEL,
        };
        n = (n << 4) | v as u32;
    }
    n
}

/// Decode a framed request from accumulated bytes.
///
/// Returns:
/// - `Ok(Some(request))` when a complete frame is present
/// - `Ok(None)` when more bytes are needed
/// - `Err` when the prefix is not hex or the length is outside
///   `[1, MAX_PAYLOAD_V1]`
///
/// Bytes past the frame are ignored; a request connection carries one
/// framed request at a time.
pub fn decode_request(buf: &[u8]) -> Result<Option<&[u8]>> {
    if buf.len() < REQUEST_LEN_DIGITS {
        return Ok(None);
    }

    let len = decode_len_prefix(&buf[..REQUEST_LEN_DIGITS]) as usize;
    if len < 1 {
        return Err(Error::Framing {
            message: format!("bad size ({len})"),
        });
    }
    if len > MAX_PAYLOAD_V1 {
        return Err(Error::PayloadTooLarge {
            size: len,
            max: MAX_PAYLOAD_V1,
        });
    }

    if REQUEST_LEN_DIGITS + len > buf.len() {
        return Ok(None);
    }

    Ok(Some(&buf[REQUEST_LEN_DIGITS..REQUEST_LEN_DIGITS + len]))
}

// =============================================================================
// Status Replies
// =============================================================================

/// Write the `OKAY` go-ahead to a requesting client.
pub fn write_okay(stream: &mut dyn ByteStream) -> Result<()> {
    write_all(stream, b"OKAY")
}

/// Write a `FAIL` reply with a framed explanation to a requesting client.
pub fn write_fail(stream: &mut dyn ByteStream, message: &str) -> Result<()> {
    let msg = &message.as_bytes()[..message.len().min(0xffff)];
    let mut buf = BytesMut::with_capacity(4 + REQUEST_LEN_DIGITS + msg.len());
    buf.put_slice(b"FAIL");
    buf.put_slice(format!("{:04x}", msg.len()).as_bytes());
    buf.put_slice(msg);
    write_all(stream, &buf)
}

/// Push every byte of `bytes` into the stream.
///
/// Status replies go out on connections that are idle from the client's
/// side, so a stream that cannot take them (`WouldBlock`, zero write) is
/// treated as failed rather than retried.
fn write_all(stream: &mut dyn ByteStream, bytes: &[u8]) -> Result<()> {
    let mut off = 0;
    while off < bytes.len() {
        match stream.write(&bytes[off..]) {
            Ok(0) => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "stream refused status reply",
                )))
            }
            Ok(n) => off += n,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}
