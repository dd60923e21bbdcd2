//! Protocol and configuration constants for dbridge.

// =============================================================================
// Payload Limits
// =============================================================================

/// Absolute ceiling on packet payload size (1 MiB).
///
/// The effective limit for a pair is the minimum of this and both
/// transports' advertised limits; see [`crate::mux::SocketMux::max_payload`].
pub const MAX_PAYLOAD: usize = 1024 * 1024;

/// Legacy payload ceiling, still the bound on smart-socket request length.
pub const MAX_PAYLOAD_V1: usize = 4 * 1024;

// =============================================================================
// Wire Format
// =============================================================================

/// Encoded size of a packet header on the wire (six little-endian u32s).
pub const WIRE_HEADER_LEN: usize = 24;

/// Length of the hex digit prefix framing a smart-socket request.
pub const REQUEST_LEN_DIGITS: usize = 4;
