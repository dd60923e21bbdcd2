//! Error types for dbridge-core.
//!
//! Most failures inside the multiplexer do not surface as errors at all:
//! they close the affected socket and let the pair-teardown cascade carry
//! the loss of liveness to the peer. The `Error` type covers the API edges
//! where a value-shaped error is the right answer: framing and parsing,
//! status replies, and logging setup.

use thiserror::Error;

/// Main error type for dbridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from an underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request framing (bad hex prefix, out-of-range length).
    #[error("framing error: {message}")]
    Framing { message: String },

    /// A payload exceeds the negotiated ceiling.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Convenience result type for dbridge operations.
pub type Result<T> = std::result::Result<T, Error>;
