//! dbridge-core: Socket multiplexing core for the dbridge debug bridge.
//!
//! This crate provides:
//! - Paired logical sockets relaying byte streams over a device transport
//! - Credit-based flow control (OPEN/OKAY/WRTE/CLSE)
//! - The smart socket that parses service requests and rewires pairs
//! - Wire packet types and request framing
//! - Seams for the transport layer, service dispatch, and the event loop
//! - Logging setup
//!
//! The multiplexer itself never performs blocking I/O and owns no event
//! loop: the embedder feeds it readiness events and inbound packets, and
//! it expresses interest changes back through a watcher.

pub mod constants;
pub mod error;
pub mod fdevent;
pub mod logging;
pub mod mux;
pub mod protocol;
pub mod services;
pub mod stream;
pub mod transport;

pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
pub use mux::{BridgeSide, EnqueueResult, ExitRequest, SocketMux, SocketToken};
