//! Readiness events and the watcher seam to the event loop.
//!
//! The multiplexer does not own an event loop. It expresses interest in
//! read/write readiness for each fd-backed socket through an [`FdWatcher`],
//! and the embedder's loop calls back into
//! [`crate::mux::SocketMux::handle_fd_event`] when readiness fires.

use bitflags::bitflags;

use crate::mux::SocketToken;

bitflags! {
    /// Readiness interest / event bits for an fd-backed socket.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FdEvents: u8 {
        /// Bytes may be readable.
        const READ = 0b001;
        /// The stream may accept more bytes.
        const WRITE = 0b010;
        /// The stream is in an error state.
        const ERROR = 0b100;
    }
}

/// Registrar for readiness notifications.
///
/// `install` is called once when a local socket is created and `remove`
/// once when it is destroyed; `add`/`del` adjust the interest set in
/// between. All calls are idempotent from the watcher's point of view: the
/// multiplexer only forwards actual interest transitions. After `remove`
/// the socket's stream is dropped, which releases the underlying fd.
pub trait FdWatcher: Send {
    /// Begin watching a socket's stream.
    fn install(&mut self, token: SocketToken);

    /// Add bits to the socket's interest set.
    fn add(&mut self, token: SocketToken, events: FdEvents);

    /// Remove bits from the socket's interest set.
    fn del(&mut self, token: SocketToken, events: FdEvents);

    /// Stop watching a socket's stream entirely.
    fn remove(&mut self, token: SocketToken);
}

/// Watcher that discards all notifications.
///
/// Useful for embedders that poll interest through
/// [`crate::mux::SocketMux::interest`] instead, and for tests that do not
/// care about registrar traffic.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWatcher;

impl FdWatcher for NullWatcher {
    fn install(&mut self, _token: SocketToken) {}
    fn add(&mut self, _token: SocketToken, _events: FdEvents) {}
    fn del(&mut self, _token: SocketToken, _events: FdEvents) {}
    fn remove(&mut self, _token: SocketToken) {}
}
