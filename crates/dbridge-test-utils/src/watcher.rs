//! Recording readiness watcher.

use std::sync::{Arc, Mutex};

use dbridge_core::fdevent::{FdEvents, FdWatcher};
use dbridge_core::SocketToken;

/// One registrar call observed by a [`RecordingWatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherEvent {
    Install(SocketToken),
    Add(SocketToken, FdEvents),
    Del(SocketToken, FdEvents),
    Remove(SocketToken),
}

/// Watcher that records every registrar call.
///
/// Clones share state: hand one clone to the multiplexer, keep the other
/// for assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingWatcher {
    events: Arc<Mutex<Vec<WatcherEvent>>>,
}

impl RecordingWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the observed calls, in order.
    pub fn events(&self) -> Vec<WatcherEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Drain the observed calls.
    pub fn take_events(&self) -> Vec<WatcherEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl FdWatcher for RecordingWatcher {
    fn install(&mut self, token: SocketToken) {
        self.events.lock().unwrap().push(WatcherEvent::Install(token));
    }

    fn add(&mut self, token: SocketToken, events: FdEvents) {
        self.events.lock().unwrap().push(WatcherEvent::Add(token, events));
    }

    fn del(&mut self, token: SocketToken, events: FdEvents) {
        self.events.lock().unwrap().push(WatcherEvent::Del(token, events));
    }

    fn remove(&mut self, token: SocketToken) {
        self.events.lock().unwrap().push(WatcherEvent::Remove(token));
    }
}
