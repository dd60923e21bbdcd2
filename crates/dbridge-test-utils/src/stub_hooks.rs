//! Canned service dispatch for tests.

use std::collections::HashMap;

use dbridge_core::services::{HostRequestOutcome, ServiceHooks};
use dbridge_core::stream::ByteStream;
use dbridge_core::transport::{TransportHandle, TransportType};

use crate::script_stream::{ScriptedStream, StreamHandle};

/// Configurable [`ServiceHooks`] implementation.
///
/// Services resolve to fresh [`ScriptedStream`]s; the handles are kept so
/// tests can script the service side after the fact.
pub struct StubHooks {
    /// Outcome returned by `handle_host_request`.
    pub host_outcome: HostRequestOutcome,
    /// Bytes `handle_host_request` writes to the reply stream first.
    pub host_reply: Vec<u8>,
    /// Names resolvable as host services.
    pub host_services: Vec<String>,
    /// Names resolvable as device services.
    pub local_services: Vec<String>,
    /// Names resolved before ordinary device services.
    pub special_services: Vec<String>,
    /// Transport handed out by `acquire_one_transport`.
    pub transport: Option<TransportHandle>,
    /// Error string when no transport is available.
    pub acquire_error: String,
    /// Effective uid reported to the exit-on-close rules.
    pub uid: u32,
    /// Debuggable-build flag for the exit-on-close rules.
    pub debuggable: bool,
    /// Commands seen by `handle_host_request`, with their serials.
    pub host_requests_seen: Vec<(String, Option<String>)>,
    /// Handles of the streams opened for resolved services, by name.
    pub streams: HashMap<String, StreamHandle>,
}

impl Default for StubHooks {
    fn default() -> Self {
        Self {
            host_outcome: HostRequestOutcome::Unhandled,
            host_reply: Vec::new(),
            host_services: Vec::new(),
            local_services: Vec::new(),
            special_services: Vec::new(),
            transport: None,
            acquire_error: "unknown failure".into(),
            uid: 0,
            debuggable: false,
            host_requests_seen: Vec::new(),
            streams: HashMap::new(),
        }
    }
}

impl StubHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the stream backing a resolved service, if one was opened.
    pub fn service_stream(&self, name: &str) -> Option<&StreamHandle> {
        self.streams.get(name)
    }

    fn open_stream(&mut self, name: &str) -> Box<dyn ByteStream> {
        let (stream, handle) = ScriptedStream::new();
        self.streams.insert(name.to_string(), handle);
        Box::new(stream)
    }
}

impl ServiceHooks for StubHooks {
    fn service_to_fd(
        &mut self,
        name: &str,
        _transport: Option<&TransportHandle>,
    ) -> Option<Box<dyn ByteStream>> {
        if self.local_services.iter().any(|s| s == name) {
            Some(self.open_stream(name))
        } else {
            None
        }
    }

    fn special_service_socket(&mut self, name: &str) -> Option<Box<dyn ByteStream>> {
        if self.special_services.iter().any(|s| s == name) {
            Some(self.open_stream(name))
        } else {
            None
        }
    }

    fn host_service_to_socket(
        &mut self,
        name: &str,
        _serial: Option<&str>,
    ) -> Option<Box<dyn ByteStream>> {
        if self.host_services.iter().any(|s| s == name) {
            Some(self.open_stream(name))
        } else {
            None
        }
    }

    fn handle_host_request(
        &mut self,
        command: &str,
        _transport_type: TransportType,
        serial: Option<&str>,
        reply: &mut dyn ByteStream,
    ) -> HostRequestOutcome {
        self.host_requests_seen
            .push((command.to_string(), serial.map(str::to_owned)));
        let mut off = 0;
        while off < self.host_reply.len() {
            match reply.write(&self.host_reply[off..]) {
                Ok(n) if n > 0 => off += n,
                _ => break,
            }
        }
        self.host_outcome.clone()
    }

    fn acquire_one_transport(
        &mut self,
        _transport_type: TransportType,
    ) -> std::result::Result<TransportHandle, String> {
        self.transport.clone().ok_or_else(|| self.acquire_error.clone())
    }

    fn uid(&self) -> u32 {
        self.uid
    }

    fn is_debuggable(&self) -> bool {
        self.debuggable
    }
}
