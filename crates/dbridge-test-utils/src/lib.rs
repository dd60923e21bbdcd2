//! dbridge-test-utils: Test infrastructure for dbridge.
//!
//! Provides:
//! - MockTransport: records sent packets, with settable state and payload
//!   ceiling
//! - ScriptedStream: canned reads, write budgets, and failure injection
//! - RecordingWatcher: captures readiness registrar traffic
//! - StubHooks: canned service dispatch
//! - encode_request: client-side request framing

mod mock_transport;
mod request;
mod script_stream;
mod stub_hooks;
mod watcher;

pub use mock_transport::MockTransport;
pub use request::encode_request;
pub use script_stream::{ScriptedStream, StreamHandle};
pub use stub_hooks::StubHooks;
pub use watcher::{RecordingWatcher, WatcherEvent};
