//! Service dispatch seam.
//!
//! The multiplexer decides *when* a service request is acted on; what the
//! services actually are lives with the embedder. [`ServiceHooks`] is the
//! contract: the smart socket and the OPEN handler call through it to open
//! local services, resolve host services, answer host queries, and acquire
//! transports. Tests substitute canned implementations.

use crate::stream::ByteStream;
use crate::transport::{TransportHandle, TransportType};

/// What became of a host request handed to the embedder.
#[derive(Clone)]
pub enum HostRequestOutcome {
    /// The handler answered on the reply stream; the request connection is
    /// done.
    Handled,
    /// The handler bound a transport to the requesting connection for its
    /// subsequent requests.
    SwitchTransport(TransportHandle),
    /// Not a query the handler answers; resolve it as a host service.
    Unhandled,
}

impl std::fmt::Debug for HostRequestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostRequestOutcome::Handled => write!(f, "Handled"),
            HostRequestOutcome::SwitchTransport(_) => write!(f, "SwitchTransport(..)"),
            HostRequestOutcome::Unhandled => write!(f, "Unhandled"),
        }
    }
}

/// Embedder-provided service dispatch.
///
/// All methods are invoked from the multiplexer's thread and must not
/// block; a service that takes time to come up should hand back a stream
/// immediately and produce bytes later.
pub trait ServiceHooks {
    /// Open a device-side service by name, returning its byte stream.
    ///
    /// `None` fails the OPEN that asked for the service.
    fn service_to_fd(
        &mut self,
        name: &str,
        transport: Option<&TransportHandle>,
    ) -> Option<Box<dyn ByteStream>>;

    /// Intercept names with dedicated socket implementations (the JDWP
    /// tracker family). Consulted before [`ServiceHooks::service_to_fd`]
    /// on the device side.
    fn special_service_socket(&mut self, _name: &str) -> Option<Box<dyn ByteStream>> {
        None
    }

    /// Resolve a host-side service (device trackers, forwarders) by name.
    fn host_service_to_socket(
        &mut self,
        name: &str,
        serial: Option<&str>,
    ) -> Option<Box<dyn ByteStream>>;

    /// Answer a host query that needs no relay.
    ///
    /// The handler writes its own OKAY/FAIL framing to `reply` when it
    /// returns [`HostRequestOutcome::Handled`].
    fn handle_host_request(
        &mut self,
        command: &str,
        transport_type: TransportType,
        serial: Option<&str>,
        reply: &mut dyn ByteStream,
    ) -> HostRequestOutcome;

    /// Pick a transport for a device-side request that arrived without one.
    ///
    /// The error string is relayed verbatim to the requesting client.
    fn acquire_one_transport(
        &mut self,
        transport_type: TransportType,
    ) -> std::result::Result<TransportHandle, String>;

    /// Effective uid of this process; gates the `root:`/`unroot:`
    /// exit-on-close rules.
    fn uid(&self) -> u32 {
        0
    }

    /// Whether this is a debuggable build; gates the `root:` rule.
    fn is_debuggable(&self) -> bool {
        false
    }
}
