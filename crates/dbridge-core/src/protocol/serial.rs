//! Host request dispatch and serial parsing.
//!
//! Host-side requests select a target device before naming a command:
//! - `host-serial:<serial>:<cmd>`: a specific device by serial
//! - `host-usb:<cmd>`: the single USB-attached device
//! - `host-local:<cmd>`: the single network-emulated device
//! - `host:<cmd>`: whatever device is available
//!
//! Serials are not self-delimiting: they may carry `tcp:`/`udp:` protocol
//! prefixes, a `<prefix>:` qualifier, a trailing `:<port>`, or a bracketed
//! IPv6 address, all of which contain the same `:` used to separate the
//! command. [`skip_host_serial`] finds the separator that actually starts
//! the command.

use crate::transport::TransportType;

/// A parsed host-side request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRequest<'a> {
    /// Which transport kind the request targets.
    pub transport_type: TransportType,
    /// Specific device serial, when the request names one.
    pub serial: Option<&'a str>,
    /// The command following the routing prefix.
    pub command: &'a str,
}

/// Split a host-prefixed request into routing information and command.
///
/// Returns `None` when `service` carries no host prefix, which means the
/// request is a device-side service name.
pub fn parse_host_request(service: &str) -> Option<HostRequest<'_>> {
    if let Some(rest) = service.strip_prefix("host-serial:") {
        // The serial may be a host:port form; find the command separator.
        if let Some(sep) = skip_host_serial(rest) {
            return Some(HostRequest {
                transport_type: TransportType::Any,
                serial: Some(&rest[..sep]),
                command: &rest[sep + 1..],
            });
        }
        return Some(HostRequest {
            transport_type: TransportType::Any,
            serial: None,
            command: rest,
        });
    }
    if let Some(rest) = service.strip_prefix("host-usb:") {
        return Some(HostRequest {
            transport_type: TransportType::Usb,
            serial: None,
            command: rest,
        });
    }
    if let Some(rest) = service.strip_prefix("host-local:") {
        return Some(HostRequest {
            transport_type: TransportType::Local,
            serial: None,
            command: rest,
        });
    }
    if let Some(rest) = service.strip_prefix("host:") {
        return Some(HostRequest {
            transport_type: TransportType::Any,
            serial: None,
            command: rest,
        });
    }
    None
}

/// Find the byte index of the `:` separating a serial from its command.
///
/// The serial may be any of:
/// - `[tcp:|udp:]<serial>[:<port>]`, with the protocol prefix consumed
///   if present
/// - `<prefix>:<serial>` with prefix in `{usb, product, model, device}`
/// - `[<ipv6>]` optionally followed by `:<port>`
///
/// A `:<port>` suffix is recognized only when the segment after the first
/// colon is all decimal digits and ends with another colon; otherwise that
/// first colon is the command separator. Returns `None` when no separator
/// exists.
pub fn skip_host_serial(service: &str) -> Option<usize> {
    const QUALIFIERS: [&str; 4] = ["usb:", "product:", "model:", "device:"];

    for qualifier in QUALIFIERS {
        if let Some(rest) = service.strip_prefix(qualifier) {
            return rest.find(':').map(|i| qualifier.len() + i);
        }
    }

    // Protocol prefixes are part of the serial but never contain the
    // command separator.
    let mut pos = 0;
    if service.starts_with("tcp:") || service.starts_with("udp:") {
        pos = 4;
    }

    // Bracketed IPv6 serials keep their inner colons.
    if service[pos..].starts_with('[') {
        if let Some(end) = service[pos..].find(']') {
            pos += end;
        }
    }

    let colon = pos + service[pos..].find(':')?;

    // A digits-only segment ending in another colon is a port, and the
    // command starts after it.
    let bytes = service.as_bytes();
    let mut end = colon + 1;
    if end < bytes.len() && bytes[end].is_ascii_digit() {
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end < bytes.len() && bytes[end] == b':' {
            return Some(end);
        }
    }
    Some(colon)
}
