//! Client-side request framing.

use bytes::BytesMut;

/// Frame a service request with its 4-hex-digit length prefix, the way a
/// client frames it before sending it to the bridge.
pub fn encode_request(request: &[u8]) -> BytesMut {
    debug_assert!(request.len() <= 0xffff);
    let mut buf = BytesMut::with_capacity(4 + request.len());
    buf.extend_from_slice(format!("{:04x}", request.len()).as_bytes());
    buf.extend_from_slice(request);
    buf
}
