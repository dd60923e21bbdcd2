//! Property-based tests for the wire protocol.
//!
//! These tests use proptest to verify:
//! - Header roundtrip for arbitrary field values
//! - Request framing roundtrip for arbitrary request bytes
//! - Parsers never panic on arbitrary input

#![cfg(test)]

use bytes::BytesMut;
use proptest::prelude::*;

use crate::constants::MAX_PAYLOAD_V1;
use crate::protocol::{
    decode_request, parse_host_request, skip_host_serial, Command, Packet, PacketHeader,
};

/// Frame a request the way a client does, independently of the decoder.
fn framed(request: &[u8]) -> BytesMut {
    let mut buf = BytesMut::from(format!("{:04x}", request.len()).as_bytes());
    buf.extend_from_slice(request);
    buf
}

fn arb_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Open),
        Just(Command::Okay),
        Just(Command::Write),
        Just(Command::Close),
    ]
}

proptest! {
    #[test]
    fn header_roundtrip(
        command in arb_command(),
        arg0 in any::<u32>(),
        arg1 in any::<u32>(),
        payload in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut header = PacketHeader::new(command, arg0, arg1);
        header.finish(&payload);

        let encoded = header.encode();
        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = PacketHeader::decode(&mut buf).unwrap().unwrap();

        prop_assert_eq!(decoded, header);
        prop_assert!(decoded.verify(&payload));
    }

    #[test]
    fn header_decode_never_panics(raw in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut buf = BytesMut::from(&raw[..]);
        let _ = PacketHeader::decode(&mut buf);
    }

    #[test]
    fn request_framing_roundtrip(
        request in prop::collection::vec(any::<u8>(), 1..=MAX_PAYLOAD_V1),
    ) {
        let framed = framed(&request);
        let decoded = decode_request(&framed).unwrap().unwrap();
        prop_assert_eq!(decoded, &request[..]);
    }

    #[test]
    fn request_decode_never_panics(raw in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_request(&raw);
    }

    #[test]
    fn framed_prefix_never_decodes_early(
        request in prop::collection::vec(any::<u8>(), 1..=MAX_PAYLOAD_V1),
        cut in any::<prop::sample::Index>(),
    ) {
        let framed = framed(&request);
        // Any strict prefix waits for more bytes; it never yields a
        // request.
        let cut = cut.index(framed.len());
        prop_assert!(matches!(decode_request(&framed[..cut]), Ok(None)));
    }

    #[test]
    fn serial_parser_never_panics(service in "[ -~]{0,64}") {
        let _ = skip_host_serial(&service);
        let _ = parse_host_request(&service);
    }

    #[test]
    fn serial_split_points_at_a_colon(service in "[ -~]{0,64}") {
        if let Some(sep) = skip_host_serial(&service) {
            prop_assert_eq!(service.as_bytes()[sep], b':');
        }
    }

    #[test]
    fn packet_cursor_is_consistent(
        payload in prop::collection::vec(any::<u8>(), 0..512),
        step in 1usize..64,
    ) {
        let total = payload.len();
        let mut packet = Packet::data(BytesMut::from(&payload[..]));
        let mut consumed = 0;
        while !packet.is_drained() {
            let n = step.min(packet.remaining());
            packet.advance(n);
            consumed += n;
        }
        prop_assert_eq!(consumed, total);
    }
}
