//! Codec Tests
//!
//! Tests for binary request and response encoding/decoding.

use std::io::Cursor;

use bytes::{BufMut, BytesMut};
use mcpipe::protocol::{
    decode_request, decode_response, encode_request, encode_request_into, encode_response,
    read_response, write_request, ErrorCode, Header, Opcode, RequestFrame, ResponseFrame,
    HEADER_SIZE, MAX_BODY_SIZE, REQUEST_MAGIC, RESPONSE_MAGIC,
};
use mcpipe::McError;

// =============================================================================
// Helper Functions
// =============================================================================

fn set_request() -> RequestFrame {
    let mut extras = BytesMut::new();
    extras.put_u32(2);
    extras.put_u32(300);
    RequestFrame::new(Opcode::Set)
        .with_extras(extras)
        .with_key("user:42")
        .with_value(&b"hello world"[..])
        .with_opaque(7)
        .with_cas(0xDEAD_BEEF_0000_0001)
}

fn response_header(extras_length: u8, key_length: u16, total_body_length: u32) -> Vec<u8> {
    let header = Header {
        magic: RESPONSE_MAGIC,
        opcode: Opcode::Get as u8,
        key_length,
        extras_length,
        data_type: 0,
        status: 0,
        total_body_length,
        opaque: 1,
        cas: 0,
    };
    let mut buf = BytesMut::new();
    header.put(&mut buf);
    buf.to_vec()
}

fn assert_protocol_error<T: std::fmt::Debug>(result: mcpipe::Result<T>) {
    match result {
        Err(McError::Protocol(_)) => {}
        other => panic!("Expected protocol error, got {:?}", other),
    }
}

// =============================================================================
// Request Encoding Tests
// =============================================================================

#[test]
fn test_encode_request_exact_bytes() {
    let frame = RequestFrame::new(Opcode::Get)
        .with_key("foo")
        .with_opaque(0x0102_0304)
        .with_cas(0x0A0B);
    let encoded = encode_request(&frame).unwrap();

    let expected: Vec<u8> = vec![
        0x80, // magic
        0x00, // opcode
        0x00, 0x03, // key length
        0x00, // extras length
        0x00, // data type
        0x00, 0x00, // reserved
        0x00, 0x00, 0x00, 0x03, // total body length
        0x01, 0x02, 0x03, 0x04, // opaque
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0A, 0x0B, // cas
        b'f', b'o', b'o',
    ];
    assert_eq!(&encoded[..], &expected[..]);
}

#[test]
fn test_encode_request_body_order() {
    let encoded = encode_request(&set_request()).unwrap();
    let body = &encoded[HEADER_SIZE..];

    assert_eq!(&body[..8], &[0, 0, 0, 2, 0, 0, 1, 44]);
    assert_eq!(&body[8..15], b"user:42");
    assert_eq!(&body[15..], b"hello world");
}

#[test]
fn test_multi_byte_fields_are_big_endian() {
    let frame = RequestFrame::new(Opcode::Set)
        .with_key(vec![b'k'; 0x0102])
        .with_opaque(0x1122_3344)
        .with_cas(0x0102_0304_0506_0708);
    let encoded = encode_request(&frame).unwrap();

    assert_eq!(&encoded[2..4], &0x0102u16.to_be_bytes());
    assert_eq!(&encoded[8..12], &0x0102u32.to_be_bytes());
    assert_eq!(&encoded[12..16], &0x1122_3344u32.to_be_bytes());
    assert_eq!(&encoded[16..24], &0x0102_0304_0506_0708u64.to_be_bytes());
}

#[test]
fn test_request_round_trip() {
    let frame = set_request();
    let encoded = encode_request(&frame).unwrap();
    let (decoded, consumed) = decode_request(&encoded).unwrap();

    assert_eq!(consumed, encoded.len());
    assert_eq!(decoded, frame);
}

#[test]
fn test_round_trip_empty_sections() {
    let frame = RequestFrame::new(Opcode::Noop).with_opaque(9);
    let encoded = encode_request(&frame).unwrap();
    assert_eq!(encoded.len(), HEADER_SIZE);

    let (decoded, _) = decode_request(&encoded).unwrap();
    assert!(decoded.extras.is_empty());
    assert!(decoded.key.is_empty());
    assert!(decoded.value.is_empty());
}

#[test]
fn test_encode_request_into_appends() {
    let mut buf = BytesMut::new();
    encode_request_into(&RequestFrame::new(Opcode::GetQ).with_key("a"), &mut buf).unwrap();
    encode_request_into(&RequestFrame::new(Opcode::Get).with_key("b"), &mut buf).unwrap();

    let (first, consumed) = decode_request(&buf).unwrap();
    let (second, _) = decode_request(&buf[consumed..]).unwrap();
    assert_eq!(first.opcode, Opcode::GetQ);
    assert_eq!(second.opcode, Opcode::Get);
    assert_eq!(&second.key[..], b"b");
}

#[test]
fn test_write_request_to_stream() {
    let mut out = Vec::new();
    write_request(&mut out, &set_request()).unwrap();
    assert_eq!(out[0], REQUEST_MAGIC);
    assert_eq!(out.len(), HEADER_SIZE + 8 + 7 + 11);
}

#[test]
fn test_oversize_key_is_contract_violation() {
    let frame = RequestFrame::new(Opcode::Get).with_key(vec![b'k'; 65536]);
    assert!(matches!(encode_request(&frame), Err(McError::Contract(_))));
}

#[test]
fn test_oversize_extras_is_contract_violation() {
    let frame = RequestFrame::new(Opcode::Set).with_extras(vec![0u8; 256]);
    assert!(matches!(encode_request(&frame), Err(McError::Contract(_))));
}

#[test]
fn test_encode_request_into_leaves_buffer_on_error() {
    let mut buf = BytesMut::new();
    let frame = RequestFrame::new(Opcode::Get).with_key(vec![b'k'; 70_000]);
    assert!(encode_request_into(&frame, &mut buf).is_err());
    assert!(buf.is_empty());
}

// =============================================================================
// Response Decoding Tests
// =============================================================================

#[test]
fn test_response_round_trip() {
    let frame = ResponseFrame::new(Opcode::Get, ErrorCode::NoError)
        .with_extras(vec![0, 0, 0, 2])
        .with_value(&b"bar"[..])
        .with_opaque(3)
        .with_cas(99);
    let encoded = encode_response(&frame).unwrap();
    let (decoded, consumed) = decode_response(&encoded).unwrap();

    assert_eq!(consumed, encoded.len());
    assert_eq!(decoded, frame);
    assert_eq!(decoded.type_tag(), Some(2));
}

#[test]
fn test_decoded_body_matches_declared_length() {
    let frame = ResponseFrame::new(Opcode::GetK, ErrorCode::NoError)
        .with_extras(vec![0; 4])
        .with_key("key")
        .with_value(vec![1; 100]);
    let encoded = encode_response(&frame).unwrap();
    let header = Header::parse(&encoded).unwrap();
    let (decoded, _) = decode_response(&encoded).unwrap();

    assert_eq!(
        decoded.extras.len() + decoded.key.len() + decoded.value.len(),
        header.total_body_length as usize
    );
}

#[test]
fn test_status_codes_decode() {
    for (status, code) in [
        (ErrorCode::KeyNotFound, 0x0001),
        (ErrorCode::KeyExists, 0x0002),
        (ErrorCode::ItemNotStored, 0x0005),
        (ErrorCode::UnknownCommand, 0x0081),
        (ErrorCode::OutOfMemory, 0x0082),
    ] {
        let frame = ResponseFrame::new(Opcode::Set, status);
        let encoded = encode_response(&frame).unwrap();
        assert_eq!(&encoded[6..8], &(code as u16).to_be_bytes());

        let (decoded, _) = decode_response(&encoded).unwrap();
        assert_eq!(decoded.status, status);
        assert!(!decoded.is_success());
    }
}

#[test]
fn test_unknown_status_is_preserved() {
    assert_eq!(ErrorCode::from_u16(0x0099), ErrorCode::Other(0x0099));
    assert_eq!(ErrorCode::Other(0x0099).as_u16(), 0x0099);
}

#[test]
fn test_type_tag_absent_without_extras() {
    let frame = ResponseFrame::new(Opcode::Get, ErrorCode::NoError).with_value(&b"x"[..]);
    assert_eq!(frame.type_tag(), None);
}

// =============================================================================
// Framing Error Tests
// =============================================================================

#[test]
fn test_request_magic_in_response_stream_is_rejected() {
    let encoded = encode_request(&RequestFrame::new(Opcode::Get).with_key("a")).unwrap();
    assert_protocol_error(decode_response(&encoded));
    assert_protocol_error(read_response(&mut Cursor::new(encoded.to_vec())));
}

#[test]
fn test_garbage_first_byte_is_rejected() {
    let mut bytes = response_header(0, 0, 0);
    bytes[0] = b'V';
    assert_protocol_error(read_response(&mut Cursor::new(bytes)));
}

#[test]
fn test_bad_magic_consumes_only_the_header() {
    let mut bytes = response_header(0, 0, 5);
    bytes[0] = 0x00;
    bytes.extend_from_slice(b"abcde");
    let mut cursor = Cursor::new(bytes);

    assert_protocol_error(read_response(&mut cursor));
    assert_eq!(cursor.position(), HEADER_SIZE as u64);
}

#[test]
fn test_inconsistent_body_length_is_rejected() {
    // 4 bytes of extras and 3 of key cannot fit in a 5 byte body
    let mut bytes = response_header(4, 3, 5);
    bytes.extend_from_slice(&[0; 5]);

    assert_protocol_error(decode_response(&bytes));
    assert_protocol_error(read_response(&mut Cursor::new(bytes)));
}

#[test]
fn test_truncated_body_is_rejected() {
    let frame = ResponseFrame::new(Opcode::Get, ErrorCode::NoError).with_value(vec![7; 32]);
    let encoded = encode_response(&frame).unwrap();
    let truncated = encoded[..encoded.len() - 10].to_vec();

    assert_protocol_error(decode_response(&truncated));
    assert_protocol_error(read_response(&mut Cursor::new(truncated)));
}

#[test]
fn test_truncated_header_is_rejected() {
    let bytes = response_header(0, 0, 0);
    assert_protocol_error(decode_response(&bytes[..10]));
    assert_protocol_error(read_response(&mut Cursor::new(bytes[..10].to_vec())));
}

#[test]
fn test_empty_stream_is_rejected() {
    assert_protocol_error(read_response(&mut Cursor::new(Vec::new())));
}

#[test]
fn test_body_over_limit_is_rejected() {
    let bytes = response_header(0, 0, MAX_BODY_SIZE + 1);
    assert_protocol_error(read_response(&mut Cursor::new(bytes)));
}

#[test]
fn test_unknown_opcode_is_rejected() {
    let mut bytes = response_header(0, 0, 0);
    bytes[1] = 0xEE;
    assert_protocol_error(decode_response(&bytes));
}
