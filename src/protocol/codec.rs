//! Protocol codec
//!
//! Encoding and decoding functions for binary protocol frames.
//!
//! ## Wire Format
//! ```text
//! ┌────────────────────┬──────────┬──────────┬─────────────────────┐
//! │  Header (24)       │ Extras   │ Key      │ Value               │
//! └────────────────────┴──────────┴──────────┴─────────────────────┘
//! ```
//! `total body length` in the header always equals
//! `len(Extras) + len(Key) + len(Value)`. Frames that violate this, or carry
//! the wrong magic byte for their direction, are framing errors.

use std::io::{ErrorKind, Read, Write};

use bytes::{Bytes, BytesMut};

use crate::error::{McError, Result};

use super::frame::{Header, HEADER_SIZE, REQUEST_MAGIC, RESPONSE_MAGIC};
use super::{ErrorCode, RequestFrame, ResponseFrame};

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
pub fn encode_request(frame: &RequestFrame) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + frame.body_length());
    encode_request_into(frame, &mut buf)?;
    Ok(buf)
}

/// Append an encoded request to `buf`
///
/// Fails without touching `buf` if a section overflows its length field.
pub fn encode_request_into(frame: &RequestFrame, buf: &mut BytesMut) -> Result<()> {
    let (extras_length, key_length, total_body_length) =
        section_lengths(&frame.extras, &frame.key, &frame.value)?;

    let header = Header {
        magic: REQUEST_MAGIC,
        opcode: frame.opcode as u8,
        key_length,
        extras_length,
        data_type: 0,
        status: 0,
        total_body_length,
        opaque: frame.opaque,
        cas: frame.cas,
    };

    buf.reserve(HEADER_SIZE + total_body_length as usize);
    header.put(buf);
    buf.extend_from_slice(&frame.extras);
    buf.extend_from_slice(&frame.key);
    buf.extend_from_slice(&frame.value);
    Ok(())
}

/// Decode a request from bytes
///
/// Returns the request and the number of bytes consumed
pub fn decode_request(bytes: &[u8]) -> Result<(RequestFrame, usize)> {
    let (header, body, consumed) = split_frame(bytes, REQUEST_MAGIC)?;
    let (extras, key, value) = split_body(&header, body)?;

    let frame = RequestFrame {
        opcode: header.opcode()?,
        opaque: header.opaque,
        cas: header.cas,
        extras,
        key,
        value,
    };
    Ok((frame, consumed))
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(frame: &ResponseFrame) -> Result<BytesMut> {
    let (extras_length, key_length, total_body_length) =
        section_lengths(&frame.extras, &frame.key, &frame.value)?;

    let header = Header {
        magic: RESPONSE_MAGIC,
        opcode: frame.opcode as u8,
        key_length,
        extras_length,
        data_type: 0,
        status: frame.status.as_u16(),
        total_body_length,
        opaque: frame.opaque,
        cas: frame.cas,
    };

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + total_body_length as usize);
    header.put(&mut buf);
    buf.extend_from_slice(&frame.extras);
    buf.extend_from_slice(&frame.key);
    buf.extend_from_slice(&frame.value);
    Ok(buf)
}

/// Decode a response from bytes
///
/// Returns the response and the number of bytes consumed
pub fn decode_response(bytes: &[u8]) -> Result<(ResponseFrame, usize)> {
    let (header, body, consumed) = split_frame(bytes, RESPONSE_MAGIC)?;
    let frame = response_from_parts(&header, body)?;
    Ok((frame, consumed))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read a complete request from a stream
pub fn read_request<R: Read>(reader: &mut R) -> Result<RequestFrame> {
    let (header, body) = read_frame(reader, REQUEST_MAGIC)?;
    let (extras, key, value) = split_body(&header, body)?;
    Ok(RequestFrame {
        opcode: header.opcode()?,
        opaque: header.opaque,
        cas: header.cas,
        extras,
        key,
        value,
    })
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, frame: &RequestFrame) -> Result<()> {
    let bytes = encode_request(frame)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
///
/// Blocks until the whole frame has arrived. The header is checked before
/// the body is read, so a bad magic byte never consumes more than 24 bytes.
pub fn read_response<R: Read>(reader: &mut R) -> Result<ResponseFrame> {
    let (header, body) = read_frame(reader, RESPONSE_MAGIC)?;
    response_from_parts(&header, body)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, frame: &ResponseFrame) -> Result<()> {
    let bytes = encode_response(frame)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Internal helpers
// =============================================================================

fn section_lengths(extras: &[u8], key: &[u8], value: &[u8]) -> Result<(u8, u16, u32)> {
    let extras_length = u8::try_from(extras.len()).map_err(|_| {
        McError::Contract(format!("Extras too long: {} bytes (max 255)", extras.len()))
    })?;
    let key_length = u16::try_from(key.len()).map_err(|_| {
        McError::Contract(format!("Key too long: {} bytes (max 65535)", key.len()))
    })?;
    let total = extras.len() + key.len() + value.len();
    let total_body_length = u32::try_from(total)
        .map_err(|_| McError::Contract(format!("Body too long: {} bytes", total)))?;
    Ok((extras_length, key_length, total_body_length))
}

fn split_frame(bytes: &[u8], magic: u8) -> Result<(Header, Bytes, usize)> {
    let header = Header::parse(bytes)?;
    header.check(magic)?;

    let total_len = HEADER_SIZE + header.total_body_length as usize;
    if bytes.len() < total_len {
        return Err(McError::Protocol(format!(
            "Incomplete body: expected {} bytes, got {}",
            total_len,
            bytes.len()
        )));
    }

    let body = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total_len]);
    Ok((header, body, total_len))
}

fn read_frame<R: Read>(reader: &mut R, magic: u8) -> Result<(Header, Bytes)> {
    let mut header_bytes = [0u8; HEADER_SIZE];
    read_fully(reader, &mut header_bytes)?;

    let header = Header::parse(&header_bytes)?;
    header.check(magic)?;

    let mut body = vec![0u8; header.total_body_length as usize];
    if !body.is_empty() {
        read_fully(reader, &mut body)?;
    }
    Ok((header, Bytes::from(body)))
}

/// `read_exact` that reports a short stream as a framing error
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => McError::Protocol(format!(
            "Premature end of stream while reading {} bytes",
            buf.len()
        )),
        _ => McError::Io(e),
    })
}

fn split_body(header: &Header, mut body: Bytes) -> Result<(Bytes, Bytes, Bytes)> {
    let value_length = header.value_length()?;
    let extras = body.split_to(header.extras_length as usize);
    let key = body.split_to(header.key_length as usize);
    debug_assert_eq!(body.len(), value_length);
    Ok((extras, key, body))
}

fn response_from_parts(header: &Header, body: Bytes) -> Result<ResponseFrame> {
    let (extras, key, value) = split_body(header, body)?;
    Ok(ResponseFrame {
        opcode: header.opcode()?,
        status: ErrorCode::from_u16(header.status),
        opaque: header.opaque,
        cas: header.cas,
        extras,
        key,
        value,
    })
}
