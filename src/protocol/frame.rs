//! Frame definitions
//!
//! In-memory form of binary protocol requests and responses.
//!
//! ## Header Layout (24 bytes, all integers big-endian)
//! ```text
//! ┌─────────┬─────────┬──────────────┬────────────┬───────────┬──────────────────┐
//! │Magic (1)│Opcode(1)│ Key len (2)  │ Extras (1) │ Type (1)  │ Status/Rsvd (2)  │
//! ├─────────┴─────────┴──────────────┴────────────┴───────────┴──────────────────┤
//! │ Total body length (4)                                                        │
//! ├──────────────────────────────────────────────────────────────────────────────┤
//! │ Opaque (4)                                                                   │
//! ├──────────────────────────────────────────────────────────────────────────────┤
//! │ CAS (8)                                                                      │
//! └──────────────────────────────────────────────────────────────────────────────┘
//! ```
//! The body follows as Extras ‖ Key ‖ Value.

use bytes::{Buf, BufMut, Bytes};

use crate::error::{McError, Result};

use super::{ErrorCode, Opcode};

/// Magic byte for request frames
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte for response frames
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Fixed header size
pub const HEADER_SIZE: usize = 24;

/// Largest body accepted from the wire (128 MB)
pub const MAX_BODY_SIZE: u32 = 128 * 1024 * 1024;

// =============================================================================
// Header
// =============================================================================

/// Raw 24-byte header shared by requests and responses.
///
/// `status` is the reserved field on requests and the error code on responses.
/// Every multi-byte field is read and written here, so byte order is handled
/// in exactly one place for both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u8,
    pub opcode: u8,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    pub status: u16,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl Header {
    /// Parse a header from the first HEADER_SIZE bytes of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(McError::Protocol(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        let mut buf = &data[..HEADER_SIZE];
        Ok(Self {
            magic: buf.get_u8(),
            opcode: buf.get_u8(),
            key_length: buf.get_u16(),
            extras_length: buf.get_u8(),
            data_type: buf.get_u8(),
            status: buf.get_u16(),
            total_body_length: buf.get_u32(),
            opaque: buf.get_u32(),
            cas: buf.get_u64(),
        })
    }

    /// Append the header to `buf`
    pub fn put<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.magic);
        buf.put_u8(self.opcode);
        buf.put_u16(self.key_length);
        buf.put_u8(self.extras_length);
        buf.put_u8(self.data_type);
        buf.put_u16(self.status);
        buf.put_u32(self.total_body_length);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);
    }

    /// Length of the value section.
    ///
    /// Fails when the declared body is shorter than extras plus key.
    pub fn value_length(&self) -> Result<usize> {
        let fixed = self.extras_length as u32 + self.key_length as u32;
        self.total_body_length
            .checked_sub(fixed)
            .map(|len| len as usize)
            .ok_or_else(|| {
                McError::Protocol(format!(
                    "Inconsistent body length: body {} < extras {} + key {}",
                    self.total_body_length, self.extras_length, self.key_length
                ))
            })
    }

    /// Validate magic and body length against the frame direction
    pub fn check(&self, expected_magic: u8) -> Result<()> {
        if self.magic != expected_magic {
            return Err(McError::Protocol(format!(
                "Invalid magic byte: expected 0x{:02x}, got 0x{:02x}",
                expected_magic, self.magic
            )));
        }
        if self.total_body_length > MAX_BODY_SIZE {
            return Err(McError::Protocol(format!(
                "Body too large: {} bytes (max {})",
                self.total_body_length, MAX_BODY_SIZE
            )));
        }
        self.value_length().map(|_| ())
    }

    pub fn opcode(&self) -> Result<Opcode> {
        Opcode::from_u8(self.opcode)
            .ok_or_else(|| McError::Protocol(format!("Unknown opcode: 0x{:02x}", self.opcode)))
    }
}

// =============================================================================
// Request Frame
// =============================================================================

/// A binary request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub opcode: Opcode,
    pub opaque: u32,
    pub cas: u64,
    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl RequestFrame {
    /// Create an empty request for `opcode`
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            opaque: 0,
            cas: 0,
            extras: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Bytes>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    /// Extras + key + value length
    pub fn body_length(&self) -> usize {
        self.extras.len() + self.key.len() + self.value.len()
    }
}

// =============================================================================
// Response Frame
// =============================================================================

/// A binary response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub opcode: Opcode,
    pub status: ErrorCode,
    pub opaque: u32,
    pub cas: u64,
    pub extras: Bytes,
    pub key: Bytes,
    pub value: Bytes,
}

impl ResponseFrame {
    /// Create an empty response
    pub fn new(opcode: Opcode, status: ErrorCode) -> Self {
        Self {
            opcode,
            status,
            opaque: 0,
            cas: 0,
            extras: Bytes::new(),
            key: Bytes::new(),
            value: Bytes::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_extras(mut self, extras: impl Into<Bytes>) -> Self {
        self.extras = extras.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Bytes>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_opaque(mut self, opaque: u32) -> Self {
        self.opaque = opaque;
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Extras + key + value length
    pub fn body_length(&self) -> usize {
        self.extras.len() + self.key.len() + self.value.len()
    }

    /// Serialized-type tag from extras bytes 2..4 (low 16 bits of the flags word)
    pub fn type_tag(&self) -> Option<u16> {
        if self.extras.len() >= 4 {
            Some((&self.extras[2..4]).get_u16())
        } else {
            None
        }
    }
}
