//! Value serialization
//!
//! Values are stored as raw bytes plus a 16-bit type tag. The tag travels in
//! the low 16 bits of the binary flags word, and as the decimal flags token
//! in text commands, so any client sharing the tag table can rebuild the
//! original value.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{McError, Result};

/// Type tag stored alongside every value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum SerializedType {
    ByteArray = 0,
    Object = 1,
    String = 2,
    Bool = 4,
    Byte = 6,
    Short = 7,
    UShort = 8,
    Int = 9,
    UInt = 10,
    Long = 11,
    ULong = 12,
    Float = 13,
    Double = 14,
}

impl SerializedType {
    pub fn from_u16(tag: u16) -> Option<Self> {
        let ty = match tag {
            0 => SerializedType::ByteArray,
            1 => SerializedType::Object,
            2 => SerializedType::String,
            4 => SerializedType::Bool,
            6 => SerializedType::Byte,
            7 => SerializedType::Short,
            8 => SerializedType::UShort,
            9 => SerializedType::Int,
            10 => SerializedType::UInt,
            11 => SerializedType::Long,
            12 => SerializedType::ULong,
            13 => SerializedType::Float,
            14 => SerializedType::Double,
            _ => return None,
        };
        Some(ty)
    }
}

// =============================================================================
// Value
// =============================================================================

/// A cacheable value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bytes(Bytes),
    /// bincode-encoded serde value, see [`Value::object`]
    Object(Bytes),
    Str(String),
    Bool(bool),
    Byte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
}

impl Value {
    /// Encode any serde value as an `Object`
    pub fn object<T: Serialize>(value: &T) -> Result<Self> {
        let bytes = bincode::serialize(value)
            .map_err(|e| McError::Serialization(format!("bincode encode failed: {}", e)))?;
        Ok(Value::Object(Bytes::from(bytes)))
    }

    /// Decode an `Object` back into `T`
    pub fn decode_object<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Value::Object(bytes) => bincode::deserialize(bytes)
                .map_err(|e| McError::Serialization(format!("bincode decode failed: {}", e))),
            other => Err(McError::Serialization(format!(
                "expected an object value, found {:?}",
                other.serialized_type()
            ))),
        }
    }

    pub fn serialized_type(&self) -> SerializedType {
        match self {
            Value::Bytes(_) => SerializedType::ByteArray,
            Value::Object(_) => SerializedType::Object,
            Value::Str(_) => SerializedType::String,
            Value::Bool(_) => SerializedType::Bool,
            Value::Byte(_) => SerializedType::Byte,
            Value::Short(_) => SerializedType::Short,
            Value::UShort(_) => SerializedType::UShort,
            Value::Int(_) => SerializedType::Int,
            Value::UInt(_) => SerializedType::UInt,
            Value::Long(_) => SerializedType::Long,
            Value::ULong(_) => SerializedType::ULong,
            Value::Float(_) => SerializedType::Float,
            Value::Double(_) => SerializedType::Double,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) | Value::Object(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(b))
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::ULong(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Turns values into wire bytes and back
pub trait ValueCodec: Send + Sync {
    /// Returns the payload and its type tag
    fn serialize(&self, value: &Value, compression_threshold: usize) -> Result<(Bytes, u16)>;

    fn deserialize(&self, bytes: Bytes, type_tag: u16) -> Result<Value>;
}

/// Default codec: fixed-width little-endian numbers, UTF-8 strings, no compression.
///
/// Unknown tags come back as raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedCodec;

impl ValueCodec for TypedCodec {
    fn serialize(&self, value: &Value, _compression_threshold: usize) -> Result<(Bytes, u16)> {
        let bytes = match value {
            Value::Bytes(b) | Value::Object(b) => b.clone(),
            Value::Str(s) => Bytes::copy_from_slice(s.as_bytes()),
            Value::Bool(v) => Bytes::copy_from_slice(&[*v as u8]),
            Value::Byte(v) => Bytes::copy_from_slice(&[*v]),
            Value::Short(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::UShort(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::Int(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::UInt(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::Long(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::ULong(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::Float(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
            Value::Double(v) => Bytes::copy_from_slice(&v.to_le_bytes()),
        };
        Ok((bytes, value.serialized_type() as u16))
    }

    fn deserialize(&self, bytes: Bytes, type_tag: u16) -> Result<Value> {
        let ty = match SerializedType::from_u16(type_tag) {
            Some(ty) => ty,
            None => return Ok(Value::Bytes(bytes)),
        };

        let value = match ty {
            SerializedType::ByteArray => Value::Bytes(bytes),
            SerializedType::Object => Value::Object(bytes),
            SerializedType::String => Value::Str(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| McError::Serialization(format!("invalid UTF-8: {}", e)))?,
            ),
            SerializedType::Bool => Value::Bool(fixed::<1>(&bytes, ty)?[0] != 0),
            SerializedType::Byte => Value::Byte(fixed::<1>(&bytes, ty)?[0]),
            SerializedType::Short => Value::Short(i16::from_le_bytes(fixed(&bytes, ty)?)),
            SerializedType::UShort => Value::UShort(u16::from_le_bytes(fixed(&bytes, ty)?)),
            SerializedType::Int => Value::Int(i32::from_le_bytes(fixed(&bytes, ty)?)),
            SerializedType::UInt => Value::UInt(u32::from_le_bytes(fixed(&bytes, ty)?)),
            SerializedType::Long => Value::Long(i64::from_le_bytes(fixed(&bytes, ty)?)),
            SerializedType::ULong => Value::ULong(u64::from_le_bytes(fixed(&bytes, ty)?)),
            SerializedType::Float => Value::Float(f32::from_le_bytes(fixed(&bytes, ty)?)),
            SerializedType::Double => Value::Double(f64::from_le_bytes(fixed(&bytes, ty)?)),
        };
        Ok(value)
    }
}

fn fixed<const N: usize>(bytes: &[u8], ty: SerializedType) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        McError::Serialization(format!(
            "{:?} needs {} bytes, got {}",
            ty,
            N,
            bytes.len()
        ))
    })
}
