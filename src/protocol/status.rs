//! Response status codes
//!
//! The 16-bit status field of a binary response. Anything other than
//! `NoError` is a logical failure, never a codec error.

use std::fmt;

/// Binary response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError,
    KeyNotFound,
    KeyExists,
    ValueTooLarge,
    InvalidArguments,
    ItemNotStored,
    InvalidIncrTarget,
    UnknownCommand,
    OutOfMemory,
    /// A status this client does not know by name
    Other(u16),
}

impl ErrorCode {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0000 => ErrorCode::NoError,
            0x0001 => ErrorCode::KeyNotFound,
            0x0002 => ErrorCode::KeyExists,
            0x0003 => ErrorCode::ValueTooLarge,
            0x0004 => ErrorCode::InvalidArguments,
            0x0005 => ErrorCode::ItemNotStored,
            0x0006 => ErrorCode::InvalidIncrTarget,
            0x0081 => ErrorCode::UnknownCommand,
            0x0082 => ErrorCode::OutOfMemory,
            other => ErrorCode::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ErrorCode::NoError => 0x0000,
            ErrorCode::KeyNotFound => 0x0001,
            ErrorCode::KeyExists => 0x0002,
            ErrorCode::ValueTooLarge => 0x0003,
            ErrorCode::InvalidArguments => 0x0004,
            ErrorCode::ItemNotStored => 0x0005,
            ErrorCode::InvalidIncrTarget => 0x0006,
            ErrorCode::UnknownCommand => 0x0081,
            ErrorCode::OutOfMemory => 0x0082,
            ErrorCode::Other(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == ErrorCode::NoError
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "No error",
            ErrorCode::KeyNotFound => "Key not found",
            ErrorCode::KeyExists => "Key exists",
            ErrorCode::ValueTooLarge => "Value too large",
            ErrorCode::InvalidArguments => "Invalid arguments",
            ErrorCode::ItemNotStored => "Item not stored",
            ErrorCode::InvalidIncrTarget => "Incr/Decr on non-numeric value",
            ErrorCode::UnknownCommand => "Unknown command",
            ErrorCode::OutOfMemory => "Out of memory",
            ErrorCode::Other(_) => "Unrecognized status",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#06x})", self.as_str(), self.as_u16())
    }
}
