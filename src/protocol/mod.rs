//! Protocol Module
//!
//! Binary protocol framing and the opcode table.
//!
//! ## Frame Format
//! ```text
//! ┌────────────────────┬──────────┬──────────┬─────────────────────┐
//! │  Header (24)       │ Extras   │ Key      │ Value               │
//! └────────────────────┴──────────┴──────────┴─────────────────────┘
//! ```
//!
//! ### Magic
//! - 0x80: request
//! - 0x81: response
//!
//! ### Status Codes
//! - 0x0000: NO_ERROR
//! - 0x0001: KEY_NOT_FOUND
//! - 0x0002: KEY_EXISTS
//! - 0x0003: VALUE_TOO_LARGE
//! - 0x0004: INVALID_ARGUMENTS
//! - 0x0005: ITEM_NOT_STORED
//! - 0x0006: INVALID_INCR_TARGET
//! - 0x0081: UNKNOWN_COMMAND
//! - 0x0082: OUT_OF_MEMORY

mod command;
mod opcode;
mod status;
mod frame;
mod codec;

pub use command::Command;
pub use opcode::Opcode;
pub use status::ErrorCode;
pub use frame::{
    Header, RequestFrame, ResponseFrame, HEADER_SIZE, MAX_BODY_SIZE, REQUEST_MAGIC,
    RESPONSE_MAGIC,
};
pub use codec::{
    decode_request, decode_response, encode_request, encode_request_into, encode_response,
    read_request, read_response, write_request, write_response,
};
