//! Opcode table
//!
//! Static mapping between logical commands and binary opcodes, plus the
//! quiet variants used for pipelining. A quiet request only produces a
//! response on error, or on a hit for the get family.

use super::Command;

/// Binary protocol opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    Quit = 0x07,
    Flush = 0x08,
    GetQ = 0x09,
    Noop = 0x0A,
    Version = 0x0B,
    GetK = 0x0C,
    GetKQ = 0x0D,
    Append = 0x0E,
    Prepend = 0x0F,
    Stat = 0x10,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    DeleteQ = 0x14,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
    QuitQ = 0x17,
    FlushQ = 0x18,
    AppendQ = 0x19,
    PrependQ = 0x1A,
}

impl Opcode {
    /// Try to convert a byte to an opcode
    pub fn from_u8(value: u8) -> Option<Self> {
        let opcode = match value {
            0x00 => Opcode::Get,
            0x01 => Opcode::Set,
            0x02 => Opcode::Add,
            0x03 => Opcode::Replace,
            0x04 => Opcode::Delete,
            0x05 => Opcode::Increment,
            0x06 => Opcode::Decrement,
            0x07 => Opcode::Quit,
            0x08 => Opcode::Flush,
            0x09 => Opcode::GetQ,
            0x0A => Opcode::Noop,
            0x0B => Opcode::Version,
            0x0C => Opcode::GetK,
            0x0D => Opcode::GetKQ,
            0x0E => Opcode::Append,
            0x0F => Opcode::Prepend,
            0x10 => Opcode::Stat,
            0x11 => Opcode::SetQ,
            0x12 => Opcode::AddQ,
            0x13 => Opcode::ReplaceQ,
            0x14 => Opcode::DeleteQ,
            0x15 => Opcode::IncrementQ,
            0x16 => Opcode::DecrementQ,
            0x17 => Opcode::QuitQ,
            0x18 => Opcode::FlushQ,
            0x19 => Opcode::AppendQ,
            0x1A => Opcode::PrependQ,
            _ => return None,
        };
        Some(opcode)
    }

    /// Normal (always answered) opcode for a logical command.
    ///
    /// Cas is a Set carrying a non-zero CAS field.
    pub fn for_command(command: Command) -> Opcode {
        match command {
            Command::Get => Opcode::Get,
            Command::Set | Command::Cas => Opcode::Set,
            Command::Add => Opcode::Add,
            Command::Replace => Opcode::Replace,
            Command::Append => Opcode::Append,
            Command::Prepend => Opcode::Prepend,
            Command::Delete => Opcode::Delete,
            Command::Increment => Opcode::Increment,
            Command::Decrement => Opcode::Decrement,
            Command::Flush => Opcode::Flush,
            Command::Stats => Opcode::Stat,
        }
    }

    /// Quiet variant of this opcode, or the opcode itself if it has none
    pub fn quiet(self) -> Opcode {
        match self {
            Opcode::Get => Opcode::GetQ,
            Opcode::GetK => Opcode::GetKQ,
            Opcode::Set => Opcode::SetQ,
            Opcode::Add => Opcode::AddQ,
            Opcode::Replace => Opcode::ReplaceQ,
            Opcode::Delete => Opcode::DeleteQ,
            Opcode::Increment => Opcode::IncrementQ,
            Opcode::Decrement => Opcode::DecrementQ,
            Opcode::Quit => Opcode::QuitQ,
            Opcode::Flush => Opcode::FlushQ,
            Opcode::Append => Opcode::AppendQ,
            Opcode::Prepend => Opcode::PrependQ,
            other => other,
        }
    }

    /// Normal variant of a quiet opcode
    pub fn normal(self) -> Opcode {
        match self {
            Opcode::GetQ => Opcode::Get,
            Opcode::GetKQ => Opcode::GetK,
            Opcode::SetQ => Opcode::Set,
            Opcode::AddQ => Opcode::Add,
            Opcode::ReplaceQ => Opcode::Replace,
            Opcode::DeleteQ => Opcode::Delete,
            Opcode::IncrementQ => Opcode::Increment,
            Opcode::DecrementQ => Opcode::Decrement,
            Opcode::QuitQ => Opcode::Quit,
            Opcode::FlushQ => Opcode::Flush,
            Opcode::AppendQ => Opcode::Append,
            Opcode::PrependQ => Opcode::Prepend,
            other => other,
        }
    }

    pub fn is_quiet(self) -> bool {
        self.normal() != self
    }

    /// Whether request extras are meaningful for this opcode.
    ///
    /// Append/Prepend and Delete always travel with empty extras.
    pub fn accepts_extras(self) -> bool {
        matches!(
            self.normal(),
            Opcode::Get
                | Opcode::GetK
                | Opcode::Set
                | Opcode::Add
                | Opcode::Replace
                | Opcode::Increment
                | Opcode::Decrement
                | Opcode::Flush
        )
    }
}
