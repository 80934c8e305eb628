//! Command definitions
//!
//! Logical operations a client can request, independent of wire format.

use std::fmt;
use std::str::FromStr;

use crate::error::McError;

/// Logical command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Get,
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas,
    Delete,
    Increment,
    Decrement,
    Flush,
    Stats,
}

impl Command {
    /// Text protocol command word
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get => "get",
            Command::Set => "set",
            Command::Add => "add",
            Command::Replace => "replace",
            Command::Append => "append",
            Command::Prepend => "prepend",
            Command::Cas => "cas",
            Command::Delete => "delete",
            Command::Increment => "incr",
            Command::Decrement => "decr",
            Command::Flush => "flush_all",
            Command::Stats => "stats",
        }
    }

    /// Returns true for commands that carry a value to store
    pub fn is_store(&self) -> bool {
        matches!(
            self,
            Command::Set
                | Command::Add
                | Command::Replace
                | Command::Append
                | Command::Prepend
                | Command::Cas
        )
    }

    /// Append/Prepend concatenate onto an existing item and ignore flags and expiry
    pub fn is_concat(&self) -> bool {
        matches!(self, Command::Append | Command::Prepend)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Command {
    type Err = McError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let command = match s.to_ascii_lowercase().as_str() {
            "get" | "gets" => Command::Get,
            "set" => Command::Set,
            "add" => Command::Add,
            "replace" => Command::Replace,
            "append" => Command::Append,
            "prepend" => Command::Prepend,
            "cas" => Command::Cas,
            "delete" => Command::Delete,
            "incr" | "increment" => Command::Increment,
            "decr" | "decrement" => Command::Decrement,
            "flush" | "flush_all" => Command::Flush,
            "stat" | "stats" => Command::Stats,
            _ => return Err(McError::UnknownCommand(s.to_string())),
        };
        Ok(command)
    }
}
