//! Text protocol client
//!
//! Line-oriented commands, one reply per command:
//!
//! ```text
//!   get a b c\r\n        ─►  VALUE a 2 5\r\n hello\r\n
//!                            VALUE c 0 3\r\n abc\r\n
//!                            END\r\n
//!   set a 2 0 5\r\n
//!   hello\r\n            ─►  STORED\r\n
//! ```

use std::collections::HashMap;

use crate::error::{McError, Result};
use crate::network::{PooledSocket, Selector, ServerId};
use crate::protocol::{Command, MAX_BODY_SIZE};
use crate::value::{SerializedType, Value};

use super::batch::{self, KeyGroup};
use super::{CasResult, Context, Item, Operations, WireKey};

pub(crate) struct TextProtocol;

// =============================================================================
// Reply Parsing
// =============================================================================

/// One entry of a retrieval reply
struct Retrieved {
    key: String,
    /// `None` when the payload could not be deserialized
    item: Option<Item>,
}

/// Read the next `VALUE` block, or `None` at the line ending the reply.
///
/// That line is normally `END`; an error reply ends it too.
fn read_value(ctx: &Context, socket: &mut PooledSocket) -> Result<Option<Retrieved>> {
    let line = socket.read_response()?;
    if !line.starts_with("VALUE ") {
        return Ok(None);
    }

    // VALUE <key> <flags> <bytes> [<cas unique>]
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() < 4 {
        return Err(McError::Protocol(format!("Malformed VALUE line: {}", line)));
    }
    let number = |field: &str| {
        field
            .parse::<u64>()
            .map_err(|_| McError::Protocol(format!("Malformed VALUE line: {}", line)))
    };
    let flags = number(parts[2])?;
    let length = number(parts[3])?;
    if length > MAX_BODY_SIZE as u64 {
        return Err(McError::Protocol(format!(
            "VALUE length {} from {} exceeds limit {}",
            length,
            socket.server(),
            MAX_BODY_SIZE
        )));
    }
    let cas = match parts.get(4) {
        Some(field) => number(*field)?,
        None => 0,
    };

    let data = socket.read_exact(length as usize)?;
    socket.skip_to_line_end()?;

    let key = parts[1].to_string();
    // flags wider than a type tag were not written by this client
    let tag = u16::try_from(flags).unwrap_or(SerializedType::ByteArray as u16);
    let item = ctx
        .decode(&key, data, tag)
        .map(|value| Item { value, cas });
    Ok(Some(Retrieved { key, item }))
}

fn cas_result(reply: &str) -> CasResult {
    match reply {
        "STORED" => CasResult::Stored,
        "EXISTS" => CasResult::Exists,
        "NOT_FOUND" => CasResult::NotFound,
        _ => CasResult::NotStored,
    }
}

fn retrieval_command(with_cas: bool) -> &'static str {
    if with_cas {
        "gets"
    } else {
        "get"
    }
}

// =============================================================================
// Operations
// =============================================================================

impl TextProtocol {
    /// Fetch every key of one group over a single `get` line
    fn get_group(
        &self,
        ctx: &Context,
        group: &KeyGroup,
        with_cas: bool,
    ) -> Result<Vec<Option<Item>>> {
        let mut line = String::from(retrieval_command(with_cas));
        for grouped in &group.keys {
            line.push(' ');
            line.push_str(&grouped.wire);
        }

        let misses = vec![None; group.keys.len()];
        ctx.pool
            .execute(Selector::Server(group.server), misses.clone(), |socket| {
                socket.write_line(&line)?;
                let mut found = misses;
                while let Some(retrieved) = read_value(ctx, socket)? {
                    let index = group.find(&retrieved.key).ok_or_else(|| {
                        McError::Protocol(format!(
                            "Server {} returned unrequested key '{}'",
                            socket.server(),
                            retrieved.key
                        ))
                    })?;
                    found[index] = retrieved.item;
                }
                Ok(found)
            })
    }
}

impl Operations for TextProtocol {
    fn get(&self, ctx: &Context, key: &WireKey, with_cas: bool) -> Result<Option<Item>> {
        ctx.pool.execute(Selector::Hash(key.hash), None, |socket| {
            socket.write_line(&format!("{} {}", retrieval_command(with_cas), key.wire))?;
            let retrieved = match read_value(ctx, socket)? {
                Some(retrieved) => retrieved,
                None => return Ok(None),
            };
            if retrieved.key != key.wire {
                return Err(McError::Protocol(format!(
                    "Asked for '{}', server {} returned '{}'",
                    key.wire,
                    socket.server(),
                    retrieved.key
                )));
            }
            let end = socket.read_response()?;
            if end != "END" {
                return Err(McError::Protocol(format!(
                    "Expected END after single value, got: {}",
                    end
                )));
            }
            Ok(retrieved.item)
        })
    }

    fn get_multi(
        &self,
        ctx: &Context,
        keys: &[WireKey],
        with_cas: bool,
    ) -> Result<Vec<Option<Item>>> {
        if let [key] = keys {
            return Ok(vec![self.get(ctx, key, with_cas)?]);
        }

        let groups = batch::partition(&ctx.pool, keys);
        let found = batch::for_each_server(&groups, |_, group| {
            self.get_group(ctx, group, with_cas)
        })?;

        let mut results = vec![None; keys.len()];
        for (group, items) in groups.iter().zip(found) {
            for (grouped, item) in group.keys.iter().zip(items) {
                for &position in &grouped.positions {
                    results[position] = item.clone();
                }
            }
        }
        Ok(results)
    }

    fn store(
        &self,
        ctx: &Context,
        command: Command,
        key: &WireKey,
        value: &Value,
        expiry: u32,
        cas: u64,
    ) -> Result<CasResult> {
        let (bytes, tag) = match ctx.encode(&key.wire, value) {
            Some(encoded) => encoded,
            None => return Ok(CasResult::NotStored),
        };

        let line = match command {
            Command::Cas => format!(
                "cas {} {} {} {} {}",
                key.wire,
                tag,
                expiry,
                bytes.len(),
                cas
            ),
            // flags and expiry are ignored for concatenation
            _ if command.is_concat() => {
                format!("{} {} 0 0 {}", command, key.wire, bytes.len())
            }
            _ => format!("{} {} {} {} {}", command, key.wire, tag, expiry, bytes.len()),
        };

        ctx.pool
            .execute(Selector::Hash(key.hash), CasResult::NotStored, |socket| {
                socket.write_line(&line)?;
                socket.write_bytes(&bytes)?;
                socket.write_bytes(b"\r\n")?;
                let reply = socket.read_response()?;
                Ok(cas_result(&reply))
            })
    }

    fn store_multi(
        &self,
        ctx: &Context,
        command: Command,
        keys: &[WireKey],
        values: &[Value],
        expiry: u32,
    ) -> Result<bool> {
        if !command.is_store() {
            return Err(McError::Contract(format!("{} does not store a value", command)));
        }
        if command == Command::Cas {
            return Err(McError::Contract(
                "cas cannot be batched without per-key uniques".to_string(),
            ));
        }

        let mut all_stored = true;
        for (key, value) in keys.iter().zip(values) {
            let result = self.store(ctx, command, key, value, expiry, 0)?;
            if result != CasResult::Stored {
                tracing::debug!("{} of '{}' returned {:?}", command, key.wire, result);
                all_stored = false;
            }
        }
        Ok(all_stored)
    }

    fn delete(&self, ctx: &Context, key: &WireKey, time: u32) -> Result<bool> {
        let line = if time > 0 {
            format!("delete {} {}", key.wire, time)
        } else {
            format!("delete {}", key.wire)
        };
        ctx.pool.execute(Selector::Hash(key.hash), false, |socket| {
            socket.write_line(&line)?;
            Ok(socket.read_response()?.starts_with("DELETED"))
        })
    }

    fn incr_decr(
        &self,
        ctx: &Context,
        command: Command,
        key: &WireKey,
        delta: u64,
    ) -> Result<Option<u64>> {
        ctx.pool.execute(Selector::Hash(key.hash), None, |socket| {
            socket.write_line(&format!("{} {} {}", command, key.wire, delta))?;
            let reply = socket.read_response()?;
            if reply == "NOT_FOUND" {
                return Ok(None);
            }
            match reply.trim().parse::<u64>() {
                Ok(counter) => Ok(Some(counter)),
                Err(_) => {
                    tracing::warn!("{} on '{}' returned: {}", command, key.wire, reply);
                    Ok(None)
                }
            }
        })
    }

    fn flush_all(&self, ctx: &Context, delay: u32, staggered: bool) -> Result<bool> {
        let mut no_errors = true;
        for (count, server) in ctx.pool.servers().enumerate() {
            let seconds = if staggered {
                delay.saturating_mul(count as u32)
            } else {
                delay
            };
            let line = if seconds > 0 {
                format!("flush_all {}", seconds)
            } else {
                "flush_all".to_string()
            };
            let flushed = ctx
                .pool
                .execute(Selector::Server(server), false, |socket| {
                    socket.write_line(&line)?;
                    Ok(socket.read_response()? == "OK")
                })?;
            no_errors &= flushed;
        }
        Ok(no_errors)
    }

    fn stats(&self, ctx: &Context, server: ServerId) -> Result<HashMap<String, String>> {
        ctx.pool
            .execute(Selector::Server(server), HashMap::new(), |socket| {
                socket.write_line("stats")?;
                let mut stats = HashMap::new();
                loop {
                    let line = socket.read_response()?;
                    if line.starts_with("END") {
                        return Ok(stats);
                    }
                    // STAT <name> <value>; the first token is not checked
                    let parts: Vec<&str> = line.splitn(3, ' ').collect();
                    if parts.len() < 3 {
                        return Err(McError::Protocol(format!("Malformed stats line: {}", line)));
                    }
                    stats.insert(parts[1].to_string(), parts[2].to_string());
                }
            })
    }
}
