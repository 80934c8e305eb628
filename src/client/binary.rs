//! Binary protocol client
//!
//! Single-key operations are one request/response exchange. Multi-key
//! operations pipeline one frame per key on each server's connection:
//!
//! ```text
//!   GETQ a (opaque 1) ─┐
//!   GETQ b (opaque 2)  ├─► server ─► resp 1 (hit a)
//!   GET  c (opaque 3) ─┘             resp 3 (hit or miss c)   ◄─ barrier
//! ```
//!
//! Every frame but the last uses the quiet opcode, so misses are never
//! answered. The last frame is the barrier: the server always answers it,
//! and because responses come back in order, its opaque ends the read loop.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{McError, Result};
use crate::network::{PooledSocket, Selector, ServerId};
use crate::protocol::{Command, ErrorCode, Opcode, RequestFrame, ResponseFrame};
use crate::value::{SerializedType, Value};

use super::batch::{self, KeyGroup};
use super::{CasResult, Context, Item, Operations, WireKey};

/// incr/decr expiration that tells the server not to create missing counters
const NO_AUTO_CREATE: u32 = 0xFFFF_FFFF;

pub(crate) struct BinaryProtocol;

// =============================================================================
// Pipelining
// =============================================================================

/// Opaque → index of the key within its group, for one bulk exchange only
struct PendingBatch {
    by_opaque: HashMap<u32, usize>,
    min: u32,
    max: u32,
}

impl PendingBatch {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            by_opaque: HashMap::with_capacity(capacity),
            min: u32::MAX,
            max: 0,
        }
    }

    fn track(&mut self, opaque: u32, index: usize) {
        self.by_opaque.insert(opaque, index);
        self.min = self.min.min(opaque);
        self.max = self.max.max(opaque);
    }

    /// Each opaque resolves once; a repeat or stranger is a desync
    fn resolve(&mut self, opaque: u32) -> Result<usize> {
        self.by_opaque.remove(&opaque).ok_or_else(|| {
            McError::Protocol(format!("Response opaque {} matches no pending request", opaque))
        })
    }
}

/// Send `requests` as one pipelined batch and collect the answers.
///
/// Each request carries the group index it belongs to; opcodes and opaques
/// are assigned here. Returns `(index, response)` for every answered request.
fn pipeline(
    socket: &mut PooledSocket,
    requests: Vec<(usize, RequestFrame)>,
) -> Result<Vec<(usize, ResponseFrame)>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }

    socket.reset_sequence();
    let last = requests.len() - 1;
    let mut pending = PendingBatch::with_capacity(requests.len());

    for (i, (index, mut frame)) in requests.into_iter().enumerate() {
        frame.opcode = if i < last {
            frame.opcode.quiet()
        } else {
            frame.opcode.normal()
        };
        frame.opaque = socket.next_sequence();
        pending.track(frame.opaque, index);
        socket.write_frame(&frame)?;
    }

    let responses = socket.read_response_frames_in_range(pending.min, pending.max)?;
    responses
        .into_iter()
        .map(|response| Ok((pending.resolve(response.opaque)?, response)))
        .collect()
}

/// One request, one response, with the opaque checked
fn exchange(socket: &mut PooledSocket, frame: RequestFrame) -> Result<ResponseFrame> {
    let frame = frame.with_opaque(socket.next_sequence());
    socket.write_frame(&frame)?;
    let response = socket.read_response_frame()?;
    if response.opaque != frame.opaque {
        return Err(McError::Protocol(format!(
            "Expected response opaque {}, got {} from {}",
            frame.opaque,
            response.opaque,
            socket.server()
        )));
    }
    Ok(response)
}

// =============================================================================
// Frame building
// =============================================================================

/// Flags word (type tag in the low 16 bits) followed by expiry
fn store_extras(type_tag: u16, expiry: u32) -> Bytes {
    let mut extras = BytesMut::with_capacity(8);
    extras.put_u32(type_tag as u32);
    extras.put_u32(expiry);
    extras.freeze()
}

fn store_request(
    command: Command,
    wire_key: &str,
    value: Bytes,
    type_tag: u16,
    expiry: u32,
    cas: u64,
) -> RequestFrame {
    let opcode = Opcode::for_command(command);
    let mut frame = RequestFrame::new(opcode)
        .with_key(wire_key.to_string())
        .with_value(value);
    if opcode.accepts_extras() {
        frame = frame.with_extras(store_extras(type_tag, expiry));
    }
    if command == Command::Cas {
        frame = frame.with_cas(cas);
    }
    frame
}

fn counter_request(command: Command, wire_key: &str, delta: u64) -> RequestFrame {
    let mut extras = BytesMut::with_capacity(20);
    extras.put_u64(delta);
    extras.put_u64(0);
    extras.put_u32(NO_AUTO_CREATE);
    RequestFrame::new(Opcode::for_command(command))
        .with_key(wire_key.to_string())
        .with_extras(extras.freeze())
}

fn cas_result(status: ErrorCode) -> CasResult {
    match status {
        ErrorCode::NoError => CasResult::Stored,
        ErrorCode::KeyExists => CasResult::Exists,
        ErrorCode::KeyNotFound => CasResult::NotFound,
        _ => CasResult::NotStored,
    }
}

/// Item from a successful get response; the tag defaults to raw bytes
fn decode_item(ctx: &Context, key: &str, response: &ResponseFrame) -> Option<Item> {
    let tag = response
        .type_tag()
        .unwrap_or(SerializedType::ByteArray as u16);
    ctx.decode(key, response.value.clone(), tag)
        .map(|value| Item {
            value,
            cas: response.cas,
        })
}

// =============================================================================
// Operations
// =============================================================================

impl BinaryProtocol {
    /// Pipeline one request per distinct key on every involved server.
    ///
    /// `build(group_index, group, key_index)` makes the request for one
    /// grouped key, or `None` to skip it. A group whose connection failed
    /// yields `None`.
    fn execute_bulk<F>(
        &self,
        ctx: &Context,
        groups: &[KeyGroup],
        build: F,
    ) -> Result<Vec<Option<Vec<(usize, ResponseFrame)>>>>
    where
        F: Fn(usize, &KeyGroup, usize) -> Option<RequestFrame> + Sync,
    {
        batch::for_each_server(groups, |group_index, group| {
            let requests: Vec<(usize, RequestFrame)> = (0..group.keys.len())
                .filter_map(|i| build(group_index, group, i).map(|frame| (i, frame)))
                .collect();
            if requests.is_empty() {
                return Ok(Some(Vec::new()));
            }
            ctx.pool
                .execute(Selector::Server(group.server), None, |socket| {
                    pipeline(socket, requests).map(Some)
                })
        })
    }
}

impl Operations for BinaryProtocol {
    fn get(&self, ctx: &Context, key: &WireKey, _with_cas: bool) -> Result<Option<Item>> {
        ctx.pool.execute(Selector::Hash(key.hash), None, |socket| {
            let request = RequestFrame::new(Opcode::Get).with_key(key.wire.clone());
            let response = exchange(socket, request)?;
            if !response.is_success() {
                return Ok(None);
            }
            Ok(decode_item(ctx, &key.wire, &response))
        })
    }

    fn get_multi(
        &self,
        ctx: &Context,
        keys: &[WireKey],
        _with_cas: bool,
    ) -> Result<Vec<Option<Item>>> {
        let groups = batch::partition(&ctx.pool, keys);
        let answered = self.execute_bulk(ctx, &groups, |_, group, i| {
            Some(RequestFrame::new(Opcode::Get).with_key(group.keys[i].wire.clone()))
        })?;

        let mut results = vec![None; keys.len()];
        for (group, responses) in groups.iter().zip(answered) {
            for (index, response) in responses.unwrap_or_default() {
                if !response.is_success() {
                    continue;
                }
                let grouped = &group.keys[index];
                let item = decode_item(ctx, &grouped.wire, &response);
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
        let request = store_request(command, &key.wire, bytes, tag, expiry, cas);

        ctx.pool
            .execute(Selector::Hash(key.hash), CasResult::NotStored, |socket| {
                let response = exchange(socket, request)?;
                Ok(cas_result(response.status))
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
                "cas cannot be pipelined without per-key uniques".to_string(),
            ));
        }

        let groups = batch::partition(&ctx.pool, keys);

        // A repeated key stores the value from its last position
        let encoded: Vec<Vec<Option<(Bytes, u16)>>> = groups
            .iter()
            .map(|group| {
                group
                    .keys
                    .iter()
                    .map(|grouped| {
                        let last = *grouped.positions.last()?;
                        ctx.encode(&grouped.wire, &values[last])
                    })
                    .collect()
            })
            .collect();
        let mut success = encoded.iter().flatten().all(Option::is_some);

        let answered = self.execute_bulk(ctx, &groups, |group_index, group, i| {
            let (bytes, tag) = encoded[group_index][i].clone()?;
            Some(store_request(command, &group.keys[i].wire, bytes, tag, expiry, 0))
        })?;

        for responses in answered {
            match responses {
                Some(responses) => {
                    for (index, response) in responses {
                        if !response.is_success() {
                            tracing::debug!(
                                "{} failed for key index {}: {}",
                                command,
                                index,
                                response.status
                            );
                            success = false;
                        }
                    }
                }
                None => success = false,
            }
        }
        Ok(success)
    }

    fn delete(&self, ctx: &Context, key: &WireKey, time: u32) -> Result<bool> {
        if time != 0 {
            return Err(McError::Unsupported("binary"));
        }
        ctx.pool.execute(Selector::Hash(key.hash), false, |socket| {
            let request = RequestFrame::new(Opcode::Delete).with_key(key.wire.clone());
            Ok(exchange(socket, request)?.is_success())
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
            let response = exchange(socket, counter_request(command, &key.wire, delta))?;
            if !response.is_success() {
                tracing::debug!("{} on '{}' returned {}", command, key.wire, response.status);
                return Ok(None);
            }
            if response.value.len() != 8 {
                return Err(McError::Protocol(format!(
                    "Counter response carries {} bytes, expected 8",
                    response.value.len()
                )));
            }
            Ok(Some(response.value.clone().get_u64()))
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
            let mut request = RequestFrame::new(Opcode::Flush);
            if seconds > 0 {
                let mut extras = BytesMut::with_capacity(4);
                extras.put_u32(seconds);
                request = request.with_extras(extras.freeze());
            }
            let flushed = ctx
                .pool
                .execute(Selector::Server(server), false, |socket| {
                    Ok(exchange(socket, request)?.is_success())
                })?;
            no_errors &= flushed;
        }
        Ok(no_errors)
    }

    fn stats(&self, ctx: &Context, server: ServerId) -> Result<HashMap<String, String>> {
        ctx.pool
            .execute(Selector::Server(server), HashMap::new(), |socket| {
                let request = RequestFrame::new(Opcode::Stat).with_opaque(socket.next_sequence());
                socket.write_frame(&request)?;

                let mut stats = HashMap::new();
                loop {
                    let response = socket.read_response_frame()?;
                    if response.opaque != request.opaque {
                        return Err(McError::Protocol(format!(
                            "Expected stat opaque {}, got {}",
                            request.opaque, response.opaque
                        )));
                    }
                    if !response.is_success() {
                        tracing::warn!("stats on {} failed: {}", socket.server(), response.status);
                        return Ok(stats);
                    }
                    // an empty key terminates the stat stream
                    if response.key.is_empty() {
                        return Ok(stats);
                    }
                    stats.insert(
                        String::from_utf8_lossy(&response.key).into_owned(),
                        String::from_utf8_lossy(&response.value).into_owned(),
                    );
                }
            })
    }
}
