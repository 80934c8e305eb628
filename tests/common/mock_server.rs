//! In-process memcached
//!
//! Speaks the text and binary protocols over loopback TCP, enough of each
//! for the client's operations. The protocol is picked per request from the
//! first byte, as memcached does. Expiry is ignored.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use bytes::{Buf, BufMut, BytesMut};
use mcpipe::protocol::{
    read_request, write_response, ErrorCode, Opcode, RequestFrame, ResponseFrame,
    REQUEST_MAGIC,
};
use parking_lot::Mutex;

// =============================================================================
// Item Store
// =============================================================================

#[derive(Clone)]
struct Entry {
    flags: u32,
    data: Vec<u8>,
    cas: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Stored,
    NotStored,
    Exists,
    NotFound,
}

#[derive(Default)]
struct Store {
    items: HashMap<Vec<u8>, Entry>,
    last_cas: u64,
}

impl Store {
    fn put(&mut self, key: &[u8], flags: u32, data: Vec<u8>) {
        self.last_cas += 1;
        let cas = self.last_cas;
        self.items.insert(key.to_vec(), Entry { flags, data, cas });
    }

    fn store(&mut self, command: &str, key: &[u8], flags: u32, data: Vec<u8>, unique: u64) -> Outcome {
        let existing = self.items.get(key).cloned();
        match (command, existing) {
            ("set", _) => {}
            ("add", Some(_)) => return Outcome::NotStored,
            ("add", None) => {}
            ("replace", None) | ("append", None) | ("prepend", None) => return Outcome::NotStored,
            ("replace", Some(_)) => {}
            ("append", Some(entry)) => {
                let mut joined = entry.data;
                joined.extend_from_slice(&data);
                self.put(key, entry.flags, joined);
                return Outcome::Stored;
            }
            ("prepend", Some(entry)) => {
                let mut joined = data;
                joined.extend_from_slice(&entry.data);
                self.put(key, entry.flags, joined);
                return Outcome::Stored;
            }
            ("cas", None) => return Outcome::NotFound,
            ("cas", Some(entry)) if entry.cas != unique => return Outcome::Exists,
            ("cas", Some(_)) => {}
            _ => return Outcome::NotStored,
        }
        self.put(key, flags, data);
        Outcome::Stored
    }

    /// `None` when the key is missing, `Err` when the item is not a number
    fn counter(&mut self, key: &[u8], delta: u64, increment: bool) -> Option<Result<u64, ()>> {
        let entry = self.items.get(key)?.clone();
        let current = match std::str::from_utf8(&entry.data).ok().and_then(|s| s.trim().parse::<u64>().ok()) {
            Some(current) => current,
            None => return Some(Err(())),
        };
        let next = if increment {
            current.wrapping_add(delta)
        } else {
            current.saturating_sub(delta)
        };
        self.put(key, entry.flags, next.to_string().into_bytes());
        Some(Ok(next))
    }
}

// =============================================================================
// Server
// =============================================================================

/// A running mock server; it lives until the test process exits
pub struct MockServer {
    addr: String,
    store: Arc<Mutex<Store>>,
}

impl MockServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let store = Arc::new(Mutex::new(Store::default()));

        let shared = Arc::clone(&store);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let store = Arc::clone(&shared);
                thread::spawn(move || {
                    let _ = serve(stream, store);
                });
            }
        });

        Self { addr, store }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn item_count(&self) -> usize {
        self.store.lock().items.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.lock().items.contains_key(key.as_bytes())
    }
}

fn serve(stream: TcpStream, store: Arc<Mutex<Store>>) -> mcpipe::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    loop {
        let first = match reader.fill_buf()?.first() {
            Some(&byte) => byte,
            None => return Ok(()),
        };
        let keep_going = if first == REQUEST_MAGIC {
            let request = read_request(&mut reader)?;
            serve_binary(&request, &store, &mut writer)?
        } else {
            serve_text(&mut reader, &store, &mut writer)?
        };
        if !keep_going {
            return Ok(());
        }
    }
}

// =============================================================================
// Text Protocol
// =============================================================================

fn serve_text<R: BufRead, W: Write>(
    reader: &mut R,
    store: &Mutex<Store>,
    writer: &mut W,
) -> mcpipe::Result<bool> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(false);
    }
    let parts: Vec<&str> = line.trim_end().split(' ').collect();
    let mut out = Vec::new();

    match parts[0] {
        "get" | "gets" => {
            let store = store.lock();
            for key in &parts[1..] {
                if let Some(entry) = store.items.get(key.as_bytes()) {
                    if parts[0] == "gets" {
                        out.extend(format!("VALUE {} {} {} {}\r\n", key, entry.flags, entry.data.len(), entry.cas).bytes());
                    } else {
                        out.extend(format!("VALUE {} {} {}\r\n", key, entry.flags, entry.data.len()).bytes());
                    }
                    out.extend_from_slice(&entry.data);
                    out.extend_from_slice(b"\r\n");
                }
            }
            out.extend_from_slice(b"END\r\n");
        }
        "set" | "add" | "replace" | "append" | "prepend" | "cas" => {
            let flags: u32 = parts[2].parse().unwrap_or(0);
            let length: usize = parts[4].parse().unwrap_or(0);
            let unique: u64 = parts.get(5).and_then(|u| u.parse().ok()).unwrap_or(0);
            let mut data = vec![0u8; length + 2];
            reader.read_exact(&mut data)?;
            data.truncate(length);
            let reply = match store.lock().store(parts[0], parts[1].as_bytes(), flags, data, unique) {
                Outcome::Stored => "STORED",
                Outcome::NotStored => "NOT_STORED",
                Outcome::Exists => "EXISTS",
                Outcome::NotFound => "NOT_FOUND",
            };
            out.extend(format!("{}\r\n", reply).bytes());
        }
        "delete" => {
            let removed = store.lock().items.remove(parts[1].as_bytes()).is_some();
            let reply: &[u8] = if removed { b"DELETED\r\n" } else { b"NOT_FOUND\r\n" };
            out.extend_from_slice(reply);
        }
        "incr" | "decr" => {
            let delta: u64 = parts[2].parse().unwrap_or(0);
            match store.lock().counter(parts[1].as_bytes(), delta, parts[0] == "incr") {
                Some(Ok(value)) => out.extend(format!("{}\r\n", value).bytes()),
                Some(Err(())) => out.extend_from_slice(
                    b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n",
                ),
                None => out.extend_from_slice(b"NOT_FOUND\r\n"),
            }
        }
        "flush_all" => {
            if parts.get(1).map_or(true, |delay| *delay == "0") {
                store.lock().items.clear();
            }
            out.extend_from_slice(b"OK\r\n");
        }
        "stats" => {
            let items = store.lock().items.len();
            out.extend(format!("STAT pid 4242\r\nSTAT curr_items {}\r\nSTAT version 1.6.0-mock\r\nEND\r\n", items).bytes());
        }
        "quit" => return Ok(false),
        _ => out.extend_from_slice(b"ERROR\r\n"),
    }

    writer.write_all(&out)?;
    writer.flush()?;
    Ok(true)
}

// =============================================================================
// Binary Protocol
// =============================================================================

fn serve_binary<W: Write>(
    request: &RequestFrame,
    store: &Mutex<Store>,
    writer: &mut W,
) -> mcpipe::Result<bool> {
    let quiet = request.opcode.is_quiet();
    let reply = |status: ErrorCode| {
        ResponseFrame::new(request.opcode, status)
            .with_opaque(request.opaque)
    };

    let response = match request.opcode.normal() {
        Opcode::Get | Opcode::GetK => {
            let entry = store.lock().items.get(&request.key[..]).cloned();
            match entry {
                Some(entry) => {
                    let mut extras = BytesMut::with_capacity(4);
                    extras.put_u32(entry.flags);
                    let mut response = reply(ErrorCode::NoError)
                        .with_extras(extras)
                        .with_value(entry.data)
                        .with_cas(entry.cas);
                    if request.opcode.normal() == Opcode::GetK {
                        response = response.with_key(request.key.clone());
                    }
                    Some(response)
                }
                None if quiet => None,
                None => Some(reply(ErrorCode::KeyNotFound)),
            }
        }
        Opcode::Set | Opcode::Add | Opcode::Replace | Opcode::Append | Opcode::Prepend => {
            let flags = if request.extras.len() >= 4 {
                (&request.extras[..4]).get_u32()
            } else {
                0
            };
            let command = match request.opcode.normal() {
                Opcode::Set if request.cas != 0 => "cas",
                Opcode::Set => "set",
                Opcode::Add => "add",
                Opcode::Replace => "replace",
                Opcode::Append => "append",
                _ => "prepend",
            };
            let mut store = store.lock();
            let outcome = store.store(command, &request.key, flags, request.value.to_vec(), request.cas);
            let status = match (outcome, command) {
                (Outcome::Stored, _) => ErrorCode::NoError,
                (Outcome::NotStored, "add") | (Outcome::Exists, _) => ErrorCode::KeyExists,
                (Outcome::NotStored, "replace") | (Outcome::NotFound, _) => ErrorCode::KeyNotFound,
                (Outcome::NotStored, _) => ErrorCode::ItemNotStored,
            };
            match status {
                ErrorCode::NoError if quiet => None,
                ErrorCode::NoError => {
                    let cas = store.items.get(&request.key[..]).map_or(0, |e| e.cas);
                    Some(reply(status).with_cas(cas))
                }
                _ => Some(reply(status)),
            }
        }
        Opcode::Delete => {
            let removed = store.lock().items.remove(&request.key[..]).is_some();
            match (removed, quiet) {
                (true, true) => None,
                (true, false) => Some(reply(ErrorCode::NoError)),
                (false, _) => Some(reply(ErrorCode::KeyNotFound)),
            }
        }
        Opcode::Increment | Opcode::Decrement => {
            let delta = (&request.extras[..8]).get_u64();
            let increment = request.opcode.normal() == Opcode::Increment;
            match store.lock().counter(&request.key, delta, increment) {
                Some(Ok(value)) => {
                    let mut body = BytesMut::with_capacity(8);
                    body.put_u64(value);
                    Some(reply(ErrorCode::NoError).with_value(body))
                }
                Some(Err(())) => Some(reply(ErrorCode::InvalidIncrTarget)),
                None => Some(reply(ErrorCode::KeyNotFound)),
            }
        }
        Opcode::Flush => {
            let delay = if request.extras.len() >= 4 {
                (&request.extras[..4]).get_u32()
            } else {
                0
            };
            if delay == 0 {
                store.lock().items.clear();
            }
            (!quiet).then(|| reply(ErrorCode::NoError))
        }
        Opcode::Stat => {
            let items = store.lock().items.len();
            let stats = [
                ("pid".to_string(), "4242".to_string()),
                ("curr_items".to_string(), items.to_string()),
            ];
            for (name, value) in stats {
                let frame = reply(ErrorCode::NoError)
                    .with_key(name.into_bytes())
                    .with_value(value.into_bytes());
                write_response(writer, &frame)?;
            }
            Some(reply(ErrorCode::NoError))
        }
        Opcode::Noop => Some(reply(ErrorCode::NoError)),
        Opcode::Quit => {
            if !quiet {
                write_response(writer, &reply(ErrorCode::NoError))?;
            }
            return Ok(false);
        }
        _ => Some(reply(ErrorCode::UnknownCommand)),
    };

    if let Some(response) = response {
        write_response(writer, &response)?;
    }
    Ok(true)
}
