//! Pooled Connection
//!
//! A single server connection, borrowed exclusively by one operation at a time.

use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::net::TcpStream;

use bytes::Bytes;

use crate::error::{McError, Result};
use crate::protocol::{encode_request, read_response, RequestFrame, ResponseFrame};

/// Handles a single server connection
///
/// Writes are buffered; every read flushes pending writes first, so a
/// pipelined batch goes out in as few segments as possible.
pub struct PooledSocket {
    /// Stream reader (buffered for efficiency)
    reader: BufReader<Box<dyn Read + Send>>,

    /// Stream writer (buffered for efficiency)
    writer: BufWriter<Box<dyn Write + Send>>,

    /// Server address for logging
    server: String,

    /// Opaque counter for binary requests
    sequence: u32,
}

impl PooledSocket {
    /// Wrap a connected TCP stream
    pub fn from_tcp(stream: TcpStream, server: impl Into<String>) -> Result<Self> {
        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        Ok(Self::from_parts(server, read_stream, stream))
    }

    /// Build a socket from arbitrary read and write halves
    pub fn from_parts<R, W>(server: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            reader: BufReader::new(Box::new(reader)),
            writer: BufWriter::new(Box::new(writer)),
            server: server.into(),
            sequence: 0,
        }
    }

    /// Get the server address string
    pub fn server(&self) -> &str {
        &self.server
    }

    // =========================================================================
    // Binary protocol
    // =========================================================================

    /// Next opaque value for this connection
    pub fn next_sequence(&mut self) -> u32 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// Restart the opaque counter; called at the start of each bulk exchange
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
    }

    /// Queue a request frame
    pub fn write_frame(&mut self, frame: &RequestFrame) -> Result<()> {
        let bytes = encode_request(frame)?;
        tracing::trace!(
            "-> {} {:?} opaque={} key_len={} body={}",
            self.server,
            frame.opcode,
            frame.opaque,
            frame.key.len(),
            frame.body_length()
        );
        self.writer.write_all(&bytes)?;
        Ok(())
    }

    /// Push buffered writes to the server
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Read one response frame
    pub fn read_response_frame(&mut self) -> Result<ResponseFrame> {
        self.flush()?;
        let frame = read_response(&mut self.reader)?;
        tracing::trace!(
            "<- {} {:?} status={} opaque={}",
            self.server,
            frame.opcode,
            frame.status,
            frame.opaque
        );
        Ok(frame)
    }

    /// Read responses until the one whose opaque is `max`.
    ///
    /// Quiet requests may never be answered, so the count is not fixed; the
    /// non-quiet request carrying `max` bounds the loop. Any opaque outside
    /// `[min, max]` means the stream is out of step with this exchange.
    pub fn read_response_frames_in_range(
        &mut self,
        min: u32,
        max: u32,
    ) -> Result<Vec<ResponseFrame>> {
        let mut frames = Vec::new();
        loop {
            let frame = self.read_response_frame()?;
            if frame.opaque < min || frame.opaque > max {
                return Err(McError::Protocol(format!(
                    "Response opaque {} outside expected range [{}, {}] from {}",
                    frame.opaque, min, max, self.server
                )));
            }
            let done = frame.opaque == max;
            frames.push(frame);
            if done {
                return Ok(frames);
            }
        }
    }

    // =========================================================================
    // Text protocol
    // =========================================================================

    /// Queue a command line, appending the CRLF terminator
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        tracing::trace!("-> {} {}", self.server, line);
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        Ok(())
    }

    /// Queue raw data bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    /// Read one line without its terminator
    pub fn read_line(&mut self) -> Result<String> {
        self.flush()?;
        let mut buf = Vec::new();
        let read = self.reader.read_until(b'\n', &mut buf)?;
        if read == 0 || buf.last() != Some(&b'\n') {
            return Err(McError::Protocol(format!(
                "Premature end of stream from {} while reading a line",
                self.server
            )));
        }
        while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
            buf.pop();
        }
        let line = String::from_utf8_lossy(&buf).into_owned();
        tracing::trace!("<- {} {}", self.server, line);
        Ok(line)
    }

    /// Read a reply line, logging server-side error replies
    pub fn read_response(&mut self) -> Result<String> {
        let line = self.read_line()?;
        if line.starts_with("ERROR")
            || line.starts_with("CLIENT_ERROR")
            || line.starts_with("SERVER_ERROR")
        {
            tracing::warn!("Server {} replied with error: {}", self.server, line);
        }
        Ok(line)
    }

    /// Read exactly `len` data bytes
    pub fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        self.flush()?;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => McError::Protocol(format!(
                "Premature end of stream from {} while reading {} data bytes",
                self.server, len
            )),
            _ => McError::Io(e),
        })?;
        Ok(Bytes::from(buf))
    }

    /// Discard everything up to and including the next newline
    pub fn skip_to_line_end(&mut self) -> Result<()> {
        let mut discarded = Vec::new();
        let read = self.reader.read_until(b'\n', &mut discarded)?;
        if read == 0 || discarded.last() != Some(&b'\n') {
            return Err(McError::Protocol(format!(
                "Premature end of stream from {} while skipping to line end",
                self.server
            )));
        }
        Ok(())
    }
}
