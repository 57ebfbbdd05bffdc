//! Newline-delimited stdio transport.
//!
//! Inbound bytes are split into lines by [`LineFramer`]; outbound envelopes
//! are queued on an [`Outbound`] handle and written by a single
//! [`write_loop`] task, which is the only code that touches the output
//! stream.

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::transport_trait::McpTransportTrait;
use crate::{Error, Result};

const READ_CHUNK: usize = 8 * 1024;

/// Splits a byte stream into lines, carrying partial lines across chunks.
#[derive(Debug, Default)]
pub struct LineFramer {
    partial: Vec<u8>,
    ready: VecDeque<String>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk. Complete non-blank lines become available via `pop`.
    pub fn push(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            let line = std::mem::take(&mut self.partial);
            self.emit(&line);
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
    }

    pub fn pop(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    /// Flushes an unterminated trailing fragment at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.emit(&line);
        }
        self.pop()
    }

    fn emit(&mut self, raw: &[u8]) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let text = String::from_utf8_lossy(raw);
        if !text.trim().is_empty() {
            self.ready.push_back(text.into_owned());
        }
    }
}

/// Reads lines from any async byte source.
pub struct LineReader<R> {
    reader: R,
    framer: LineFramer,
    buf: Box<[u8]>,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            framer: LineFramer::new(),
            buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
            eof: false,
        }
    }

    /// Returns the next line, or `None` once the stream is closed.
    ///
    /// Cancel-safe: dropping the future loses no input.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.framer.pop() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(self.framer.finish());
            }
            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                debug!("Input stream closed");
                self.eof = true;
            } else {
                trace!(bytes = n, "Read chunk");
                self.framer.push(&self.buf[..n]);
            }
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> McpTransportTrait for LineReader<R> {
    async fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.next_line().await?)
    }
}

/// Handle for queueing outbound envelopes. Cheap to clone.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
}

impl Outbound {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Encodes `message` and queues it as one line. Messages from one caller
    /// are written in the order they were sent.
    pub fn send<T: Serialize>(&self, message: &T) -> Result<()> {
        let line = serde_json::to_string(message)?;
        self.tx.send(line).map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output stream closed",
            ))
        })
    }
}

/// Drains the outbound queue into `writer` until every sender is dropped.
pub async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    debug!("write_loop: Task started");
    while let Some(mut line) = rx.recv().await {
        debug_assert!(!line.contains('\n'), "envelope must not contain newlines");
        trace!("Sending message: {}", line);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.flush().await?;
    debug!("write_loop: Task exiting");
    Ok(())
}
