//! Line and literal framing.
//!
//! Server responses are CRLF-terminated lines that may announce a literal
//! (`{n}\r\n` followed by exactly `n` bytes). A message body fetched with
//! `BODY.PEEK[]` always arrives as a literal, so framing has to splice the
//! literal bytes back into the response before it reaches the parser.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::Tag;
use crate::{Error, Result};

const READ_CHUNK: usize = 8192;

/// Upper bound for a single response line.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Upper bound for a single literal. PEC receipts embed the original
/// message, so this is generous.
const MAX_LITERAL_SIZE: usize = 256 * 1024 * 1024;

/// Framed connection over any async byte stream.
///
/// Every socket read and write is bounded by `io_timeout`. A slow response
/// that keeps delivering bytes never times out; a silent peer does.
pub struct FramedStream<S> {
    stream: S,
    buffer: BytesMut,
    io_timeout: Duration,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a stream with an idle timeout for each read and write.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            io_timeout,
        }
    }

    /// Reads one complete response, including any embedded literals.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut response = Vec::new();

        loop {
            let line = self.read_line().await?;
            let literal = literal_length(&line);
            response.extend_from_slice(&line);

            let Some(len) = literal else {
                return Ok(response);
            };
            if len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            self.fill_to(len).await?;
            response.extend_from_slice(&self.buffer.split_to(len));
        }
    }

    /// Reads responses until the completion line carrying `tag`.
    ///
    /// The tagged line is the last element of the returned vector.
    pub async fn read_until_tagged(&mut self, tag: &Tag) -> Result<Vec<Vec<u8>>> {
        let mut responses = Vec::new();
        loop {
            let response = self.read_response().await?;
            let done = is_tagged_with(&response, tag);
            responses.push(response);
            if done {
                return Ok(responses);
            }
        }
    }

    /// Sends a command and collects everything up to its completion line.
    pub async fn exchange(&mut self, command: &[u8], tag: &Tag) -> Result<Vec<Vec<u8>>> {
        self.send(command).await?;
        self.read_until_tagged(tag).await
    }

    /// Writes a serialized command and flushes it.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let timeout = self.io_timeout;
        let write = async {
            self.stream.write_all(data).await?;
            self.stream.flush().await
        };
        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        Ok(())
    }

    /// Shuts down the write half. Errors are ignored by callers on logout.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = find_crlf(&self.buffer[scanned..]) {
                let end = scanned + pos + 2;
                return Ok(self.buffer.split_to(end).to_vec());
            }
            // keep the trailing '\r' in case '\n' arrives in the next chunk
            scanned = self.buffer.len().saturating_sub(1);
            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            self.read_more().await?;
        }
    }

    async fn fill_to(&mut self, len: usize) -> Result<()> {
        while self.buffer.len() < len {
            self.read_more().await?;
        }
        Ok(())
    }

    async fn read_more(&mut self) -> Result<()> {
        self.buffer.reserve(READ_CHUNK);
        let timeout = self.io_timeout;
        let n = tokio::time::timeout(timeout, self.stream.read_buf(&mut self.buffer))
            .await
            .map_err(|_| Error::Timeout(timeout))??;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server",
            )));
        }
        Ok(())
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn is_tagged_with(response: &[u8], tag: &Tag) -> bool {
    let tag = tag.as_str().as_bytes();
    response.starts_with(tag) && response.get(tag.len()) == Some(&b' ')
}

/// Extracts `n` from a line ending in `{n}\r\n` or `{n+}\r\n`.
fn literal_length(line: &[u8]) -> Option<usize> {
    let body = line.strip_suffix(b"\r\n")?.strip_suffix(b"}")?;
    let body = body.strip_suffix(b"+").unwrap_or(body);
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = &body[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
