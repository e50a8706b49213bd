//! NUL-delimited frame reader and writer

use crate::stream::{FrameSink, FrameSource};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use torqlink_codec::{MAX_FRAME_LENGTH, NUL};
use torqlink_core::{TorqlinkError, TorqlinkResult};

/// Reads NUL-terminated frames from a byte stream
///
/// Bytes received before a read deadline expires stay in `pending`, so a frame
/// that straddles a timeout is delivered intact by the following read.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// Move bytes into `pending` until a NUL arrives
    ///
    /// Only whole buffer chunks are consumed between awaits, so dropping this
    /// future on a timeout loses nothing.
    async fn fill_frame(&mut self) -> TorqlinkResult<Vec<u8>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                let message = if self.pending.is_empty() {
                    "Connection closed by peer"
                } else {
                    "Connection closed in the middle of a frame"
                };
                self.pending.clear();
                return Err(TorqlinkError::Connection(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    message,
                )));
            }

            let (taken, complete) = match available.iter().position(|b| *b == NUL) {
                Some(end) => (end + 1, true),
                None => (available.len(), false),
            };
            self.pending.extend_from_slice(&available[..taken]);
            self.reader.consume(taken);

            // The length field has four digits
            let body = self.pending.len() - usize::from(complete);
            if body > MAX_FRAME_LENGTH {
                let size = self.pending.len();
                self.pending.clear();
                return Err(TorqlinkError::FrameInvalid(format!(
                    "no frame terminator within {} bytes (got {})",
                    MAX_FRAME_LENGTH, size
                )));
            }

            if complete {
                return Ok(std::mem::take(&mut self.pending));
            }
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameSource for FrameReader<R> {
    async fn read_frame(&mut self, timeout: Option<Duration>) -> TorqlinkResult<Vec<u8>> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.fill_frame())
                .await
                .map_err(|_| TorqlinkError::Timeout)?,
            None => self.fill_frame().await,
        }
    }
}

/// Writes whole frames to a byte stream
#[derive(Debug)]
pub struct FrameWriter<W> {
    writer: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            closed: false,
        }
    }

    /// Check if the write direction has been shut down
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameSink for FrameWriter<W> {
    async fn write_frame(&mut self, frame: &[u8]) -> TorqlinkResult<()> {
        if self.closed {
            return Err(TorqlinkError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Frame writer is closed",
            )));
        }
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> TorqlinkResult<()> {
        if !self.closed {
            self.closed = true;
            let _ = self.writer.shutdown().await;
        }
        Ok(())
    }
}
