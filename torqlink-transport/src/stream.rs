//! Frame-level stream traits

use async_trait::async_trait;
use std::time::Duration;
use torqlink_core::TorqlinkResult;

/// Source of whole frames from a controller connection
#[async_trait]
pub trait FrameSource: Send {
    /// Read one frame, including its NUL terminator
    ///
    /// # Arguments
    ///
    /// * `timeout` - Read deadline. `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns `TorqlinkError::Timeout` if the deadline expires; any partially
    /// received frame is kept and completed by the next call. Returns
    /// `TorqlinkError::Connection` if the peer closes or the socket fails.
    async fn read_frame(&mut self, timeout: Option<Duration>) -> TorqlinkResult<Vec<u8>>;
}

/// Sink for whole frames towards a controller connection
#[async_trait]
pub trait FrameSink: Send {
    /// Write one complete frame and flush it
    async fn write_frame(&mut self, frame: &[u8]) -> TorqlinkResult<()>;

    /// Shut down the write direction
    async fn close(&mut self) -> TorqlinkResult<()>;
}
