//! TCP transport implementation

use crate::framed::{FrameReader, FrameWriter};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use torqlink_core::{DeviceConfig, TorqlinkError, TorqlinkResult};

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    /// `host:port` of the controller
    pub address: String,
    /// Bound on connection establishment; `None` waits for the OS
    pub connect_timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings with the default 5 second connect timeout
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Create TCP settings with timeout
    pub fn with_timeout(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Some(timeout),
        }
    }

    /// Settings for a configured device
    pub fn for_device(device: &DeviceConfig, timeout: Duration) -> Self {
        Self::with_timeout(device.endpoint(), timeout)
    }
}

/// An open TCP connection to a controller
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    peer: Option<SocketAddr>,
}

impl TcpTransport {
    /// Dial the controller
    ///
    /// # Errors
    ///
    /// Returns `TorqlinkError::Timeout` if the connect timeout elapses and
    /// `TorqlinkError::Connection` if the connection is refused or the
    /// address cannot be resolved.
    pub async fn open(settings: &TcpSettings) -> TorqlinkResult<Self> {
        let connect = TcpStream::connect(settings.address.as_str());
        let stream = bounded_connect(connect, settings.connect_timeout).await?;
        let _ = stream.set_nodelay(true);
        let peer = stream.peer_addr().ok();
        Ok(Self { stream, peer })
    }

    /// Wrap an already-connected stream
    pub fn from_connected_stream(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self { stream, peer }
    }

    /// Remote address, if known
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Split into an independent frame reader and frame writer
    pub fn into_framed(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        let (read, write) = self.stream.into_split();
        (FrameReader::new(read), FrameWriter::new(write))
    }
}

/// Await a connect attempt, giving up after `timeout`
async fn bounded_connect<F, T>(connect: F, timeout: Option<Duration>) -> TorqlinkResult<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| TorqlinkError::Timeout)?
            .map_err(TorqlinkError::from),
        None => Ok(connect.await?),
    }
}
