use thiserror::Error;

/// Main error type for torqlink operations
#[derive(Error, Debug)]
pub enum TorqlinkError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout")]
    Timeout,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Frame invalid: {0}")]
    FrameInvalid(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TorqlinkError {
    /// Whether this error is a read/dial deadline expiring rather than a
    /// broken link
    pub fn is_timeout(&self) -> bool {
        match self {
            TorqlinkError::Timeout => true,
            TorqlinkError::Connection(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Result type alias for torqlink operations
pub type TorqlinkResult<T> = Result<T, TorqlinkError>;
