//! Transport layer for the tightening-controller open protocol
//!
//! This crate dials controllers over TCP and moves whole NUL-terminated frames
//! across the connection.

pub mod stream;
pub mod framed;
pub mod tcp;

pub use framed::{FrameReader, FrameWriter};
pub use stream::{FrameSink, FrameSource};
pub use tcp::{TcpSettings, TcpTransport};
