//! torqlink - client for the tightening-controller open protocol
//!
//! Keeps one connection per configured controller, decodes every tightening
//! result and republishes the latest state of each controller.
//!
//! # Architecture
//!
//! - `torqlink-core`: error type, device configuration, MIDs and result records
//! - `torqlink-codec`: frame header, control frames and MID 0061 decoding
//! - `torqlink-transport`: TCP dialing and NUL-delimited framing
//! - `torqlink-client`: state store, connection state machine, keep-alive,
//!   reconnect scheduling and status queries
//!
//! This crate adds the TOML configuration file and the `torqlink` daemon.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use torqlink::client::{DeviceStore, Fleet};
//! use torqlink::config::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> torqlink::TorqlinkResult<()> {
//! let config = Config::load("torqlink.toml")?;
//! let store = Arc::new(DeviceStore::new());
//! let fleet = Fleet::new(config.devices, store, config.client);
//! fleet.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

pub mod config;

pub use torqlink_core::{
    DeviceConfig, FieldValue, Mid, ResultMode, ResultRecord, TighteningResult, TorqlinkError,
    TorqlinkResult,
};

// Re-export the protocol codec
pub mod codec {
    pub use torqlink_codec::*;
}

// Re-export the transport layer
pub mod transport {
    pub use torqlink_transport::*;
}

// Re-export the client API
pub mod client {
    pub use torqlink_client::*;
}
