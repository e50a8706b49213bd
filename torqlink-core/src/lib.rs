//! Core types and utilities for the tightening-controller open protocol
//!
//! This crate provides fundamental types, error handling, and message type
//! identifiers used throughout the torqlink implementation.

pub mod error;
pub mod device;
pub mod mid;
pub mod result;

pub use error::{TorqlinkError, TorqlinkResult};
pub use device::DeviceConfig;
pub use mid::Mid;
pub use result::{FieldValue, ResultMode, ResultRecord, TighteningResult};
