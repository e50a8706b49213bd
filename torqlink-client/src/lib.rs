//! Multi-controller client for the tightening-controller open protocol
//!
//! One [`DeviceConnection`] per configured controller keeps a TCP session
//! alive, performs the MID 0001/0060 handshake, stores every tightening result
//! in the shared [`DeviceStore`] and acknowledges it. The [`Fleet`] starts one
//! connection task per device; [`StatusService`] answers status queries from
//! the store.
//!
//! # 实现状态
//!
//! ## 连接管理
//! - [x] 拨号超时与握手（MID 0001/0002, MID 0060/0005）
//! - [x] 结果读取循环与 MID 0062 确认
//! - [x] 保活任务（MID 9999）
//! - [x] 指数退避重连与冷却
//! - [x] 取消令牌与优雅关闭（MID 0003）
//!
//! ## 状态
//! - [x] 共享状态存储（读写锁）
//! - [x] 单设备/全部设备状态查询

pub mod connection;
pub mod fleet;
pub mod keepalive;
pub mod scheduler;
pub mod settings;
pub mod status;
pub mod store;

pub use connection::{ConnectionState, DeviceConnection, HandshakeStep, SessionOutcome};
pub use fleet::Fleet;
pub use scheduler::{ReconnectScheduler, RetryDelay};
pub use settings::{ClientSettings, PostConnectPolicy, ReconnectPolicy, SessionTimings};
pub use status::{DeviceReport, DeviceStatus, DeviceSummary, FleetStatus, StatusService};
pub use store::{DeviceState, DeviceStore};
