//! Local discovery and control engine for TP-Link Kasa smart home devices.
//!
//! This crate implements the TP-Link Smart Home Protocol: JSON commands
//! encrypted with an XOR autokey cipher, exchanged over TCP (with a 4-byte
//! big-endian length prefix) or UDP (one bare datagram each way) on port 9999.
//!
//! # Overview
//!
//! - [`codec`]: encrypted framing for one exchange
//! - [`transport`]: one request/response over TCP or UDP, with a timeout
//! - [`dispatch`]: command envelopes, outlet routing and reply validation
//! - [`device`]: device identity, cached state and operations
//! - [`discovery`]: periodic broadcast discovery with offline detection
//! - [`events`]: device and client notifications
//!
//! # Example
//!
//! ```no_run
//! use kasa_local::{Client, SendOptions, DEFAULT_PORT};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), kasa_local::Error> {
//!     let client = Client::default();
//!     let plug = client.get_device("192.168.1.100", DEFAULT_PORT, SendOptions::new()).await?;
//!
//!     let state = if plug.relay_state() { "on" } else { "off" };
//!     println!("{} ({}) is {}", plug.alias(), plug.model(), state);
//!     plug.toggle_power_state(SendOptions::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Protocol Details
//!
//! 1. Commands are JSON trees keyed by module, then operation
//!    (e.g. `{"system":{"get_sysinfo":{}}}`)
//! 2. The JSON is encrypted using XOR autokey cipher with initial key 171
//! 3. Over TCP, a 4-byte big-endian length of the plaintext is prepended
//! 4. Every operation result in the reply carries `err_code`, 0 on success
//! 5. Outlets of multi-outlet devices are addressed by adding
//!    `{"context":{"child_ids":[...]}}` at the envelope root

pub mod client;
pub mod codec;
pub mod commands;
pub mod crypto;
pub mod device;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod registry;
pub mod response;
pub mod transport;

pub use client::{Client, ClientOptions};
pub use device::{
    ChildScope, DEFAULT_IN_USE_THRESHOLD, Device, DeviceInfo, DeviceKind, DeviceOptions,
    DeviceStatus, SysInfoSnapshot,
};
pub use discovery::{
    DEFAULT_BROADCAST_ADDR, DEFAULT_DISCOVERY_INTERVAL, DEFAULT_OFFLINE_TOLERANCE, DiscoveryConfig,
    DiscoveryTarget, FilterReason,
};
pub use error::{DecodeError, Error, FailureReason, ModuleFailure, ResponseError};
pub use events::{ClientEvent, DeviceEvent, EventBus};
pub use response::{ChildInfo, EnergyReading, SysInfo};
pub use transport::{
    DEFAULT_TIMEOUT, EffectiveSendOptions, NetworkTransport, SendOptions, Transport, TransportKind,
};

/// The version of the kasa-local library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port for TP-Link Kasa smart devices, TCP and UDP.
pub const DEFAULT_PORT: u16 = 9999;
