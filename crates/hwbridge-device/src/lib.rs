//! Device transports for hardware wallets.
//!
//! Provides a uniform [`DeviceApi`] over the ways a wallet can be reached:
//! - USB interrupt endpoints (behind the `usb` feature)
//! - A software emulator over UDP
//!
//! This is the lowest layer of hwbridge. Every backend moves fixed-size
//! chunks; message framing lives in `hwbridge-protocol`.

pub mod config;
pub mod error;
mod handles;
pub mod hotplug;
pub mod traits;
pub mod udp;

#[cfg(feature = "usb")]
pub mod usb;

pub use config::{
    UdpConfig, UsbConfig, DEFAULT_CHUNK_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_UDP_ENDPOINT,
};
pub use error::{DeviceError, Result};
pub use traits::{create_api, ApiConfig, DeviceApi, DeviceDescriptor, DeviceEvent, DeviceKind};
pub use udp::{UdpApi, PING, PONG};

#[cfg(feature = "usb")]
pub use usb::UsbApi;
