use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{UdpConfig, UsbConfig};
use crate::error::Result;

/// What kind of device sits behind a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// A device running regular firmware.
    Firmware,
    /// A device in bootloader mode.
    Bootloader,
    /// A software emulator reached over UDP.
    Emulator,
}

/// One device as observed by enumeration, without any session information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Stable path for the lifetime of the physical connection.
    pub path: String,
    /// USB product id (0 for the emulator).
    pub product: u16,
    /// Device kind.
    pub kind: DeviceKind,
}

/// Events pushed by a device backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The set of connected devices changed. Carries the complete new set.
    TransportInterfaceChange(Vec<DeviceDescriptor>),
}

/// Uniform capability over a device transport.
///
/// Each operation that can block on the device takes a cancellation token and
/// returns [`DeviceError::Cancelled`](crate::DeviceError::Cancelled) promptly once
/// it fires. Reads and writes move exactly one chunk.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Fixed chunk size of this transport.
    fn chunk_size(&self) -> usize;

    /// Start hot-plug monitoring. Calling it again is a no-op.
    fn listen(&self);

    /// Subscribe to hot-plug events.
    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent>;

    /// List currently connected devices.
    async fn enumerate(&self, cancel: &CancellationToken) -> Result<Vec<DeviceDescriptor>>;

    /// Open the device at `path`.
    ///
    /// With `exclusive` set, a concurrent open of the same path fails with
    /// `Busy` and any existing handle is replaced. Without it, an existing
    /// handle is reused after checking the device is still there.
    async fn open_device(&self, path: &str, exclusive: bool, cancel: &CancellationToken)
        -> Result<()>;

    /// Close the handle for `path`.
    async fn close_device(&self, path: &str) -> Result<()>;

    /// Read one chunk.
    async fn read(&self, path: &str, cancel: &CancellationToken) -> Result<Bytes>;

    /// Write one chunk.
    async fn write(&self, path: &str, chunk: &[u8], cancel: &CancellationToken) -> Result<()>;

    /// Stop monitoring and drop every open handle.
    fn dispose(&self);
}

/// Backend selection made once, at construction time.
#[derive(Debug, Clone)]
pub enum ApiConfig {
    /// Physical devices over USB (requires the `usb` feature).
    Usb(UsbConfig),
    /// The device emulator over UDP.
    Udp(UdpConfig),
}

impl ApiConfig {
    /// Backend name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ApiConfig::Usb(_) => "usb",
            ApiConfig::Udp(_) => "udp",
        }
    }
}

/// Build the device backend described by `config`.
pub fn create_api(config: ApiConfig) -> Result<Arc<dyn DeviceApi>> {
    match config {
        #[cfg(feature = "usb")]
        ApiConfig::Usb(config) => Ok(Arc::new(crate::usb::UsbApi::new(config))),
        #[cfg(not(feature = "usb"))]
        ApiConfig::Usb(_) => Err(crate::error::DeviceError::Unsupported("usb")),
        ApiConfig::Udp(config) => Ok(Arc::new(crate::udp::UdpApi::new(config))),
    }
}
