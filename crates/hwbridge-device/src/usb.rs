use std::io::ErrorKind;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use nusb::transfer::{RequestBuffer, TransferError};
use nusb::DeviceInfo;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UsbConfig;
use crate::error::{DeviceError, Result};
use crate::handles::{Begin, OpenHandles};
use crate::hotplug::Monitor;
use crate::traits::{DeviceApi, DeviceDescriptor, DeviceEvent, DeviceKind};

/// USB transport for physical devices.
///
/// Devices are matched by vendor/product id and addressed as `bus-address`.
/// Opening a device claims its interface; a claim held elsewhere surfaces as
/// [`DeviceError::Busy`].
pub struct UsbApi {
    inner: Arc<UsbInner>,
}

struct UsbInner {
    config: UsbConfig,
    handles: OpenHandles<UsbHandle>,
    monitor: Monitor,
}

struct UsbHandle {
    // Keeps the device open for as long as the interface is claimed.
    _device: nusb::Device,
    interface: nusb::Interface,
}

impl UsbApi {
    /// Create the backend.
    pub fn new(config: UsbConfig) -> Self {
        Self {
            inner: Arc::new(UsbInner {
                config,
                handles: OpenHandles::new(),
                monitor: Monitor::new(),
            }),
        }
    }

    /// Fails with `Disconnected` and forgets the handle if `path` is gone.
    fn check_present(&self, path: &str) -> Result<()> {
        match self.inner.find(path) {
            Ok(_) => Ok(()),
            Err(DeviceError::NotFound(_)) => {
                self.inner.handles.remove(path);
                Err(DeviceError::Disconnected {
                    path: path.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}

fn device_path(info: &DeviceInfo) -> String {
    format!("{}-{}", info.bus_number(), info.device_address())
}

impl UsbInner {
    fn kind_of(&self, info: &DeviceInfo) -> Option<DeviceKind> {
        if info.vendor_id() != self.config.vendor_id {
            return None;
        }
        if info.product_id() == self.config.firmware_product_id {
            Some(DeviceKind::Firmware)
        } else if info.product_id() == self.config.bootloader_product_id {
            Some(DeviceKind::Bootloader)
        } else {
            None
        }
    }

    fn matching_devices(&self) -> Result<Vec<(DeviceInfo, DeviceKind)>> {
        Ok(nusb::list_devices()?
            .filter_map(|info| self.kind_of(&info).map(|kind| (info, kind)))
            .collect())
    }

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let found: Vec<DeviceDescriptor> = self
            .matching_devices()?
            .into_iter()
            .map(|(info, kind)| DeviceDescriptor {
                path: device_path(&info),
                product: info.product_id(),
                kind,
            })
            .collect();
        self.handles
            .retain_present(found.iter().map(|d| d.path.as_str()));
        Ok(found)
    }

    fn find(&self, path: &str) -> Result<DeviceInfo> {
        self.matching_devices()?
            .into_iter()
            .map(|(info, _)| info)
            .find(|info| device_path(info) == path)
            .ok_or_else(|| DeviceError::NotFound(path.to_string()))
    }

    fn open(&self, path: &str) -> Result<UsbHandle> {
        let info = self.find(path)?;
        let device = info.open().map_err(|err| claim_error(path, err))?;
        let interface = device
            .claim_interface(self.config.interface)
            .map_err(|err| claim_error(path, err))?;
        Ok(UsbHandle {
            _device: device,
            interface,
        })
    }
}

fn claim_error(path: &str, err: std::io::Error) -> DeviceError {
    match err.kind() {
        ErrorKind::ResourceBusy | ErrorKind::PermissionDenied => {
            warn!(path, error = %err, "device is claimed by another process");
            DeviceError::Busy {
                path: path.to_string(),
            }
        }
        ErrorKind::NotFound => DeviceError::NotFound(path.to_string()),
        _ => DeviceError::Io(err),
    }
}

fn transfer_error(path: &str, err: TransferError) -> DeviceError {
    match err {
        TransferError::Disconnected => DeviceError::Disconnected {
            path: path.to_string(),
        },
        TransferError::Cancelled => DeviceError::Cancelled,
        other => DeviceError::Io(std::io::Error::other(other.to_string())),
    }
}

#[async_trait]
impl DeviceApi for UsbApi {
    fn name(&self) -> &'static str {
        "usb"
    }

    fn chunk_size(&self) -> usize {
        self.inner.config.chunk_size
    }

    fn listen(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .monitor
            .start("usb", self.inner.config.poll_interval, move |_cancel| {
                let inner = Arc::clone(&inner);
                async move { inner.enumerate() }
            });
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.monitor.subscribe()
    }

    async fn enumerate(&self, cancel: &CancellationToken) -> Result<Vec<DeviceDescriptor>> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        self.inner.enumerate()
    }

    async fn open_device(
        &self,
        path: &str,
        exclusive: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(DeviceError::Cancelled);
        }
        match self.inner.handles.begin(path, exclusive)? {
            Begin::Reuse(_) => self.check_present(path),
            // The interface cannot be claimed twice, so an exclusive reopen
            // keeps our existing claim. Dropping the guard restores it.
            Begin::Open(guard) if guard.previous().is_some() => {
                drop(guard);
                self.check_present(path)?;
                debug!(path, "exclusive reopen keeps existing claim");
                Ok(())
            }
            Begin::Open(guard) => {
                let handle = self.inner.open(path)?;
                guard.commit(handle);
                info!(path, exclusive, "opened usb device");
                Ok(())
            }
        }
    }

    async fn close_device(&self, path: &str) -> Result<()> {
        match self.inner.handles.remove(path) {
            Some(_) => {
                debug!(path, "closed usb device");
                Ok(())
            }
            None => Err(DeviceError::NotOpened(path.to_string())),
        }
    }

    async fn read(&self, path: &str, cancel: &CancellationToken) -> Result<Bytes> {
        let handle = self.inner.handles.get(path)?;
        let transfer = handle.interface.interrupt_in(
            self.inner.config.endpoint_in,
            RequestBuffer::new(self.inner.config.chunk_size),
        );
        tokio::select! {
            // Dropping the transfer future cancels the pending USB transfer.
            _ = cancel.cancelled() => Err(DeviceError::Cancelled),
            completion = transfer => {
                let data = completion.into_result().map_err(|err| transfer_error(path, err))?;
                Ok(Bytes::from(data))
            }
        }
    }

    async fn write(&self, path: &str, chunk: &[u8], cancel: &CancellationToken) -> Result<()> {
        let handle = self.inner.handles.get(path)?;
        let transfer = handle
            .interface
            .interrupt_out(self.inner.config.endpoint_out, chunk.to_vec());
        tokio::select! {
            _ = cancel.cancelled() => Err(DeviceError::Cancelled),
            completion = transfer => {
                completion.into_result().map_err(|err| transfer_error(path, err))?;
                Ok(())
            }
        }
    }

    fn dispose(&self) {
        self.inner.monitor.stop();
        self.inner.handles.clear();
    }
}
