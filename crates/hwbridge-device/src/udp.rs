use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::UdpConfig;
use crate::error::{DeviceError, Result};
use crate::handles::{Begin, OpenHandles};
use crate::hotplug::Monitor;
use crate::traits::{DeviceApi, DeviceDescriptor, DeviceEvent, DeviceKind};

/// Liveness probe understood by the emulator.
pub const PING: &[u8] = b"PINGPING";
/// Expected answer to [`PING`].
pub const PONG: &[u8] = b"PONGPONG";

/// Device emulator transport over UDP.
///
/// Every configured endpoint is one potential device; it is considered
/// connected while it answers the `PINGPING` probe. The path of a device is
/// its `host:port` string.
pub struct UdpApi {
    inner: Arc<UdpInner>,
}

struct UdpInner {
    config: UdpConfig,
    handles: OpenHandles<UdpSocket>,
    monitor: Monitor,
}

impl UdpApi {
    /// Create the backend. No sockets are opened until a device is opened.
    pub fn new(config: UdpConfig) -> Self {
        Self {
            inner: Arc::new(UdpInner {
                config,
                handles: OpenHandles::new(),
                monitor: Monitor::new(),
            }),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "udp"
    }
}

impl UdpInner {
    fn endpoint(&self, path: &str) -> Result<SocketAddr> {
        path.parse::<SocketAddr>()
            .ok()
            .filter(|addr| self.config.endpoints.contains(addr))
            .ok_or_else(|| DeviceError::NotFound(path.to_string()))
    }

    async fn enumerate(&self, cancel: &CancellationToken) -> Result<Vec<DeviceDescriptor>> {
        let mut found = Vec::new();
        for endpoint in &self.config.endpoints {
            if ping(*endpoint, self.config.ping_timeout, cancel).await? {
                found.push(DeviceDescriptor {
                    path: endpoint.to_string(),
                    product: 0,
                    kind: DeviceKind::Emulator,
                });
            }
        }
        self.handles
            .retain_present(found.iter().map(|d| d.path.as_str()));
        Ok(found)
    }
}

/// Send the liveness probe to `addr` on a throwaway socket.
///
/// Returns `Ok(false)` when nothing answers in time or the port is closed.
async fn ping(addr: SocketAddr, timeout: Duration, cancel: &CancellationToken) -> Result<bool> {
    let socket = bind_for(addr).await?;
    socket.connect(addr).await?;
    if let Err(err) = socket.send(PING).await {
        debug!(%addr, error = %err, "emulator ping send failed");
        return Ok(false);
    }

    let mut buf = [0u8; 64];
    tokio::select! {
        _ = cancel.cancelled() => Err(DeviceError::Cancelled),
        answer = tokio::time::timeout(timeout, socket.recv(&mut buf)) => match answer {
            Ok(Ok(n)) => Ok(&buf[..n] == PONG),
            Ok(Err(err)) => {
                debug!(%addr, error = %err, "emulator not answering");
                Ok(false)
            }
            Err(_) => Ok(false),
        },
    }
}

async fn bind_for(addr: SocketAddr) -> Result<UdpSocket> {
    let local = match addr {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    };
    Ok(UdpSocket::bind(local).await?)
}

fn io_to_device(path: &str, err: std::io::Error) -> DeviceError {
    match err.kind() {
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::NotConnected => {
            DeviceError::Disconnected {
                path: path.to_string(),
            }
        }
        _ => DeviceError::Io(err),
    }
}

#[async_trait]
impl DeviceApi for UdpApi {
    fn name(&self) -> &'static str {
        self.transport_name()
    }

    fn chunk_size(&self) -> usize {
        self.inner.config.chunk_size
    }

    fn listen(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner
            .monitor
            .start("udp", self.inner.config.poll_interval, move |cancel| {
                let inner = Arc::clone(&inner);
                async move { inner.enumerate(&cancel).await }
            });
    }

    fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.monitor.subscribe()
    }

    async fn enumerate(&self, cancel: &CancellationToken) -> Result<Vec<DeviceDescriptor>> {
        self.inner.enumerate(cancel).await
    }

    async fn open_device(
        &self,
        path: &str,
        exclusive: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let addr = self.inner.endpoint(path)?;
        let timeout = self.inner.config.ping_timeout;

        match self.inner.handles.begin(path, exclusive)? {
            Begin::Reuse(_) => {
                if ping(addr, timeout, cancel).await? {
                    Ok(())
                } else {
                    self.inner.handles.remove(path);
                    Err(DeviceError::Disconnected {
                        path: path.to_string(),
                    })
                }
            }
            Begin::Open(guard) => {
                if !ping(addr, timeout, cancel).await? {
                    return Err(DeviceError::NotFound(path.to_string()));
                }
                let socket = bind_for(addr).await?;
                socket.connect(addr).await?;
                if guard.previous().is_some() {
                    debug!(path, "replacing emulator socket");
                }
                guard.commit(socket);
                info!(path, exclusive, "opened emulator");
                Ok(())
            }
        }
    }

    async fn close_device(&self, path: &str) -> Result<()> {
        match self.inner.handles.remove(path) {
            Some(_) => {
                debug!(path, "closed emulator");
                Ok(())
            }
            None => Err(DeviceError::NotOpened(path.to_string())),
        }
    }

    async fn read(&self, path: &str, cancel: &CancellationToken) -> Result<Bytes> {
        let socket = self.inner.handles.get(path)?;
        let mut buf = vec![0u8; self.inner.config.chunk_size];
        tokio::select! {
            _ = cancel.cancelled() => Err(DeviceError::Cancelled),
            received = socket.recv(&mut buf) => {
                let n = received.map_err(|err| io_to_device(path, err))?;
                buf.truncate(n);
                Ok(Bytes::from(buf))
            }
        }
    }

    async fn write(&self, path: &str, chunk: &[u8], cancel: &CancellationToken) -> Result<()> {
        let socket = self.inner.handles.get(path)?;
        tokio::select! {
            _ = cancel.cancelled() => Err(DeviceError::Cancelled),
            sent = socket.send(chunk) => {
                let n = sent.map_err(|err| io_to_device(path, err))?;
                if n != chunk.len() {
                    return Err(DeviceError::Io(std::io::Error::new(
                        ErrorKind::WriteZero,
                        format!("short datagram ({n} of {} bytes)", chunk.len()),
                    )));
                }
                Ok(())
            }
        }
    }

    fn dispose(&self) {
        self.inner.monitor.stop();
        self.inner.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal emulator: answers pings and echoes every other datagram back.
    async fn spawn_fake_emulator() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                let Ok((n, from)) = socket.recv_from(&mut buf).await else {
                    break;
                };
                let reply: &[u8] = if &buf[..n] == PING { PONG } else { &buf[..n] };
                let _ = socket.send_to(reply, from).await;
            }
        });
        addr
    }

    fn config_for(endpoints: Vec<SocketAddr>) -> UdpConfig {
        UdpConfig {
            endpoints,
            ping_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
            ..UdpConfig::default()
        }
    }

    async fn closed_port() -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.local_addr().unwrap()
    }

    #[tokio::test]
    async fn enumerate_lists_only_answering_endpoints() {
        let live = spawn_fake_emulator().await;
        let dead = closed_port().await;
        let api = UdpApi::new(config_for(vec![live, dead]));

        let found = api.enumerate(&CancellationToken::new()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, live.to_string());
        assert_eq!(found[0].kind, DeviceKind::Emulator);
    }

    #[tokio::test]
    async fn open_write_read_roundtrip() {
        let live = spawn_fake_emulator().await;
        let api = UdpApi::new(config_for(vec![live]));
        let cancel = CancellationToken::new();
        let path = live.to_string();

        api.open_device(&path, true, &cancel).await.unwrap();
        let mut chunk = vec![0u8; 64];
        chunk[..4].copy_from_slice(b"?##\x00");
        api.write(&path, &chunk, &cancel).await.unwrap();

        let echoed = api.read(&path, &cancel).await.unwrap();
        assert_eq!(echoed.as_ref(), chunk.as_slice());

        // A shared open reuses the handle after a liveness check.
        api.open_device(&path, false, &cancel).await.unwrap();
        api.close_device(&path).await.unwrap();
        assert!(matches!(
            api.read(&path, &cancel).await,
            Err(DeviceError::NotOpened(_))
        ));
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let api = UdpApi::new(config_for(vec![]));
        let err = api
            .open_device("127.0.0.1:1", true, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::NotFound(_)));
    }

    #[tokio::test]
    async fn pending_read_is_cancellable() {
        let live = spawn_fake_emulator().await;
        let api = Arc::new(UdpApi::new(config_for(vec![live])));
        let path = live.to_string();
        api.open_device(&path, true, &CancellationToken::new())
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let reader = {
            let api = Arc::clone(&api);
            let cancel = cancel.clone();
            let path = path.clone();
            tokio::spawn(async move { api.read(&path, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = reader.await.unwrap();
        assert!(matches!(result, Err(DeviceError::Cancelled)));
    }

    #[tokio::test]
    async fn listen_reports_device_set() {
        let live = spawn_fake_emulator().await;
        let api = UdpApi::new(config_for(vec![live]));
        let mut events = api.subscribe();
        api.listen();

        let DeviceEvent::TransportInterfaceChange(descriptors) =
            tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("event in time")
                .unwrap();
        assert_eq!(descriptors.len(), 1);
        api.dispose();
    }
}
