use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hwbridge_core::{Bridge, Outcome};
use serde::Serialize;
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::RpcCodec;
use crate::config::RpcConfig;
use crate::error::{Result, RpcError};
use crate::protocol::{RequestFrame, RpcRequest, RpcResponse, VersionInfo};

/// Outbound messages buffered per connection.
const OUTBOUND_QUEUE: usize = 64;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Serves bridge operations on a Unix domain socket.
///
/// Every connection is handled on its own task and every request on its own
/// sub-task, so a `call` blocked on a device never holds up `enumerate`. When
/// a caller disconnects, its in-flight requests are cancelled.
pub struct RpcServer {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
    bridge: Arc<Bridge>,
    config: RpcConfig,
}

impl RpcServer {
    /// Bind with default configuration. Must be called inside a tokio runtime.
    pub fn bind(path: impl AsRef<Path>, bridge: Arc<Bridge>) -> Result<Self> {
        Self::bind_with_config(path, bridge, RpcConfig::default())
    }

    /// Bind with explicit configuration.
    ///
    /// An existing socket file at `path` is treated as stale and removed; any
    /// other kind of file is left alone and binding fails.
    pub fn bind_with_config(
        path: impl AsRef<Path>,
        bridge: Arc<Bridge>,
        config: RpcConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(RpcError::PathTooLong {
                path,
                len,
                max: MAX_PATH_LEN,
            });
        }
        let bind_err = |source| RpcError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(config.socket_mode))
            .map_err(bind_err)?;
        let metadata = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, transport = bridge.transport(), "rpc server listening");
        Ok(Self {
            listener,
            created_inode: (metadata.dev(), metadata.ino()),
            path,
            bridge,
            config,
        })
    }

    /// The path this server is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut next_connection = 1u64;
        loop {
            let stream = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted.map_err(RpcError::Accept)?.0,
            };
            let id = next_connection;
            next_connection += 1;
            debug!(connection = id, "accepted connection");

            let connection = Connection {
                id,
                bridge: Arc::clone(&self.bridge),
                cancel: shutdown.child_token(),
            };
            let codec = RpcCodec::with_max_frame(self.config.max_frame_size);
            tokio::spawn(async move {
                if let Err(err) = connection.serve(stream, codec).await {
                    warn!(connection = id, error = %err, "connection error");
                }
            });
        }
        info!(path = ?self.path, "rpc server stopped");
        Ok(())
    }
}

impl Drop for RpcServer {
    fn drop(&mut self) {
        let (expected_dev, expected_ino) = self.created_inode;
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
            }
        }
    }
}

struct Connection {
    id: u64,
    bridge: Arc<Bridge>,
    cancel: CancellationToken,
}

impl Connection {
    async fn serve(self, stream: UnixStream, codec: RpcCodec) -> Result<()> {
        let (mut sink, mut frames) = Framed::new(stream, codec).split();
        let (outbound, mut queue) = mpsc::channel::<RpcResponse>(OUTBOUND_QUEUE);

        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let payload = serde_json::to_vec(&message)?;
                sink.send(Bytes::from(payload)).await?;
            }
            Ok::<_, RpcError>(())
        });

        let result = self.read_requests(&mut frames, &outbound).await;
        // Abort whatever this caller still has in flight.
        self.cancel.cancel();
        drop(outbound);

        match writer.await {
            Ok(Err(err)) if result.is_ok() => Err(err),
            _ => result,
        }
    }

    async fn read_requests<S>(&self, frames: &mut S, outbound: &mpsc::Sender<RpcResponse>) -> Result<()>
    where
        S: futures_util::Stream<Item = Result<Bytes>> + Unpin,
    {
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                frame = frames.next() => frame,
            };
            let frame = match frame {
                Some(frame) => frame?,
                None => {
                    debug!(connection = self.id, "caller disconnected");
                    return Ok(());
                }
            };

            let RequestFrame { id, request } = match serde_json::from_slice(&frame) {
                Ok(parsed) => parsed,
                Err(err) => {
                    let id = serde_json::from_slice::<Value>(&frame)
                        .ok()
                        .and_then(|v| v.get("id").and_then(Value::as_u64))
                        .unwrap_or(0);
                    warn!(connection = self.id, error = %err, "invalid request");
                    let result = Outcome::failure("invalid request", err.to_string());
                    let _ = outbound.send(RpcResponse::Response { id, result }).await;
                    continue;
                }
            };
            trace!(connection = self.id, id, request = request.name(), "request");

            if request == RpcRequest::Listen {
                self.start_listening(id, outbound.clone()).await;
                continue;
            }

            let bridge = Arc::clone(&self.bridge);
            let cancel = self.cancel.child_token();
            let outbound = outbound.clone();
            tokio::spawn(async move {
                let result = dispatch(&bridge, request, &cancel).await;
                let _ = outbound.send(RpcResponse::Response { id, result }).await;
            });
        }
    }

    /// Acknowledge `listen`, then push the current set and every update.
    async fn start_listening(&self, id: u64, outbound: mpsc::Sender<RpcResponse>) {
        let mut updates = self.bridge.subscribe();
        let ack = RpcResponse::Response {
            id,
            result: Outcome::Success(Value::Null),
        };
        if outbound.send(ack).await.is_err() {
            return;
        }

        let bridge = Arc::clone(&self.bridge);
        let cancel = self.cancel.clone();
        let connection = self.id;
        tokio::spawn(async move {
            if let Ok(descriptors) = bridge.descriptors().await {
                if outbound.send(RpcResponse::Descriptors { descriptors }).await.is_err() {
                    return;
                }
            }
            loop {
                let update = tokio::select! {
                    _ = cancel.cancelled() => break,
                    update = updates.recv() => update,
                };
                match update {
                    Ok(descriptors) => {
                        if outbound.send(RpcResponse::Descriptors { descriptors }).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(connection, skipped, "listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(connection, "listener stopped");
        });
    }
}

async fn dispatch(bridge: &Bridge, request: RpcRequest, cancel: &CancellationToken) -> Outcome<Value> {
    match request {
        RpcRequest::Enumerate => to_outcome(bridge.enumerate(cancel).await),
        RpcRequest::Acquire { path, previous } => {
            to_outcome(bridge.acquire(&path, previous, cancel).await)
        }
        RpcRequest::Release { session } => to_outcome(bridge.release(&session).await),
        RpcRequest::Call { session, data } => to_outcome(bridge.call(&session, &data, cancel).await),
        RpcRequest::Send { session, data } => to_outcome(bridge.send(&session, &data, cancel).await),
        RpcRequest::Receive { session } => to_outcome(bridge.receive(&session, cancel).await),
        RpcRequest::Version => to_outcome(Ok(VersionInfo {
            name: "hwbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transport: bridge.transport().to_string(),
        })),
        RpcRequest::Listen => Outcome::failure("invalid request", "listen is handled per connection"),
    }
}

fn to_outcome<T: Serialize>(result: hwbridge_core::Result<T>) -> Outcome<Value> {
    match Outcome::from(result) {
        Outcome::Success(payload) => match serde_json::to_value(payload) {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::failure("unexpected error", err.to_string()),
        },
        Outcome::Failure { error, message } => Outcome::Failure { error, message },
    }
}
