use std::collections::HashMap;
use std::sync::Arc;

use hwbridge_device::{DeviceApi, DeviceEvent};
use hwbridge_protocol::{
    decode_legacy_hex, encode_chunks, encode_legacy_hex, receive, Message, ProtocolV1,
    ReceiveError,
};
use hwbridge_sessions::{
    Acquired, Descriptor, SessionId, SessionsBackground, SessionsClient, SessionsError,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Mutex as IoLock, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// The bridge: device access, framing and sessions behind six operations.
///
/// Device hot-plug events are forwarded to the session authority for as long
/// as the bridge lives, so sessions of unplugged devices disappear even when
/// nobody calls [`enumerate`](Self::enumerate).
///
/// Device I/O is serialized per path: a `call` holds its device from the
/// first written chunk to the last read one, so concurrent callers never
/// interleave chunks.
pub struct Bridge {
    api: Arc<dyn DeviceApi>,
    sessions: SessionsClient,
    background: SessionsBackground,
    config: BridgeConfig,
    protocol: ProtocolV1,
    io_locks: Mutex<HashMap<String, Arc<IoLock<()>>>>,
    stop: CancellationToken,
}

impl Bridge {
    /// Start the session authority and hot-plug forwarding on the current runtime.
    pub fn new(api: Arc<dyn DeviceApi>, config: BridgeConfig) -> Self {
        let (background, sessions) = SessionsBackground::spawn();
        let stop = CancellationToken::new();

        let events = api.subscribe();
        tokio::spawn(forward_hotplug(
            Arc::clone(&api),
            sessions.clone(),
            events,
            stop.clone(),
        ));
        api.listen();
        info!(transport = api.name(), "bridge started");

        Self {
            api,
            sessions,
            background,
            config,
            protocol: ProtocolV1,
            io_locks: Mutex::new(HashMap::new()),
            stop,
        }
    }

    /// Name of the device transport in use.
    pub fn transport(&self) -> &'static str {
        self.api.name()
    }

    /// Subscribe to session-annotated descriptor sets.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Descriptor>> {
        self.sessions.subscribe()
    }

    /// Last known descriptor set, without touching the devices.
    pub async fn descriptors(&self) -> Result<Vec<Descriptor>> {
        Ok(self.sessions.get_sessions().await?)
    }

    /// List connected devices with their sessions.
    pub async fn enumerate(&self, cancel: &CancellationToken) -> Result<Vec<Descriptor>> {
        let devices = self
            .api
            .enumerate(cancel)
            .await
            .inspect_err(|err| debug!(step = "enumerate", error = %err, "enumerate failed"))?;
        Ok(self.sessions.enumerate_done(devices).await?)
    }

    /// Acquire an exclusive session on `path`.
    ///
    /// `previous` must name the path's current session (`None` if unowned).
    /// If the device cannot be opened the reservation is discarded and the
    /// open error returned.
    pub async fn acquire(
        &self,
        path: &str,
        previous: Option<SessionId>,
        cancel: &CancellationToken,
    ) -> Result<Acquired> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        let acquired = self.sessions.acquire_intent(path, previous).await?;

        if let Err(err) = self.api.open_device(path, true, cancel).await {
            warn!(step = "open", path, session = %acquired.session, error = %err, "acquire failed");
            if let Err(abort) = self.sessions.acquire_abort(path).await {
                warn!(path, error = %abort, "discarding reservation failed");
            }
            return Err(err.into());
        }

        if let Err(err) = self.sessions.acquire_done(path).await {
            // The path vanished between open and commit.
            warn!(step = "commit", path, error = %err, "acquire failed");
            if let Err(close) = self.api.close_device(path).await {
                warn!(path, error = %close, "closing uncommitted device failed");
            }
            return Err(err.into());
        }
        Ok(acquired)
    }

    /// Release `session` and close its device.
    ///
    /// A failure to close the device is logged; the session is released anyway.
    pub async fn release(&self, session: &SessionId) -> Result<()> {
        let path = self.sessions.release_intent(session).await?;
        if let Err(err) = self.api.close_device(&path).await {
            error!(%path, %session, error = %err, "closing device failed, releasing session anyway");
        }
        self.sessions.release_done(&path).await?;
        Ok(())
    }

    /// Write a request to the session's device and read its response.
    ///
    /// `data` and the returned value are hex bridge envelopes.
    pub async fn call(
        &self,
        session: &SessionId,
        data: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let (path, _io) = self.open_session(session, cancel).await?;
        let message = decode_legacy_hex(data)?;
        self.write_message(session, &path, &message, cancel)
            .await
            .inspect_err(|err| debug!(step = "write", %path, error = %err, "call failed"))?;
        let response = self
            .read_message(&path, cancel)
            .await
            .inspect_err(|err| debug!(step = "read", %path, error = %err, "call failed"))?;
        Ok(encode_legacy_hex(&response)?)
    }

    /// Write a message without waiting for a response.
    pub async fn send(&self, session: &SessionId, data: &str, cancel: &CancellationToken) -> Result<()> {
        let (path, _io) = self.open_session(session, cancel).await?;
        let message = decode_legacy_hex(data)?;
        self.write_message(session, &path, &message, cancel)
            .await
            .inspect_err(|err| debug!(step = "write", %path, error = %err, "send failed"))
    }

    /// Read the next message from the session's device.
    pub async fn receive(&self, session: &SessionId, cancel: &CancellationToken) -> Result<String> {
        let (path, _io) = self.open_session(session, cancel).await?;
        let message = self
            .read_message(&path, cancel)
            .await
            .inspect_err(|err| debug!(step = "read", %path, error = %err, "receive failed"))?;
        Ok(encode_legacy_hex(&message)?)
    }

    /// Stop hot-plug forwarding, the session authority and the device backend.
    pub fn dispose(&self) {
        self.stop.cancel();
        self.background.dispose();
        self.api.dispose();
        info!("bridge disposed");
    }

    /// Resolve the session's path, take its I/O lock and make sure the
    /// device is (still) open.
    async fn open_session(
        &self,
        session: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<(String, OwnedMutexGuard<()>)> {
        let path = self.sessions.get_path_by_session(session).await?;
        let io = self.lock_path(&path, cancel).await?;
        // The session may have been stolen while waiting for the lock.
        self.ensure_owner(session, &path).await?;
        self.api
            .open_device(&path, false, cancel)
            .await
            .inspect_err(|err| debug!(step = "open", %path, error = %err, "device open failed"))?;
        Ok((path, io))
    }

    async fn lock_path(&self, path: &str, cancel: &CancellationToken) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.io_locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(path.to_string()).or_default())
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(BridgeError::Cancelled),
            guard = lock.lock_owned() => Ok(guard),
        }
    }

    async fn ensure_owner(&self, session: &SessionId, path: &str) -> Result<()> {
        if self.sessions.get_path_by_session(session).await? != path {
            return Err(SessionsError::SessionNotFound.into());
        }
        Ok(())
    }

    async fn write_message(
        &self,
        session: &SessionId,
        path: &str,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let chunks = encode_chunks(&self.protocol, message, self.api.chunk_size())?;
        trace!(path, message_type = message.message_type, chunks = chunks.len(), "writing message");
        for chunk in &chunks {
            if cancel.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }
            self.ensure_owner(session, path).await?;
            self.api.write(path, chunk, cancel).await?;
        }
        Ok(())
    }

    async fn read_message(&self, path: &str, cancel: &CancellationToken) -> Result<Message> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }
        receive(
            || self.api.read(path, cancel),
            &self.protocol,
            self.config.max_message_size,
        )
        .await
        .map_err(|err| match err {
            ReceiveError::Read(err) => BridgeError::from(err),
            ReceiveError::Protocol(err) => BridgeError::from(err),
        })
    }
}

async fn forward_hotplug(
    api: Arc<dyn DeviceApi>,
    sessions: SessionsClient,
    mut events: broadcast::Receiver<DeviceEvent>,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = stop.cancelled() => break,
            event = events.recv() => event,
        };
        let devices = match event {
            Ok(DeviceEvent::TransportInterfaceChange(devices)) => devices,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Changes were missed; take a fresh look instead.
                warn!(skipped, "hot-plug events lagged, re-enumerating");
                match api.enumerate(&stop).await {
                    Ok(devices) => devices,
                    Err(err) => {
                        debug!(error = %err, "re-enumerate after lag failed");
                        continue;
                    }
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        debug!(devices = devices.len(), "transport interface changed");
        if let Err(err) = sessions.enumerate_done(devices).await {
            debug!(error = %err, "forwarding hot-plug event failed");
            break;
        }
    }
    debug!("hot-plug forwarding stopped");
}
