use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::{DeviceDescriptor, DeviceEvent};

/// Capacity of the hot-plug event channel.
pub const EVENT_CAPACITY: usize = 32;

/// Polling hot-plug monitor shared by the backends.
///
/// Enumerates on a fixed interval and emits
/// [`DeviceEvent::TransportInterfaceChange`] whenever the observed set differs
/// from the previous observation. The first observation is always emitted.
pub(crate) struct Monitor {
    events: broadcast::Sender<DeviceEvent>,
    stop: CancellationToken,
    started: AtomicBool,
}

impl Monitor {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            stop: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Spawn the polling task. Only the first call has an effect.
    pub(crate) fn start<F, Fut>(&self, backend: &'static str, interval: Duration, enumerate: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<DeviceDescriptor>>> + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(backend, "listen called outside a tokio runtime; hot-plug disabled");
                self.started.store(false, Ordering::SeqCst);
                return;
            }
        };

        let events = self.events.clone();
        let stop = self.stop.clone();
        runtime.spawn(async move {
            debug!(backend, ?interval, "hot-plug monitor started");
            let mut last: Option<Vec<DeviceDescriptor>> = None;
            loop {
                match enumerate(stop.child_token()).await {
                    Ok(mut current) => {
                        current.sort_by(|a, b| a.path.cmp(&b.path));
                        if last.as_ref() != Some(&current) {
                            debug!(backend, devices = current.len(), "device set changed");
                            last = Some(current.clone());
                            let _ = events.send(DeviceEvent::TransportInterfaceChange(current));
                        }
                    }
                    Err(err) if err.is_cancelled() => break,
                    Err(err) => debug!(backend, error = %err, "hot-plug enumerate failed"),
                }

                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!(backend, "hot-plug monitor stopped");
        });
    }

    pub(crate) fn stop(&self) {
        self.stop.cancel();
    }
}
