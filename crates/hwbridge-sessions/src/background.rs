//! The session authority.
//!
//! One task owns the `path -> session` table and handles requests strictly in
//! arrival order. Nothing else can reach the table, so two requests never
//! race: of two concurrent acquires naming the same `previous`, the second one
//! always observes the reservation made by the first.

use std::collections::BTreeMap;

use hwbridge_device::DeviceDescriptor;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::client::SessionsClient;
use crate::error::{Result, SessionsError};
use crate::types::{Acquired, Descriptor, SessionId, SessionsRequest, SessionsResponse};

/// Capacity of the request queue.
pub const REQUEST_QUEUE: usize = 64;

/// Capacity of the `descriptors` broadcast channel.
pub const DESCRIPTORS_CAPACITY: usize = 32;

pub(crate) type Envelope = (SessionsRequest, oneshot::Sender<Result<SessionsResponse>>);

/// Lifecycle of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathState {
    Idle,
    /// A new session is reserved but its device is not open yet.
    Reserved {
        session: SessionId,
        restore: Box<PathState>,
    },
    Committed(SessionId),
    Releasing(SessionId),
}

impl PathState {
    /// Session the optimistic lock compares `previous` against.
    fn current(&self) -> Option<&SessionId> {
        match self {
            PathState::Idle => None,
            PathState::Reserved { session, .. }
            | PathState::Committed(session)
            | PathState::Releasing(session) => Some(session),
        }
    }

    /// Session shown to callers. A reservation stays invisible until committed.
    fn visible(&self) -> Option<&SessionId> {
        match self {
            PathState::Reserved { restore, .. } => restore.visible(),
            other => other.current(),
        }
    }
}

struct Entry {
    device: DeviceDescriptor,
    state: PathState,
}

/// The session table and its transitions. Synchronous; the task around it
/// provides serialization.
pub(crate) struct SessionsState {
    entries: BTreeMap<String, Entry>,
    next_session: u64,
    changed: bool,
}

impl SessionsState {
    pub(crate) fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_session: 1,
            changed: false,
        }
    }

    /// Single entry point for every request.
    pub(crate) fn handle(&mut self, request: SessionsRequest) -> Result<SessionsResponse> {
        match request {
            SessionsRequest::EnumerateDone { descriptors } => {
                Ok(SessionsResponse::Descriptors(self.enumerate_done(descriptors)))
            }
            SessionsRequest::AcquireIntent { path, previous } => self
                .acquire_intent(&path, previous.as_ref())
                .map(SessionsResponse::Acquired),
            SessionsRequest::AcquireDone { path } => {
                self.acquire_done(&path).map(|_| SessionsResponse::Done)
            }
            SessionsRequest::AcquireAbort { path } => {
                self.acquire_abort(&path);
                Ok(SessionsResponse::Done)
            }
            SessionsRequest::ReleaseIntent { session } => {
                self.release_intent(&session).map(SessionsResponse::Path)
            }
            SessionsRequest::ReleaseDone { path } => {
                self.release_done(&path);
                Ok(SessionsResponse::Done)
            }
            SessionsRequest::GetPathBySession { session } => {
                self.path_by_session(&session).map(SessionsResponse::Path)
            }
            SessionsRequest::GetSessions => Ok(SessionsResponse::Descriptors(self.descriptors())),
        }
    }

    /// Whether the visible descriptor set changed since the last call.
    pub(crate) fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    pub(crate) fn descriptors(&self) -> Vec<Descriptor> {
        self.entries
            .values()
            .map(|entry| Descriptor::new(&entry.device, entry.state.visible().cloned()))
            .collect()
    }

    fn enumerate_done(&mut self, devices: Vec<DeviceDescriptor>) -> Vec<Descriptor> {
        let mut previous = std::mem::take(&mut self.entries);
        for device in devices {
            let state = match previous.remove(&device.path) {
                Some(entry) => entry.state,
                None => {
                    debug!(path = %device.path, "device appeared");
                    PathState::Idle
                }
            };
            self.entries.insert(device.path.clone(), Entry { device, state });
        }
        for (path, entry) in previous {
            match entry.state.current() {
                Some(session) => info!(%path, %session, "device vanished, session dropped"),
                None => debug!(%path, "device vanished"),
            }
        }
        // Every enumeration is broadcast, changed or not.
        self.changed = true;
        self.descriptors()
    }

    fn acquire_intent(&mut self, path: &str, previous: Option<&SessionId>) -> Result<Acquired> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| SessionsError::DescriptorNotFound(path.to_string()))?;
        if entry.state.current() != previous {
            debug!(
                path,
                expected = ?entry.state.current(),
                got = ?previous,
                "acquire rejected by optimistic lock"
            );
            return Err(SessionsError::WrongPreviousSession);
        }

        let session = SessionId::new(self.next_session.to_string());
        self.next_session += 1;
        let restore = std::mem::replace(&mut entry.state, PathState::Idle);
        entry.state = PathState::Reserved {
            session: session.clone(),
            restore: Box::new(restore),
        };
        trace!(path, %session, "session reserved");
        Ok(Acquired {
            path: path.to_string(),
            session,
        })
    }

    fn acquire_done(&mut self, path: &str) -> Result<()> {
        let entry = self
            .entries
            .get_mut(path)
            .ok_or_else(|| SessionsError::DescriptorNotFound(path.to_string()))?;
        match std::mem::replace(&mut entry.state, PathState::Idle) {
            PathState::Reserved { session, .. } => {
                info!(path, %session, "session acquired");
                entry.state = PathState::Committed(session);
                self.changed = true;
                Ok(())
            }
            other => {
                entry.state = other;
                Err(SessionsError::SessionNotFound)
            }
        }
    }

    fn acquire_abort(&mut self, path: &str) {
        let Some(entry) = self.entries.get_mut(path) else {
            return;
        };
        match std::mem::replace(&mut entry.state, PathState::Idle) {
            PathState::Reserved { session, restore } => {
                debug!(path, %session, "reservation discarded");
                entry.state = *restore;
            }
            other => entry.state = other,
        }
    }

    fn release_intent(&mut self, session: &SessionId) -> Result<String> {
        for (path, entry) in self.entries.iter_mut() {
            if entry.state == PathState::Committed(session.clone()) {
                entry.state = PathState::Releasing(session.clone());
                trace!(%path, %session, "session releasing");
                return Ok(path.clone());
            }
        }
        Err(SessionsError::SessionNotFound)
    }

    fn release_done(&mut self, path: &str) {
        let Some(entry) = self.entries.get_mut(path) else {
            debug!(path, "release finished for vanished device");
            return;
        };
        if let PathState::Releasing(session) = &entry.state {
            info!(path, %session, "session released");
            entry.state = PathState::Idle;
            self.changed = true;
        }
    }

    fn path_by_session(&self, session: &SessionId) -> Result<String> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.state.current() == Some(session))
            .map(|(path, _)| path.clone())
            .ok_or(SessionsError::SessionNotFound)
    }
}

/// Handle to the running authority task.
pub struct SessionsBackground {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionsBackground {
    /// Start the authority on the current runtime.
    pub fn spawn() -> (Self, SessionsClient) {
        let (requests, inbox) = mpsc::channel(REQUEST_QUEUE);
        let (descriptors, _) = broadcast::channel(DESCRIPTORS_CAPACITY);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run(inbox, descriptors.clone(), shutdown.clone()));
        let client = SessionsClient::new(requests, descriptors);
        (Self { shutdown, task }, client)
    }

    /// Stop the authority. Pending and later requests fail with `Closed`.
    pub fn dispose(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the task to finish after [`dispose`](Self::dispose).
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

async fn run(
    mut inbox: mpsc::Receiver<Envelope>,
    descriptors: broadcast::Sender<Vec<Descriptor>>,
    shutdown: CancellationToken,
) {
    let mut state = SessionsState::new();
    debug!("sessions authority started");
    loop {
        let (request, reply) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = inbox.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let name = request.name();
        let result = state.handle(request);
        if let Err(err) = &result {
            debug!(request = name, error = %err, "request failed");
        }
        if state.take_changed() {
            let _ = descriptors.send(state.descriptors());
        }
        if reply.send(result).is_err() {
            trace!(request = name, "caller went away before the reply");
        }
    }
    debug!("sessions authority stopped");
}
