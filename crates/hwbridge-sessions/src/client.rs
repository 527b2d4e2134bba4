use hwbridge_device::DeviceDescriptor;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::background::Envelope;
use crate::error::{Result, SessionsError};
use crate::types::{Acquired, Descriptor, SessionId, SessionsRequest, SessionsResponse};

/// Request/response façade over the authority.
///
/// Holds no session state of its own; every method is one round trip through
/// the authority's queue. Cheap to clone.
#[derive(Clone)]
pub struct SessionsClient {
    requests: mpsc::Sender<Envelope>,
    descriptors: broadcast::Sender<Vec<Descriptor>>,
}

impl SessionsClient {
    pub(crate) fn new(
        requests: mpsc::Sender<Envelope>,
        descriptors: broadcast::Sender<Vec<Descriptor>>,
    ) -> Self {
        Self {
            requests,
            descriptors,
        }
    }

    /// Send one request and wait for its answer.
    pub async fn request(&self, request: SessionsRequest) -> Result<SessionsResponse> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send((request, reply))
            .await
            .map_err(|_| SessionsError::Closed)?;
        answer.await.map_err(|_| SessionsError::Closed)?
    }

    /// Subscribe to session-annotated descriptor sets.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Descriptor>> {
        self.descriptors.subscribe()
    }

    pub async fn enumerate_done(&self, descriptors: Vec<DeviceDescriptor>) -> Result<Vec<Descriptor>> {
        match self.request(SessionsRequest::EnumerateDone { descriptors }).await? {
            SessionsResponse::Descriptors(descriptors) => Ok(descriptors),
            _ => Err(SessionsError::UnexpectedResponse("enumerate_done")),
        }
    }

    pub async fn acquire_intent(&self, path: &str, previous: Option<SessionId>) -> Result<Acquired> {
        let request = SessionsRequest::AcquireIntent {
            path: path.to_string(),
            previous,
        };
        match self.request(request).await? {
            SessionsResponse::Acquired(acquired) => Ok(acquired),
            _ => Err(SessionsError::UnexpectedResponse("acquire_intent")),
        }
    }

    pub async fn acquire_done(&self, path: &str) -> Result<()> {
        self.expect_done(SessionsRequest::AcquireDone {
            path: path.to_string(),
        })
        .await
    }

    pub async fn acquire_abort(&self, path: &str) -> Result<()> {
        self.expect_done(SessionsRequest::AcquireAbort {
            path: path.to_string(),
        })
        .await
    }

    /// Returns the path the session was holding.
    pub async fn release_intent(&self, session: &SessionId) -> Result<String> {
        self.expect_path(SessionsRequest::ReleaseIntent {
            session: session.clone(),
        })
        .await
    }

    pub async fn release_done(&self, path: &str) -> Result<()> {
        self.expect_done(SessionsRequest::ReleaseDone {
            path: path.to_string(),
        })
        .await
    }

    pub async fn get_path_by_session(&self, session: &SessionId) -> Result<String> {
        self.expect_path(SessionsRequest::GetPathBySession {
            session: session.clone(),
        })
        .await
    }

    pub async fn get_sessions(&self) -> Result<Vec<Descriptor>> {
        match self.request(SessionsRequest::GetSessions).await? {
            SessionsResponse::Descriptors(descriptors) => Ok(descriptors),
            _ => Err(SessionsError::UnexpectedResponse("get_sessions")),
        }
    }

    async fn expect_done(&self, request: SessionsRequest) -> Result<()> {
        let name = request.name();
        match self.request(request).await? {
            SessionsResponse::Done => Ok(()),
            _ => Err(SessionsError::UnexpectedResponse(name)),
        }
    }

    async fn expect_path(&self, request: SessionsRequest) -> Result<String> {
        let name = request.name();
        match self.request(request).await? {
            SessionsResponse::Path(path) => Ok(path),
            _ => Err(SessionsError::UnexpectedResponse(name)),
        }
    }
}
