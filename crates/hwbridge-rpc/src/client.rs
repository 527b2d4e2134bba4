use std::collections::VecDeque;
use std::path::Path;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use hwbridge_core::Outcome;
use hwbridge_sessions::Descriptor;
use serde_json::Value;
use tokio::net::UnixStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::codec::RpcCodec;
use crate::error::{Result, RpcError};
use crate::protocol::{RequestFrame, RpcRequest, RpcResponse};

/// Connection to a running bridge.
///
/// Requests are answered in order; descriptor pushes that arrive while a
/// request is pending are kept for [`next_descriptors`](Self::next_descriptors).
pub struct RpcClient {
    framed: Framed<UnixStream, RpcCodec>,
    next_id: u64,
    pushed: VecDeque<Vec<Descriptor>>,
}

impl RpcClient {
    /// Connect to the bridge socket at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| RpcError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(?path, "connected to bridge");
        Ok(Self {
            framed: Framed::new(stream, RpcCodec::new()),
            next_id: 1,
            pushed: VecDeque::new(),
        })
    }

    /// Send a request and wait for its outcome.
    pub async fn request(&mut self, request: RpcRequest) -> Result<Outcome<Value>> {
        let id = self.next_id;
        self.next_id += 1;
        let payload = serde_json::to_vec(&RequestFrame { id, request })?;
        self.framed.send(Bytes::from(payload)).await?;

        loop {
            match self.next_message().await? {
                RpcResponse::Response { id: answered, result } if answered == id => return Ok(result),
                RpcResponse::Response { id: answered, .. } => {
                    debug!(answered, expected = id, "dropping stale response");
                }
                RpcResponse::Descriptors { descriptors } => self.pushed.push_back(descriptors),
            }
        }
    }

    /// Send a request and turn a failure outcome into [`RpcError::Rejected`].
    pub async fn call(&mut self, request: RpcRequest) -> Result<Value> {
        match self.request(request).await? {
            Outcome::Success(payload) => Ok(payload),
            Outcome::Failure { error, message } => Err(RpcError::Rejected { error, message }),
        }
    }

    /// Subscribe this connection to descriptor updates.
    pub async fn listen(&mut self) -> Result<()> {
        self.call(RpcRequest::Listen).await.map(|_| ())
    }

    /// Wait for the next descriptor set pushed after [`listen`](Self::listen).
    pub async fn next_descriptors(&mut self) -> Result<Vec<Descriptor>> {
        if let Some(descriptors) = self.pushed.pop_front() {
            return Ok(descriptors);
        }
        loop {
            match self.next_message().await? {
                RpcResponse::Descriptors { descriptors } => return Ok(descriptors),
                RpcResponse::Response { id, .. } => debug!(id, "dropping unexpected response"),
            }
        }
    }

    async fn next_message(&mut self) -> Result<RpcResponse> {
        let frame = self.framed.next().await.ok_or(RpcError::ConnectionClosed)??;
        Ok(serde_json::from_slice(&frame)?)
    }
}
