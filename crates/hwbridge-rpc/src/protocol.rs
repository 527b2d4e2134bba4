use hwbridge_core::Outcome;
use hwbridge_sessions::{Descriptor, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operations a caller can ask the bridge for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcRequest {
    Enumerate,
    Acquire {
        path: String,
        #[serde(default)]
        previous: Option<SessionId>,
    },
    Release {
        session: SessionId,
    },
    /// Write a hex bridge envelope and wait for the response.
    Call {
        session: SessionId,
        data: String,
    },
    Send {
        session: SessionId,
        data: String,
    },
    Receive {
        session: SessionId,
    },
    /// Subscribe this connection to descriptor updates.
    Listen,
    Version,
}

impl RpcRequest {
    /// Request name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            RpcRequest::Enumerate => "enumerate",
            RpcRequest::Acquire { .. } => "acquire",
            RpcRequest::Release { .. } => "release",
            RpcRequest::Call { .. } => "call",
            RpcRequest::Send { .. } => "send",
            RpcRequest::Receive { .. } => "receive",
            RpcRequest::Listen => "listen",
            RpcRequest::Version => "version",
        }
    }
}

/// A request as sent on the wire, with the id its response will carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    #[serde(flatten)]
    pub request: RpcRequest,
}

/// Messages sent by the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcResponse {
    /// Answer to the request with the same id.
    Response { id: u64, result: Outcome<Value> },
    /// Pushed to `listen` subscribers whenever the descriptor set changes.
    Descriptors { descriptors: Vec<Descriptor> },
}

/// Payload of a `version` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
    pub transport: String,
}
