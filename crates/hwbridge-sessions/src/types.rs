use std::fmt;

use hwbridge_device::{DeviceDescriptor, DeviceKind};
use serde::{Deserialize, Serialize};

/// Opaque session token. Issued by the authority, never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A visible device together with the session that currently owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub path: String,
    pub session: Option<SessionId>,
    pub product: u16,
    pub kind: DeviceKind,
}

impl Descriptor {
    pub(crate) fn new(device: &DeviceDescriptor, session: Option<SessionId>) -> Self {
        Self {
            path: device.path.clone(),
            session,
            product: device.product,
            kind: device.kind,
        }
    }
}

/// Result of a successful `acquire_intent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acquired {
    pub path: String,
    pub session: SessionId,
}

/// Every message the authority understands.
#[derive(Debug, Clone)]
pub enum SessionsRequest {
    /// Reconcile a fresh enumeration with the session table.
    EnumerateDone { descriptors: Vec<DeviceDescriptor> },
    /// Reserve a new session for `path` if `previous` is its current session.
    AcquireIntent {
        path: String,
        previous: Option<SessionId>,
    },
    /// Commit the reservation on `path`.
    AcquireDone { path: String },
    /// Discard the reservation on `path`, restoring its prior state.
    AcquireAbort { path: String },
    /// Mark `session` as releasing.
    ReleaseIntent { session: SessionId },
    /// Finish releasing `path`.
    ReleaseDone { path: String },
    GetPathBySession { session: SessionId },
    GetSessions,
}

impl SessionsRequest {
    /// Request name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnumerateDone { .. } => "enumerate_done",
            Self::AcquireIntent { .. } => "acquire_intent",
            Self::AcquireDone { .. } => "acquire_done",
            Self::AcquireAbort { .. } => "acquire_abort",
            Self::ReleaseIntent { .. } => "release_intent",
            Self::ReleaseDone { .. } => "release_done",
            Self::GetPathBySession { .. } => "get_path_by_session",
            Self::GetSessions => "get_sessions",
        }
    }
}

/// Answers from the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionsResponse {
    Descriptors(Vec<Descriptor>),
    Acquired(Acquired),
    Path(String),
    Done,
}
