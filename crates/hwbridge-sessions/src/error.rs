/// Errors returned by the session authority.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionsError {
    /// The optimistic lock failed: `previous` is not the path's current session.
    #[error("wrong previous session")]
    WrongPreviousSession,

    /// The session is unknown, already released, or no longer reserved.
    #[error("session not found")]
    SessionNotFound,

    /// No device with this path is currently known.
    #[error("device not found: {0}")]
    DescriptorNotFound(String),

    /// The authority task has stopped.
    #[error("sessions authority is closed")]
    Closed,

    /// The authority answered with a response of the wrong kind.
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

pub type Result<T> = std::result::Result<T, SessionsError>;
