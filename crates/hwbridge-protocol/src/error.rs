/// Errors that can occur while framing or unframing a device message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The bytes do not follow the expected layout.
    #[error("malformed protocol format: {0}")]
    Malformed(&'static str),

    /// Fewer bytes were available than the header declared.
    #[error("truncated message (expected {expected} bytes, got {actual})")]
    Truncated { expected: usize, actual: usize },

    /// The declared message length exceeds the configured maximum.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The chunk size is too small for the protocol's headers.
    #[error("invalid chunk size {chunk_size} (need at least {min} bytes)")]
    InvalidChunkSize { chunk_size: usize, min: usize },

    /// The legacy envelope is not valid hex.
    #[error("invalid hex in bridge envelope")]
    InvalidHex,
}

/// Failure of [`receive`](crate::receive).
///
/// Keeps the error of the chunk source intact so callers can tell a transport
/// failure (or cancellation) apart from a framing problem.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError<E> {
    /// Reading a chunk failed. Carries the reader's error unchanged.
    #[error("chunk read failed: {0}")]
    Read(E),

    /// The chunks did not form a valid message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
