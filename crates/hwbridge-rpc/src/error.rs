use std::path::PathBuf;

/// Errors that can occur on the RPC socket.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Failed to bind the server socket.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to a running bridge.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x4842 \"HB\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum frame size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred on the socket.
    #[error("rpc I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// The bridge answered a request with a failure.
    #[error("{error}: {message}")]
    Rejected { error: String, message: String },
}

pub type Result<T> = std::result::Result<T, RpcError>;
