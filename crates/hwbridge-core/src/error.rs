use hwbridge_device::DeviceError;
use hwbridge_protocol::ProtocolError;
use hwbridge_sessions::SessionsError;

/// Errors surfaced by bridge operations.
///
/// Inner errors are carried unchanged; [`code`](Self::code) gives the stable
/// string callers see on the wire.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Device(DeviceError),

    #[error(transparent)]
    Sessions(#[from] SessionsError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The caller's cancellation token fired.
    #[error("aborted by signal")]
    Cancelled,
}

impl From<DeviceError> for BridgeError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Cancelled => BridgeError::Cancelled,
            other => BridgeError::Device(other),
        }
    }
}

impl BridgeError {
    /// Stable error code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Device(err) => match err {
                DeviceError::Busy { .. } => "device busy",
                DeviceError::NotFound(_) => "device not found",
                DeviceError::Disconnected { .. } => "device disconnected during action",
                DeviceError::NotOpened(_) => "device not opened",
                DeviceError::Io(_) => "device i/o error",
                DeviceError::Cancelled => "aborted by signal",
                DeviceError::Unsupported(_) => "transport unavailable",
            },
            BridgeError::Sessions(err) => match err {
                SessionsError::WrongPreviousSession => "wrong previous session",
                SessionsError::SessionNotFound => "session not found",
                SessionsError::DescriptorNotFound(_) => "device not found",
                SessionsError::Closed | SessionsError::UnexpectedResponse(_) => {
                    "sessions background unavailable"
                }
            },
            BridgeError::Protocol(err) => match err {
                ProtocolError::InvalidHex => "invalid hex data",
                ProtocolError::MessageTooLarge { .. } => "message too large",
                ProtocolError::Malformed(_)
                | ProtocolError::Truncated { .. }
                | ProtocolError::InvalidChunkSize { .. } => "malformed protocol format",
            },
            BridgeError::Cancelled => "aborted by signal",
        }
    }

    /// Returns true if the operation was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
