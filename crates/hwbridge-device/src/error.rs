/// Errors that can occur while talking to a physical (or emulated) device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The device is already being opened or is claimed by another handle.
    #[error("device busy: {path}")]
    Busy { path: String },

    /// No device is present at the given path.
    #[error("device not found: {0}")]
    NotFound(String),

    /// The device went away while an operation was in flight.
    #[error("device disconnected during action: {path}")]
    Disconnected { path: String },

    /// A read or write was attempted on a path that has no open handle.
    #[error("device not opened: {0}")]
    NotOpened(String),

    /// An I/O error occurred on the underlying transport.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The requested backend was not compiled into this build.
    #[error("{0} transport is not available in this build")]
    Unsupported(&'static str),
}

impl DeviceError {
    /// Returns true if the error was caused by cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DeviceError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
