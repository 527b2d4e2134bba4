use std::fmt;
use std::io;

use hwbridge_device::DeviceError;
use hwbridge_rpc::RpcError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn device_error(context: &str, err: DeviceError) -> CliError {
    match err {
        DeviceError::Io(source) => io_error(context, source),
        DeviceError::Unsupported(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match err {
        RpcError::Bind { source, .. }
        | RpcError::Connect { source, .. }
        | RpcError::Accept(source)
        | RpcError::Io(source) => io_error(context, source),
        RpcError::PathTooLong { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        RpcError::Rejected { ref error, .. } => {
            CliError::new(rejection_code(error), format!("{context}: {err}"))
        }
        RpcError::Json(_) | RpcError::InvalidMagic | RpcError::PayloadTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        RpcError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

/// Exit code for a failure reported by the bridge, keyed on its error code.
fn rejection_code(error: &str) -> i32 {
    match error {
        "device busy"
        | "device not found"
        | "device disconnected during action"
        | "device not opened"
        | "device i/o error"
        | "transport unavailable" => TRANSPORT_ERROR,
        "invalid hex data" | "malformed protocol format" | "message too large" | "invalid request" => {
            DATA_INVALID
        }
        "aborted by signal" => TIMEOUT,
        _ => FAILURE,
    }
}
