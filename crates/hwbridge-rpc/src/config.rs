use std::path::PathBuf;

use crate::codec::DEFAULT_MAX_FRAME;

/// File name of the bridge socket.
pub const SOCKET_NAME: &str = "hwbridge.sock";

/// Default socket location: `$XDG_RUNTIME_DIR/hwbridge.sock`, else the
/// system temp directory.
pub fn default_socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join(SOCKET_NAME),
        _ => PathBuf::from("/tmp").join(SOCKET_NAME),
    }
}

/// Configuration for the RPC server.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Largest accepted frame. Default: 1 MiB.
    pub max_frame_size: usize,
    /// Permission bits applied to the socket file.
    pub socket_mode: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
            socket_mode: 0o600,
        }
    }
}
