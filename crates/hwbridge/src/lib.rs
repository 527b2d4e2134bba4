//! Bridge between local applications and hardware wallets.
//!
//! hwbridge owns the USB (or emulator) connection to every attached wallet,
//! arbitrates which caller holds each device, and frames messages on the
//! wire. Callers talk to it over a local socket.
//!
//! # Crate Structure
//!
//! - [`device`]: device transports (USB behind the `usb` feature, UDP emulator)
//! - [`protocol`]: v1 chunked wire framing and the hex bridge envelope
//! - [`sessions`]: the session authority and its client handle
//! - [`bridge`]: the orchestrator composing the three layers above
//! - [`rpc`]: the local socket server and client

/// Re-export device transport types.
pub mod device {
    pub use hwbridge_device::*;
}

/// Re-export protocol codec types.
pub mod protocol {
    pub use hwbridge_protocol::*;
}

/// Re-export session authority types.
pub mod sessions {
    pub use hwbridge_sessions::*;
}

/// Re-export bridge orchestrator types.
pub mod bridge {
    pub use hwbridge_core::*;
}

/// Re-export socket RPC types.
pub mod rpc {
    pub use hwbridge_rpc::*;
}
