//! Bridge orchestrator for hwbridge.
//!
//! Composes a [`DeviceApi`](hwbridge_device::DeviceApi), the v1 wire framing
//! and the session authority into the operations callers use: enumerate,
//! acquire, release, call, send and receive. Operations return
//! [`Result`]; [`Outcome`] is the tagged form handed across process
//! boundaries.

pub mod bridge;
pub mod config;
pub mod error;
pub mod outcome;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use outcome::Outcome;
