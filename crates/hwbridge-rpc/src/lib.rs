//! Caller-facing RPC for the hwbridge bridge.
//!
//! Callers reach the bridge over a local Unix domain socket. Every message is
//! a JSON document in a length-prefixed frame:
//! - A 2-byte magic number ("HB") for stream synchronization
//! - A 4-byte little-endian payload length
//!
//! Requests carry an id; each answer repeats it together with the tagged
//! [`Outcome`](hwbridge_core::Outcome) of the operation.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::RpcClient;
pub use codec::{RpcCodec, DEFAULT_MAX_FRAME, HEADER_SIZE, MAGIC};
pub use config::{default_socket_path, RpcConfig, SOCKET_NAME};
pub use error::{Result, RpcError};
pub use protocol::{RequestFrame, RpcRequest, RpcResponse, VersionInfo};
pub use server::RpcServer;
