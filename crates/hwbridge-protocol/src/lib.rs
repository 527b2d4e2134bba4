//! Device wire framing for hwbridge.
//!
//! Two variants of the same message shape are supported:
//! - v1: the native chunk framing spoken by devices, with a `0x3f` report byte
//!   on every chunk and a `"##"` magic before the big-endian type and length
//! - bridge: the legacy `type + length + payload` envelope exchanged with
//!   callers as hex
//!
//! Everything here is pure except [`receive`], which pulls chunks from any
//! async source. No payload is ever interpreted.

pub mod bridge;
pub mod chunks;
pub mod codec;
pub mod error;
pub mod message;
pub mod receive;
pub mod v1;

pub use bridge::{decode_legacy, decode_legacy_hex, encode_legacy, encode_legacy_hex, BridgeProtocol};
pub use chunks::{create_chunks, encode_chunks};
pub use codec::Protocol;
pub use error::{ProtocolError, ReceiveError, Result};
pub use message::{Message, MessageHeader, DEFAULT_MAX_MESSAGE_SIZE};
pub use receive::receive;
pub use v1::ProtocolV1;
