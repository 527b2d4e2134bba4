use bytes::Bytes;

/// Default upper bound for a declared message length: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// An application-level message: a type tag and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Device message type.
    pub message_type: u16,
    /// Payload bytes. Never interpreted by hwbridge.
    pub payload: Bytes,
}

impl Message {
    /// Create a new message.
    pub fn new(message_type: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type,
            payload: payload.into(),
        }
    }
}

/// Type and declared payload length read from a message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: u16,
    pub length: usize,
}
