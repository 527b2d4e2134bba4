use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::message::MessageHeader;

/// Size of the shared `type (2B BE) + length (4B BE)` header.
pub const TYPE_LENGTH_SIZE: usize = 6;

/// One wire variant of the device protocol.
///
/// Implementations are stateless; the same value can frame any number of
/// messages concurrently.
pub trait Protocol: Send + Sync {
    /// Variant name for diagnostics.
    fn name(&self) -> &'static str;

    /// Serialize `payload` with its type and length header.
    fn encode(&self, payload: &[u8], message_type: u16) -> Result<Bytes>;

    /// Smallest chunk that can carry the complete first-chunk header.
    fn min_chunk_size(&self) -> usize;

    /// Header prefixed to every chunk of `encoded`.
    fn chunk_header(&self, encoded: &[u8]) -> Bytes;

    /// Parse the first chunk read from a device.
    ///
    /// Returns the declared header and whatever body bytes the chunk carries
    /// (possibly including padding past the declared length).
    fn decode(&self, first_chunk: &[u8]) -> Result<(MessageHeader, Bytes)>;
}

/// Write `type (BE) + length (BE)` into `dst`.
pub(crate) fn put_type_length(dst: &mut BytesMut, message_type: u16, payload_len: usize) -> Result<()> {
    let length = u32::try_from(payload_len).map_err(|_| ProtocolError::MessageTooLarge {
        size: payload_len,
        max: u32::MAX as usize,
    })?;
    dst.put_u16(message_type);
    dst.put_u32(length);
    Ok(())
}

/// Read `type (BE) + length (BE)` from the start of `src`.
pub(crate) fn read_type_length(src: &[u8]) -> Result<MessageHeader> {
    if src.len() < TYPE_LENGTH_SIZE {
        return Err(ProtocolError::Truncated {
            expected: TYPE_LENGTH_SIZE,
            actual: src.len(),
        });
    }
    let message_type = u16::from_be_bytes([src[0], src[1]]);
    let length = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
    Ok(MessageHeader {
        message_type,
        length,
    })
}
