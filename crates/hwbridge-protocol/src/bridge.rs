//! Legacy bridge envelope.
//!
//! The form HTTP/JSON callers exchange with the bridge: `type (2B BE) +
//! length (4B BE) + payload`, usually carried as a hex string. It has no chunk
//! header, so a bridge-framed message travels as one unchunked buffer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{put_type_length, read_type_length, Protocol, TYPE_LENGTH_SIZE};
use crate::error::{ProtocolError, Result};
use crate::message::{Message, MessageHeader};

/// Bridge envelope framing.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeProtocol;

impl Protocol for BridgeProtocol {
    fn name(&self) -> &'static str {
        "bridge"
    }

    fn encode(&self, payload: &[u8], message_type: u16) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(TYPE_LENGTH_SIZE + payload.len());
        put_type_length(&mut dst, message_type, payload.len())?;
        dst.put_slice(payload);
        Ok(dst.freeze())
    }

    fn min_chunk_size(&self) -> usize {
        TYPE_LENGTH_SIZE
    }

    fn chunk_header(&self, _encoded: &[u8]) -> Bytes {
        Bytes::new()
    }

    fn decode(&self, first_chunk: &[u8]) -> Result<(MessageHeader, Bytes)> {
        let header = read_type_length(first_chunk)?;
        let body = Bytes::copy_from_slice(&first_chunk[TYPE_LENGTH_SIZE..]);
        Ok((header, body))
    }
}

/// Serialize a message into the bridge envelope.
pub fn encode_legacy(message: &Message) -> Result<Bytes> {
    BridgeProtocol.encode(&message.payload, message.message_type)
}

/// Parse a complete bridge envelope.
///
/// Bytes past the declared length are ignored.
pub fn decode_legacy(bytes: &[u8]) -> Result<Message> {
    let (header, body) = BridgeProtocol.decode(bytes)?;
    if body.len() < header.length {
        return Err(ProtocolError::Truncated {
            expected: header.length,
            actual: body.len(),
        });
    }
    Ok(Message {
        message_type: header.message_type,
        payload: body.slice(..header.length),
    })
}

/// Encode a message as a hex bridge envelope.
pub fn encode_legacy_hex(message: &Message) -> Result<String> {
    Ok(hex::encode(encode_legacy(message)?))
}

/// Decode a hex bridge envelope.
pub fn decode_legacy_hex(data: &str) -> Result<Message> {
    let bytes = hex::decode(data.trim()).map_err(|_| ProtocolError::InvalidHex)?;
    decode_legacy(&bytes)
}
