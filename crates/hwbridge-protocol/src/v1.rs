use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{put_type_length, read_type_length, Protocol, TYPE_LENGTH_SIZE};
use crate::error::{ProtocolError, Result};
use crate::message::MessageHeader;

/// Report byte at the start of every v1 chunk.
pub const REPORT_ID: u8 = 0x3f;

/// Message magic: "##" (0x23 0x23).
pub const MAGIC: [u8; 2] = [0x23, 0x23];

/// Bytes of the first chunk before any payload: report id + magic + type + length.
pub const FIRST_CHUNK_OVERHEAD: usize = 1 + MAGIC.len() + TYPE_LENGTH_SIZE;

/// Native device framing.
///
/// Wire format of an encoded message:
/// ```text
/// ┌───────────┬───────────┬─────────────┬───────────────┐
/// │ Magic     │ Type      │ Length      │ Payload       │
/// │ "##"      │ (2B BE)   │ (4B BE)     │ (Length bytes)│
/// └───────────┴───────────┴─────────────┴───────────────┘
/// ```
/// Every chunk on the wire starts with [`REPORT_ID`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolV1;

impl Protocol for ProtocolV1 {
    fn name(&self) -> &'static str {
        "v1"
    }

    fn encode(&self, payload: &[u8], message_type: u16) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(MAGIC.len() + TYPE_LENGTH_SIZE + payload.len());
        dst.put_slice(&MAGIC);
        put_type_length(&mut dst, message_type, payload.len())?;
        dst.put_slice(payload);
        Ok(dst.freeze())
    }

    fn min_chunk_size(&self) -> usize {
        FIRST_CHUNK_OVERHEAD
    }

    fn chunk_header(&self, _encoded: &[u8]) -> Bytes {
        Bytes::from_static(&[REPORT_ID])
    }

    fn decode(&self, first_chunk: &[u8]) -> Result<(MessageHeader, Bytes)> {
        if first_chunk.len() < FIRST_CHUNK_OVERHEAD {
            return Err(ProtocolError::Truncated {
                expected: FIRST_CHUNK_OVERHEAD,
                actual: first_chunk.len(),
            });
        }
        if first_chunk[0] != REPORT_ID || first_chunk[1..3] != MAGIC {
            return Err(ProtocolError::Malformed("missing v1 chunk magic"));
        }
        let header = read_type_length(&first_chunk[3..])?;
        let body = Bytes::copy_from_slice(&first_chunk[FIRST_CHUNK_OVERHEAD..]);
        Ok((header, body))
    }
}
