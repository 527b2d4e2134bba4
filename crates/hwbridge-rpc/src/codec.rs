use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::RpcError;

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "HB" (0x48 0x42).
pub const MAGIC: [u8; 2] = [0x48, 0x42];

/// Default maximum frame payload: 1 MiB.
pub const DEFAULT_MAX_FRAME: usize = 1024 * 1024;

/// Length-prefixed framing for RPC messages.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬──────────────────┐
/// │ Magic (2B)   │ Length    │ Payload (JSON)   │
/// │ 0x48 0x42    │ (4B LE)   │ (Length bytes)   │
/// │ "HB"         │           │                  │
/// └──────────────┴───────────┴──────────────────┘
/// ```
#[derive(Debug, Clone)]
pub struct RpcCodec {
    max_frame: usize,
}

impl RpcCodec {
    pub fn new() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self { max_frame }
    }
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for RpcCodec {
    type Item = Bytes;
    type Error = RpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, RpcError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }
        if src[0..2] != MAGIC {
            return Err(RpcError::InvalidMagic);
        }

        let len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if len > self.max_frame {
            return Err(RpcError::PayloadTooLarge {
                size: len,
                max: self.max_frame,
            });
        }

        let total = HEADER_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for RpcCodec {
    type Error = RpcError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), RpcError> {
        if payload.len() > self.max_frame {
            return Err(RpcError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_frame,
            });
        }
        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_slice(&MAGIC);
        dst.put_u32_le(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let mut codec = RpcCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(br#"{"type":"enumerate"}"#), &mut buf)
            .unwrap();
        assert_eq!(&buf[..2], b"HB");

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_ref(), br#"{"type":"enumerate"}"#);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let mut codec = RpcCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"hello"), &mut buf).unwrap();
        let mut partial = buf.split_to(HEADER_SIZE + 2);

        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.unsplit(buf);
        assert_eq!(codec.decode(&mut partial).unwrap().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn invalid_magic() {
        let mut buf = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0][..]);
        assert!(matches!(
            RpcCodec::new().decode(&mut buf),
            Err(RpcError::InvalidMagic)
        ));
    }

    #[test]
    fn oversized_frame_rejected_both_ways() {
        let mut codec = RpcCodec::with_max_frame(4);
        let mut buf = BytesMut::new();
        assert!(matches!(
            codec.encode(Bytes::from_static(b"12345"), &mut buf),
            Err(RpcError::PayloadTooLarge { size: 5, max: 4 })
        ));

        buf.put_slice(&MAGIC);
        buf.put_u32_le(64);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(RpcError::PayloadTooLarge { size: 64, max: 4 })
        ));
    }
}
