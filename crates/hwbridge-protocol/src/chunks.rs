use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::Protocol;
use crate::error::{ProtocolError, Result};
use crate::message::Message;

/// Split `encoded` into fixed-size chunks.
///
/// Every chunk starts with `header` and is zero-padded to `chunk_size`. A
/// `chunk_size` of zero disables chunking and yields one buffer. An empty
/// message still yields one header-only chunk, and a message that fills its
/// last chunk exactly yields no trailing empty chunk.
pub fn create_chunks(encoded: &[u8], header: &[u8], chunk_size: usize) -> Result<Vec<Bytes>> {
    if chunk_size == 0 {
        let mut single = BytesMut::with_capacity(header.len() + encoded.len());
        single.put_slice(header);
        single.put_slice(encoded);
        return Ok(vec![single.freeze()]);
    }
    if chunk_size <= header.len() {
        return Err(ProtocolError::InvalidChunkSize {
            chunk_size,
            min: header.len() + 1,
        });
    }

    let body = chunk_size - header.len();
    let count = encoded.len().div_ceil(body).max(1);
    let mut chunks = Vec::with_capacity(count);
    for index in 0..count {
        let start = index * body;
        let end = (start + body).min(encoded.len());
        let mut chunk = BytesMut::with_capacity(chunk_size);
        chunk.put_slice(header);
        chunk.put_slice(&encoded[start.min(end)..end]);
        chunk.resize(chunk_size, 0);
        chunks.push(chunk.freeze());
    }
    Ok(chunks)
}

/// Encode `message` with `protocol` and split it for a transport with `chunk_size`.
///
/// Rejects chunk sizes too small for the protocol's first-chunk header, which
/// [`receive`](crate::receive) could not reassemble.
pub fn encode_chunks<P>(protocol: &P, message: &Message, chunk_size: usize) -> Result<Vec<Bytes>>
where
    P: Protocol + ?Sized,
{
    let min = protocol.min_chunk_size();
    if chunk_size != 0 && chunk_size < min {
        return Err(ProtocolError::InvalidChunkSize { chunk_size, min });
    }
    let encoded = protocol.encode(&message.payload, message.message_type)?;
    let header = protocol.chunk_header(&encoded);
    create_chunks(&encoded, &header, chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v1::{ProtocolV1, FIRST_CHUNK_OVERHEAD, REPORT_ID};

    #[test]
    fn empty_message_is_one_chunk() {
        let chunks = create_chunks(&[], &[REPORT_ID], 64).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0][0], REPORT_ID);
        assert!(chunks[0][1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn exact_multiple_has_no_trailing_chunk() {
        let encoded = vec![1u8; 63 * 3];
        let chunks = create_chunks(&encoded, &[REPORT_ID], 64).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() == 64 && c[0] == REPORT_ID));
        assert!(chunks.iter().all(|c| c[1..].iter().all(|b| *b == 1)));
    }

    #[test]
    fn last_chunk_is_zero_padded() {
        let encoded = vec![9u8; 70];
        let chunks = create_chunks(&encoded, &[REPORT_ID], 64).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[1][1..8], &[9u8; 7]);
        assert!(chunks[1][8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn zero_chunk_size_means_unchunked() {
        let chunks = create_chunks(b"abcdef", &[], 0).unwrap();
        assert_eq!(chunks, vec![Bytes::from_static(b"abcdef")]);
    }

    #[test]
    fn chunk_size_must_exceed_header() {
        let err = create_chunks(b"abc", &[REPORT_ID], 1).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidChunkSize {
                chunk_size: 1,
                min: 2
            }
        );
    }

    #[test]
    fn v1_rejects_chunks_smaller_than_first_header() {
        let message = Message::new(7, vec![1, 2, 3, 4, 5]);
        for chunk_size in 2..FIRST_CHUNK_OVERHEAD {
            let err = encode_chunks(&ProtocolV1, &message, chunk_size).unwrap_err();
            assert_eq!(
                err,
                ProtocolError::InvalidChunkSize {
                    chunk_size,
                    min: FIRST_CHUNK_OVERHEAD
                }
            );
        }
        assert!(encode_chunks(&ProtocolV1, &message, FIRST_CHUNK_OVERHEAD).is_ok());
    }

    #[test]
    fn encode_chunks_prefixes_report_id() {
        let message = Message::new(1, vec![0u8; 100]);
        let chunks = encode_chunks(&ProtocolV1, &message, 64).unwrap();
        // 8 header bytes + 100 payload bytes over 63-byte bodies.
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0][..3], &[REPORT_ID, 0x23, 0x23]);
    }
}
