use std::future::Future;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::Protocol;
use crate::error::{ProtocolError, ReceiveError};
use crate::message::Message;

/// Reassemble one message from successive chunks.
///
/// `read_chunk` is called once per chunk. The first chunk carries the header;
/// continuation chunks must start with the protocol's chunk header, which is
/// stripped. Reading stops as soon as the declared length is reached and any
/// padding is discarded. A declared length above `max_size` is rejected before
/// anything is buffered.
///
/// Dropping the returned future between chunks releases the partial buffer.
pub async fn receive<P, F, Fut, E>(
    mut read_chunk: F,
    protocol: &P,
    max_size: usize,
) -> Result<Message, ReceiveError<E>>
where
    P: Protocol + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Bytes, E>>,
{
    let first = read_chunk().await.map_err(ReceiveError::Read)?;
    let (header, body) = protocol.decode(&first)?;
    if header.length > max_size {
        return Err(ProtocolError::MessageTooLarge {
            size: header.length,
            max: max_size,
        }
        .into());
    }

    let mut payload = BytesMut::with_capacity(header.length);
    payload.extend_from_slice(&body[..body.len().min(header.length)]);

    let chunk_header = protocol.chunk_header(&first);
    let mut chunks = 1usize;
    while payload.len() < header.length {
        let chunk = read_chunk().await.map_err(ReceiveError::Read)?;
        chunks += 1;
        if !chunk.starts_with(&chunk_header) {
            return Err(ProtocolError::Malformed("continuation chunk header mismatch").into());
        }
        let body = &chunk[chunk_header.len()..];
        if body.is_empty() {
            return Err(ProtocolError::Truncated {
                expected: header.length,
                actual: payload.len(),
            }
            .into());
        }
        let wanted = header.length - payload.len();
        payload.extend_from_slice(&body[..body.len().min(wanted)]);
    }

    trace!(
        protocol = protocol.name(),
        message_type = header.message_type,
        length = header.length,
        chunks,
        "message reassembled"
    );
    Ok(Message {
        message_type: header.message_type,
        payload: payload.freeze(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::bridge::BridgeProtocol;
    use crate::chunks::{create_chunks, encode_chunks};
    use crate::message::DEFAULT_MAX_MESSAGE_SIZE;
    use crate::v1::{ProtocolV1, REPORT_ID};

    #[derive(Debug, PartialEq)]
    struct Unplugged;

    /// Feeds the given chunks, then fails like a vanished device.
    fn source(chunks: Vec<Bytes>) -> impl FnMut() -> std::future::Ready<Result<Bytes, Unplugged>> {
        let mut queue = VecDeque::from(chunks);
        move || std::future::ready(queue.pop_front().ok_or(Unplugged))
    }

    #[tokio::test]
    async fn roundtrip_across_lengths_and_chunk_sizes() {
        // 64 is the device size; 9 is the smallest v1 chunk and leaves the
        // first chunk without payload; 10 and 17 split the payload unevenly.
        for chunk_size in [9usize, 10, 17, 64] {
            for len in [0usize, 1, 7, 55, 56, 63, 64, 126, 127, 500] {
                let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
                let message = Message::new(0x1234, payload);
                let chunks = encode_chunks(&ProtocolV1, &message, chunk_size).unwrap();
                assert!(chunks.iter().all(|c| c.len() == chunk_size));

                let received = receive(source(chunks), &ProtocolV1, DEFAULT_MAX_MESSAGE_SIZE)
                    .await
                    .unwrap_or_else(|err| panic!("len {len} chunk {chunk_size}: {err:?}"));
                assert_eq!(received, message, "len {len} chunk {chunk_size}");
            }
        }
    }

    #[tokio::test]
    async fn bridge_protocol_unchunked() {
        let message = Message::new(3, Bytes::from_static(b"payload"));
        let chunks = encode_chunks(&BridgeProtocol, &message, 0).unwrap();
        assert_eq!(chunks.len(), 1);

        let received = receive(source(chunks), &BridgeProtocol, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn read_error_passes_through() {
        let message = Message::new(1, vec![0u8; 200]);
        let mut chunks = encode_chunks(&ProtocolV1, &message, 64).unwrap();
        chunks.truncate(2);

        let err = receive(source(chunks), &ProtocolV1, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiveError::Read(Unplugged)));
    }

    #[tokio::test]
    async fn continuation_without_report_id_is_malformed() {
        let message = Message::new(1, vec![0u8; 100]);
        let mut chunks = encode_chunks(&ProtocolV1, &message, 64).unwrap();
        let mut broken = chunks[1].to_vec();
        broken[0] = 0x00;
        chunks[1] = Bytes::from(broken);

        let err = receive(source(chunks), &ProtocolV1, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReceiveError::Protocol(ProtocolError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn oversized_declaration_rejected_before_reading_on() {
        let encoded = ProtocolV1.encode(&[], 1).unwrap();
        let mut first = encoded.to_vec();
        // Declare 1 MiB of payload.
        first[4..8].copy_from_slice(&(1024u32 * 1024).to_be_bytes());
        let chunks = create_chunks(&first, &[REPORT_ID], 64).unwrap();

        let err = receive(source(chunks), &ProtocolV1, 1024).await.unwrap_err();
        assert!(matches!(
            err,
            ReceiveError::Protocol(ProtocolError::MessageTooLarge {
                size: 1_048_576,
                max: 1024
            })
        ));
    }

    #[tokio::test]
    async fn empty_continuation_is_truncated() {
        let message = Message::new(1, vec![0u8; 100]);
        let mut chunks = encode_chunks(&ProtocolV1, &message, 64).unwrap();
        chunks[1] = Bytes::from_static(&[REPORT_ID]);

        let err = receive(source(chunks), &ProtocolV1, DEFAULT_MAX_MESSAGE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReceiveError::Protocol(ProtocolError::Truncated { expected: 100, .. })
        ));
    }
}
