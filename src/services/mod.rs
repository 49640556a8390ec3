pub mod archive_service;
pub mod health_service;
pub mod inventory;
pub mod items_service;

pub use archive_service::ArchiveServiceImpl;
pub use health_service::HealthServiceImpl;
pub use inventory::{ImageUpload, Inventory, PurgeSummary};
pub use items_service::ItemsServiceImpl;

use bytes::{Bytes, BytesMut};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

use crate::proto::common::DataChunk;

pub const CHUNK_SIZE: usize = 64 * 1024; // 64KB chunks

pub type ChunkStream = ReceiverStream<Result<DataChunk, Status>>;

/// Streams `data` to the client in fixed-size chunks. Stops early if the
/// client goes away.
pub fn stream_chunks(data: Bytes) -> ChunkStream {
    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let total_size = data.len() as i64;

    tokio::spawn(async move {
        let mut offset = 0i64;
        for chunk in data.chunks(CHUNK_SIZE) {
            let data_chunk = DataChunk {
                data: chunk.to_vec(),
                offset,
                total_size,
            };
            if tx.send(Ok(data_chunk)).await.is_err() {
                tracing::debug!("Client disconnected at offset {}", offset);
                break;
            }
            offset += chunk.len() as i64;
        }
    });

    ReceiverStream::new(rx)
}

/// Reassembles an uploaded chunk stream, refusing payloads over `limit`
/// bytes.
pub async fn collect_chunks<S>(mut stream: S, limit: usize) -> Result<Bytes, Status>
where
    S: Stream<Item = Result<DataChunk, Status>> + Unpin,
{
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if buffer.len() + chunk.data.len() > limit {
            return Err(Status::invalid_argument(format!(
                "upload exceeds {} bytes",
                limit
            )));
        }
        buffer.extend_from_slice(&chunk.data);
    }
    Ok(buffer.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_chunks_covers_payload() {
        let data = Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 10]);
        let chunks: Vec<DataChunk> = stream_chunks(data.clone())
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].offset, (CHUNK_SIZE * 2) as i64);
        assert!(chunks.iter().all(|c| c.total_size == data.len() as i64));

        let reassembled = collect_chunks(tokio_stream::iter(chunks.into_iter().map(Ok)), usize::MAX)
            .await
            .unwrap();
        assert_eq!(reassembled, data);
    }

    #[tokio::test]
    async fn test_collect_chunks_enforces_limit() {
        let chunks = vec![
            Ok(DataChunk {
                data: vec![0; 8],
                offset: 0,
                total_size: 16,
            }),
            Ok(DataChunk {
                data: vec![0; 8],
                offset: 8,
                total_size: 16,
            }),
        ];
        let err = collect_chunks(tokio_stream::iter(chunks), 10).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }
}
