use tonic::{Request, Response, Status, Streaming};

use crate::proto::common::{DataChunk, Empty};
use crate::proto::inventory::archive_service_server::ArchiveService;
use crate::proto::inventory::{ImportArchiveResponse, PurgeResponse};

use super::{collect_chunks, stream_chunks, ChunkStream, Inventory};

pub struct ArchiveServiceImpl {
    inventory: Inventory,
}

impl ArchiveServiceImpl {
    pub fn new(inventory: Inventory) -> Self {
        Self { inventory }
    }
}

fn saturating_i32(n: usize) -> i32 {
    n.min(i32::MAX as usize) as i32
}

#[tonic::async_trait]
impl ArchiveService for ArchiveServiceImpl {
    type ExportArchiveStream = ChunkStream;

    async fn export_archive(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Self::ExportArchiveStream>, Status> {
        let exported = self.inventory.export().await?;
        Ok(Response::new(stream_chunks(exported.bytes)))
    }

    async fn import_archive(
        &self,
        request: Request<Streaming<DataChunk>>,
    ) -> Result<Response<ImportArchiveResponse>, Status> {
        let data = collect_chunks(request.into_inner(), self.inventory.max_archive_bytes()).await?;
        tracing::info!("Received archive upload: {} bytes", data.len());

        let summary = self.inventory.import(data).await?;

        Ok(Response::new(ImportArchiveResponse {
            message: summary.message(),
            inserted: saturating_i32(summary.inserted),
            skipped: saturating_i32(summary.skipped),
            assets_copied: saturating_i32(summary.assets_copied),
            assets_failed: saturating_i32(summary.assets_failed),
        }))
    }

    async fn purge(&self, _request: Request<Empty>) -> Result<Response<PurgeResponse>, Status> {
        let summary = self.inventory.purge().await?;

        Ok(Response::new(PurgeResponse {
            message: "All data purged successfully".to_string(),
            items_removed: summary.items_removed as i64,
            assets_removed: summary.assets_removed as i64,
        }))
    }
}
