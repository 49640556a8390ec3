use std::future::Future;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_reflection::server::Builder as ReflectionBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::proto::health::health_server::HealthServer;
use crate::proto::inventory::archive_service_server::ArchiveServiceServer;
use crate::proto::inventory::items_service_server::ItemsServiceServer;
use crate::proto::FILE_DESCRIPTOR_SET;
use crate::services::{ArchiveServiceImpl, HealthServiceImpl, Inventory, ItemsServiceImpl};

/// Serves every gRPC service, with gRPC-Web and reflection, on `listener`
/// until `shutdown` resolves.
pub async fn serve(
    inventory: Inventory,
    asset_url_prefix: &str,
    max_message_size: usize,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    // Create services
    let items_service = ItemsServiceImpl::new(inventory.clone(), asset_url_prefix);
    let archive_service = ArchiveServiceImpl::new(inventory.clone());
    let health_service = HealthServiceImpl::new(inventory);

    // CORS layer for gRPC-Web
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(Any);

    // Build reflection service
    let reflection_service = ReflectionBuilder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    Server::builder()
        .accept_http1(true) // Required for gRPC-Web
        .layer(cors)
        .layer(tonic_web::GrpcWebLayer::new()) // Enable gRPC-Web
        .add_service(reflection_service)
        .add_service(
            ItemsServiceServer::new(items_service).max_decoding_message_size(max_message_size),
        )
        .add_service(ArchiveServiceServer::new(archive_service))
        .add_service(HealthServer::new(health_service))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    Ok(())
}
