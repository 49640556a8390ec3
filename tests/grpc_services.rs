use std::sync::Arc;

use diecast_inventory::proto::common::Empty;
use diecast_inventory::proto::health::health_check_response::ServingStatus;
use diecast_inventory::proto::health::health_server::Health;
use diecast_inventory::proto::health::HealthCheckRequest;
use diecast_inventory::proto::inventory::archive_service_server::ArchiveService;
use diecast_inventory::proto::inventory::items_service_server::ItemsService;
use diecast_inventory::proto::inventory::{
    CreateItemRequest, DeleteItemRequest, DownloadImageRequest, GetItemRequest, ImageUpload,
    ListItemsRequest, UpdateItemRequest,
};
use diecast_inventory::services::{
    collect_chunks, ArchiveServiceImpl, HealthServiceImpl, Inventory, ItemsServiceImpl,
};
use diecast_inventory::storage::LocalBackend;
use diecast_inventory::store::MemoryItemStore;
use tempfile::TempDir;
use tonic::{Code, Request};

async fn services() -> (TempDir, ItemsServiceImpl, ArchiveServiceImpl, HealthServiceImpl) {
    let tmp = tempfile::tempdir().unwrap();
    let assets = LocalBackend::new(tmp.path().join("uploads")).await.unwrap();
    let inventory = Inventory::new(
        Arc::new(MemoryItemStore::new()),
        Arc::new(assets),
        tmp.path().join("staging"),
    );
    (
        tmp,
        ItemsServiceImpl::new(inventory.clone(), "/uploads/"),
        ArchiveServiceImpl::new(inventory.clone()),
        HealthServiceImpl::new(inventory),
    )
}

fn create_request(name: &str, year: &str, brand: &str) -> CreateItemRequest {
    CreateItemRequest {
        name: name.to_string(),
        year: year.to_string(),
        brand: brand.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn list_filters_searches_and_paginates() {
    let (_tmp, items, _, _) = services().await;
    for (name, year, brand) in [
        ("Twin Mill", "1993", ""),
        ("Deora", "1968", ""),
        ("Bone Shaker", "2006", ""),
        ("Land Rover", "", "Matchbox"),
    ] {
        items
            .create_item(Request::new(create_request(name, year, brand)))
            .await
            .unwrap();
    }

    let by_year = items
        .list_items(Request::new(ListItemsRequest {
            query: "1993".to_string(),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(by_year.total_count, 1);
    assert_eq!(by_year.items[0].name, "Twin Mill");

    let hot_wheels = items
        .list_items(Request::new(ListItemsRequest {
            brand: "Hot Wheels".to_string(),
            owned: "All".to_string(),
            limit: 2,
            page: 2,
            sort: "year".to_string(),
            order: "desc".to_string(),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(hot_wheels.total_count, 3);
    assert_eq!(hot_wheels.total_pages, 2);
    assert_eq!(hot_wheels.current_page, 2);
    let names: Vec<&str> = hot_wheels.items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Deora"]);

    let nothing = items
        .list_items(Request::new(ListItemsRequest {
            query: "zamac".to_string(),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(nothing.total_pages, 0);
    assert!(nothing.items.is_empty());
}

#[tokio::test]
async fn item_lifecycle_with_image() {
    let (_tmp, items, _, _) = services().await;

    let mut create = create_request("Twin Mill", "1993", "");
    create.image = Some(ImageUpload {
        filename: "twin.png".to_string(),
        data: b"first-image".to_vec(),
        ..Default::default()
    });
    let created = items
        .create_item(Request::new(create))
        .await
        .unwrap()
        .into_inner()
        .item
        .unwrap();
    assert_eq!(created.brand, "Hot Wheels");
    assert_eq!(created.r#type, "Car");
    assert_eq!(created.image_url, format!("/uploads/{}", created.image));

    let updated = items
        .update_item(Request::new(UpdateItemRequest {
            id: created.id.clone(),
            quantity: Some(1),
            owned: Some(true),
            image: Some(ImageUpload {
                filename: "twin2.png".to_string(),
                data_base64: Some("c2Vjb25kLWltYWdl".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner()
        .item
        .unwrap();
    assert_eq!(updated.quantity, 1);
    assert!(updated.owned);
    assert_eq!(updated.year, Some(1993));
    assert_ne!(updated.image, created.image);

    let old = items
        .download_image(Request::new(DownloadImageRequest {
            key: created.image.clone(),
        }))
        .await;
    assert_eq!(old.unwrap_err().code(), Code::NotFound);

    let stream = items
        .download_image(Request::new(DownloadImageRequest {
            key: updated.image.clone(),
        }))
        .await
        .unwrap()
        .into_inner();
    let data = collect_chunks(stream, usize::MAX).await.unwrap();
    assert_eq!(&data[..], b"second-image");

    let cleared = items
        .update_item(Request::new(UpdateItemRequest {
            id: created.id.clone(),
            image_removed: true,
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner()
        .item
        .unwrap();
    assert!(cleared.image.is_empty());
    assert!(cleared.image_url.is_empty());

    items
        .delete_item(Request::new(DeleteItemRequest {
            id: created.id.clone(),
        }))
        .await
        .unwrap();
    let gone = items
        .get_item(Request::new(GetItemRequest { id: created.id }))
        .await
        .unwrap_err();
    assert_eq!(gone.code(), Code::NotFound);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let (_tmp, items, _, _) = services().await;

    let no_name = items
        .create_item(Request::new(create_request("   ", "", "")))
        .await
        .unwrap_err();
    assert_eq!(no_name.code(), Code::InvalidArgument);

    let negative = items
        .create_item(Request::new(CreateItemRequest {
            quantity: -1,
            ..create_request("Deora", "", "")
        }))
        .await
        .unwrap_err();
    assert_eq!(negative.code(), Code::InvalidArgument);

    let bad_id = items
        .get_item(Request::new(GetItemRequest {
            id: "not-a-uuid".to_string(),
        }))
        .await
        .unwrap_err();
    assert_eq!(bad_id.code(), Code::InvalidArgument);

    let missing = items
        .update_item(Request::new(UpdateItemRequest {
            id: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        }))
        .await
        .unwrap_err();
    assert_eq!(missing.code(), Code::NotFound);
}

#[tokio::test]
async fn export_stream_and_purge() {
    let (_tmp, items, archive, _) = services().await;
    items
        .create_item(Request::new(create_request("Deora", "1968", "")))
        .await
        .unwrap();

    let stream = archive
        .export_archive(Request::new(Empty {}))
        .await
        .unwrap()
        .into_inner();
    let bytes = collect_chunks(stream, usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"PK"));

    let purged = archive
        .purge(Request::new(Empty {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(purged.items_removed, 1);

    let listed = items
        .list_items(Request::new(ListItemsRequest::default()))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(listed.total_count, 0);
}

#[tokio::test]
async fn health_reports_serving() {
    let (_tmp, _, _, health) = services().await;
    let response = health
        .check(Request::new(HealthCheckRequest::default()))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(response.status, ServingStatus::Serving as i32);
}
