use bytes::Bytes;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::models::{
    optional_text, parse_year, Item as ItemModel, ItemPatch, ItemType, NewItem, SubType,
    DEFAULT_BRAND,
};
use crate::proto::common::MessageResponse;
use crate::proto::inventory::items_service_server::ItemsService;
use crate::proto::inventory::{
    CreateItemRequest, DeleteItemRequest, DownloadImageRequest, GetItemRequest,
    ImageUpload as ImageUploadProto, Item, ItemResponse, ListItemsRequest, ListItemsResponse,
    UpdateItemRequest,
};
use crate::query::ItemQuery;

use super::{stream_chunks, ChunkStream, ImageUpload, Inventory};

pub struct ItemsServiceImpl {
    inventory: Inventory,
    asset_url_prefix: String,
}

impl ItemsServiceImpl {
    pub fn new(inventory: Inventory, asset_url_prefix: impl Into<String>) -> Self {
        Self {
            inventory,
            asset_url_prefix: asset_url_prefix.into(),
        }
    }

    fn model_to_proto(&self, model: &ItemModel) -> Item {
        Item {
            id: model.id.to_string(),
            name: model.name.clone(),
            collection_number: model.collection_number.clone().unwrap_or_default(),
            year: model.year,
            color: model.color.clone().unwrap_or_default(),
            series: model.series.clone().unwrap_or_default(),
            number: model.number.clone().unwrap_or_default(),
            quantity: model.quantity,
            r#type: model.item_type.to_string(),
            sub_type: model.sub_type.to_string(),
            owned: model.owned,
            missing: model.missing,
            brand: model.brand.clone(),
            image: model.image.clone().unwrap_or_default(),
            image_url: model
                .image
                .as_deref()
                .map(|key| format!("{}/{}", self.asset_url_prefix.trim_end_matches('/'), key))
                .unwrap_or_default(),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

fn parse_id(id: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(id.trim()).map_err(|_| Status::invalid_argument(format!("Invalid item id: {}", id)))
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

fn query_from_proto(req: ListItemsRequest) -> ItemQuery {
    ItemQuery {
        page: (req.page > 0).then_some(req.page as i64),
        limit: (req.limit > 0).then_some(req.limit as i64),
        sort: non_empty(req.sort),
        order: non_empty(req.order),
        item_type: non_empty(req.r#type),
        sub_type: non_empty(req.sub_type),
        brand: non_empty(req.brand),
        owned: non_empty(req.owned),
        missing: non_empty(req.missing),
        query: non_empty(req.query),
    }
}

/// An upload with neither raw nor base64 content counts as no upload.
fn image_from_proto(image: Option<ImageUploadProto>) -> Result<Option<ImageUpload>, Status> {
    let Some(image) = image else {
        return Ok(None);
    };
    let data = if !image.data.is_empty() {
        Bytes::from(image.data)
    } else if let Some(encoded) = image.data_base64.as_deref().filter(|s| !s.is_empty()) {
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
            .map(Bytes::from)
            .map_err(|e| Status::invalid_argument(format!("Invalid base64: {}", e)))?
    } else {
        return Ok(None);
    };
    Ok(Some(ImageUpload {
        filename: image.filename,
        content_type: non_empty(image.content_type),
        data,
    }))
}

fn new_item_from_proto(req: &CreateItemRequest) -> Result<NewItem, Status> {
    Ok(NewItem {
        name: req.name.trim().to_string(),
        collection_number: optional_text(req.collection_number.as_str()),
        year: parse_year(&req.year)?,
        color: optional_text(req.color.as_str()),
        series: optional_text(req.series.as_str()),
        number: optional_text(req.number.as_str()),
        quantity: req.quantity,
        item_type: match non_empty(req.r#type.clone()) {
            Some(t) => t.parse::<ItemType>()?,
            None => ItemType::default(),
        },
        sub_type: match non_empty(req.sub_type.clone()) {
            Some(t) => t.parse::<SubType>()?,
            None => SubType::default(),
        },
        owned: req.owned,
        missing: req.missing,
        brand: non_empty(req.brand.trim().to_string()).unwrap_or_else(|| DEFAULT_BRAND.to_string()),
        image: None,
    })
}

fn patch_from_proto(req: &UpdateItemRequest) -> Result<ItemPatch, Status> {
    Ok(ItemPatch {
        name: req.name.as_deref().map(|n| n.trim().to_string()),
        collection_number: req.collection_number.as_deref().map(optional_text),
        year: req.year.as_deref().map(parse_year).transpose()?,
        color: req.color.as_deref().map(optional_text),
        series: req.series.as_deref().map(optional_text),
        number: req.number.as_deref().map(optional_text),
        quantity: req.quantity,
        item_type: req
            .r#type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(str::parse::<ItemType>)
            .transpose()?,
        sub_type: req
            .sub_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(str::parse::<SubType>)
            .transpose()?,
        owned: req.owned,
        missing: req.missing,
        brand: req.brand.as_deref().map(|b| b.trim().to_string()),
        image: Default::default(),
    })
}

#[tonic::async_trait]
impl ItemsService for ItemsServiceImpl {
    async fn list_items(
        &self,
        request: Request<ListItemsRequest>,
    ) -> Result<Response<ListItemsResponse>, Status> {
        let query = query_from_proto(request.into_inner());
        let page = self.inventory.list(&query).await?;

        Ok(Response::new(ListItemsResponse {
            items: page.items.iter().map(|i| self.model_to_proto(i)).collect(),
            total_pages: page.total_pages.min(i32::MAX as u64) as i32,
            current_page: page.current_page.min(i32::MAX as u32) as i32,
            total_count: page.total_count as i64,
        }))
    }

    async fn get_item(
        &self,
        request: Request<GetItemRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let id = parse_id(&request.into_inner().id)?;
        let item = self.inventory.get(id).await?;

        Ok(Response::new(ItemResponse {
            item: Some(self.model_to_proto(&item)),
        }))
    }

    async fn create_item(
        &self,
        request: Request<CreateItemRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let req = request.into_inner();
        let new = new_item_from_proto(&req)?;
        let image = image_from_proto(req.image)?;
        let item = self.inventory.create(new, image).await?;

        Ok(Response::new(ItemResponse {
            item: Some(self.model_to_proto(&item)),
        }))
    }

    async fn update_item(
        &self,
        request: Request<UpdateItemRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let req = request.into_inner();
        let id = parse_id(&req.id)?;
        let patch = patch_from_proto(&req)?;
        let image = image_from_proto(req.image)?;
        let item = self
            .inventory
            .update(id, patch, image, req.image_removed)
            .await?;

        Ok(Response::new(ItemResponse {
            item: Some(self.model_to_proto(&item)),
        }))
    }

    async fn delete_item(
        &self,
        request: Request<DeleteItemRequest>,
    ) -> Result<Response<MessageResponse>, Status> {
        let id = parse_id(&request.into_inner().id)?;
        self.inventory.delete(id).await?;

        Ok(Response::new(MessageResponse {
            message: "Item deleted successfully".to_string(),
        }))
    }

    type DownloadImageStream = ChunkStream;

    async fn download_image(
        &self,
        request: Request<DownloadImageRequest>,
    ) -> Result<Response<Self::DownloadImageStream>, Status> {
        let key = request.into_inner().key;
        let data = self.inventory.open_image(&key).await?;

        Ok(Response::new(stream_chunks(Bytes::from(data))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_defaults() {
        let req = CreateItemRequest {
            name: " Twin Mill ".to_string(),
            year: "1993".to_string(),
            sub_type: "monster trucks".to_string(),
            ..Default::default()
        };
        let new = new_item_from_proto(&req).unwrap();
        assert_eq!(new.name, "Twin Mill");
        assert_eq!(new.year, Some(1993));
        assert_eq!(new.item_type, ItemType::Car);
        assert_eq!(new.sub_type, SubType::MonsterTrucks);
        assert_eq!(new.brand, DEFAULT_BRAND);
        assert_eq!(new.collection_number, None);
    }

    #[test]
    fn test_create_request_rejects_bad_year_and_type() {
        let req = CreateItemRequest {
            name: "Deora".to_string(),
            year: "sixty-eight".to_string(),
            ..Default::default()
        };
        assert_eq!(
            new_item_from_proto(&req).unwrap_err().code(),
            tonic::Code::InvalidArgument
        );

        let req = CreateItemRequest {
            name: "Deora".to_string(),
            r#type: "Boat".to_string(),
            ..Default::default()
        };
        assert!(new_item_from_proto(&req).is_err());
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let req = UpdateItemRequest {
            id: Uuid::new_v4().to_string(),
            color: Some(String::new()),
            year: Some("2006".to_string()),
            quantity: Some(2),
            ..Default::default()
        };
        let patch = patch_from_proto(&req).unwrap();
        assert_eq!(patch.color, Some(None));
        assert_eq!(patch.year, Some(Some(2006)));
        assert_eq!(patch.quantity, Some(2));
        assert_eq!(patch.name, None);
        assert_eq!(patch.item_type, None);
    }

    #[test]
    fn test_image_upload_accepts_base64() {
        let image = image_from_proto(Some(ImageUploadProto {
            filename: "a.png".to_string(),
            content_type: String::new(),
            data: Vec::new(),
            data_base64: Some("aGVsbG8=".to_string()),
        }))
        .unwrap()
        .unwrap();
        assert_eq!(image.data, Bytes::from_static(b"hello"));
        assert_eq!(image.content_type, None);

        assert_eq!(image_from_proto(Some(ImageUploadProto::default())).unwrap(), None);
        assert!(image_from_proto(Some(ImageUploadProto {
            data_base64: Some("!!".to_string()),
            ..Default::default()
        }))
        .is_err());
    }

    #[test]
    fn test_list_request_treats_zero_and_empty_as_absent() {
        let query = query_from_proto(ListItemsRequest {
            page: 0,
            limit: 25,
            brand: "All".to_string(),
            ..Default::default()
        });
        assert_eq!(query.page, None);
        assert_eq!(query.limit, Some(25));
        assert_eq!(query.brand.as_deref(), Some("All"));
        assert_eq!(query.sort, None);
    }
}
