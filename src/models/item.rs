use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const DEFAULT_BRAND: &str = "Hot Wheels";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ItemType {
    #[default]
    Car,
    Playset,
    Others,
}

impl ItemType {
    pub const ALL: [ItemType; 3] = [ItemType::Car, ItemType::Playset, ItemType::Others];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Car => "Car",
            ItemType::Playset => "Playset",
            ItemType::Others => "Others",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::InvalidInput(format!("unknown type '{}'", s)))
    }
}

/// Only meaningful when the item type is [`ItemType::Car`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SubType {
    #[default]
    Car,
    Bike,
    Plane,
    #[serde(rename = "Monster Trucks")]
    MonsterTrucks,
    Rigs,
    Others,
}

impl SubType {
    pub const ALL: [SubType; 6] = [
        SubType::Car,
        SubType::Bike,
        SubType::Plane,
        SubType::MonsterTrucks,
        SubType::Rigs,
        SubType::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubType::Car => "Car",
            SubType::Bike => "Bike",
            SubType::Plane => "Plane",
            SubType::MonsterTrucks => "Monster Trucks",
            SubType::Rigs => "Rigs",
            SubType::Others => "Others",
        }
    }
}

impl fmt::Display for SubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::InvalidInput(format!("unknown sub type '{}'", s)))
    }
}

/// A stored inventory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub collection_number: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub quantity: i32,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub sub_type: SubType,
    pub owned: bool,
    pub missing: bool,
    pub brand: String,
    /// Asset key of the associated image.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Materialises a new record. Ids and timestamps are assigned here, never
    /// taken from the caller.
    pub fn from_new(new: NewItem) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            collection_number: new.collection_number,
            year: new.year,
            color: new.color,
            series: new.series,
            number: new.number,
            quantity: new.quantity,
            item_type: new.item_type,
            sub_type: new.sub_type,
            owned: new.owned,
            missing: new.missing,
            brand: new.brand,
            image: new.image,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Write model for inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub collection_number: Option<String>,
    pub year: Option<i32>,
    pub color: Option<String>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub quantity: i32,
    pub item_type: ItemType,
    pub sub_type: SubType,
    pub owned: bool,
    pub missing: bool,
    pub brand: String,
    pub image: Option<String>,
}

impl Default for NewItem {
    fn default() -> Self {
        Self {
            name: String::new(),
            collection_number: None,
            year: None,
            color: None,
            series: None,
            number: None,
            quantity: 0,
            item_type: ItemType::default(),
            sub_type: SubType::default(),
            owned: false,
            missing: false,
            brand: DEFAULT_BRAND.to_string(),
            image: None,
        }
    }
}

impl NewItem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        validate_name(&self.name)?;
        validate_brand(&self.brand)?;
        validate_quantity(self.quantity)
    }
}

/// What an update does to the record's image.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ImageChange {
    #[default]
    Keep,
    Replace(String),
    Remove,
}

/// The fields an update may touch. `None` leaves a field unchanged; for
/// optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub collection_number: Option<Option<String>>,
    pub year: Option<Option<i32>>,
    pub color: Option<Option<String>>,
    pub series: Option<Option<String>>,
    pub number: Option<Option<String>>,
    pub quantity: Option<i32>,
    pub item_type: Option<ItemType>,
    pub sub_type: Option<SubType>,
    pub owned: Option<bool>,
    pub missing: Option<bool>,
    pub brand: Option<String>,
    pub image: ImageChange,
}

impl ItemPatch {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(brand) = &self.brand {
            validate_brand(brand)?;
        }
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        Ok(())
    }

    /// Applies the patch in place and returns the image key the record no
    /// longer references, if any.
    pub fn apply(self, item: &mut Item) -> Option<String> {
        if let Some(v) = self.name {
            item.name = v;
        }
        if let Some(v) = self.collection_number {
            item.collection_number = v;
        }
        if let Some(v) = self.year {
            item.year = v;
        }
        if let Some(v) = self.color {
            item.color = v;
        }
        if let Some(v) = self.series {
            item.series = v;
        }
        if let Some(v) = self.number {
            item.number = v;
        }
        if let Some(v) = self.quantity {
            item.quantity = v;
        }
        if let Some(v) = self.item_type {
            item.item_type = v;
        }
        if let Some(v) = self.sub_type {
            item.sub_type = v;
        }
        if let Some(v) = self.owned {
            item.owned = v;
        }
        if let Some(v) = self.missing {
            item.missing = v;
        }
        if let Some(v) = self.brand {
            item.brand = v;
        }
        item.updated_at = Utc::now();

        match self.image {
            ImageChange::Keep => None,
            ImageChange::Remove => item.image.take(),
            ImageChange::Replace(key) => item.image.replace(key).filter(|old| {
                // Re-uploading under the same key must not delete the new file.
                item.image.as_deref() != Some(old.as_str())
            }),
        }
    }
}

fn validate_name(name: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidInput("name is required".to_string()));
    }
    Ok(())
}

fn validate_brand(brand: &str) -> AppResult<()> {
    if brand.trim().is_empty() {
        return Err(AppError::InvalidInput("brand is required".to_string()));
    }
    Ok(())
}

fn validate_quantity(quantity: i32) -> AppResult<()> {
    if quantity < 0 {
        return Err(AppError::InvalidInput(format!(
            "quantity must not be negative, got {}",
            quantity
        )));
    }
    Ok(())
}

/// Empty or whitespace-only text means "no value".
pub fn optional_text(raw: impl Into<String>) -> Option<String> {
    let raw = raw.into();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == raw.len() {
        Some(raw)
    } else {
        Some(trimmed.to_string())
    }
}

/// A year is an integer or empty.
pub fn parse_year(raw: &str) -> AppResult<Option<i32>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<i32>()
        .map(Some)
        .map_err(|_| AppError::InvalidInput(format!("year must be an integer, got '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_round_trips_through_strings() {
        for t in ItemType::ALL {
            assert_eq!(t.as_str().parse::<ItemType>().unwrap(), t);
        }
        for t in SubType::ALL {
            assert_eq!(t.as_str().parse::<SubType>().unwrap(), t);
        }
        assert_eq!("monster trucks".parse::<SubType>().unwrap(), SubType::MonsterTrucks);
        assert!("Boat".parse::<SubType>().is_err());
        assert!("All".parse::<ItemType>().is_err());
    }

    #[test]
    fn test_new_item_defaults() {
        let item = NewItem::named("Twin Mill");
        assert_eq!(item.brand, DEFAULT_BRAND);
        assert_eq!(item.quantity, 0);
        assert_eq!(item.item_type, ItemType::Car);
        assert_eq!(item.sub_type, SubType::Car);
        assert!(!item.owned);
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_new_item_validation() {
        assert!(NewItem::named("  ").validate().is_err());

        let mut item = NewItem::named("Bone Shaker");
        item.brand = String::new();
        assert!(item.validate().is_err());

        let mut item = NewItem::named("Bone Shaker");
        item.quantity = -1;
        assert!(matches!(item.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_store_does_not_derive_owned_from_quantity() {
        let mut new = NewItem::named("Twin Mill");
        new.year = Some(1993);
        let item = Item::from_new(new);
        assert_eq!(item.quantity, 0);
        assert!(!item.owned);
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut new = NewItem::named("Deora");
        new.color = Some("Orange".into());
        new.year = Some(1968);
        let mut item = Item::from_new(new);

        let patch = ItemPatch {
            quantity: Some(2),
            color: Some(None),
            ..Default::default()
        };
        assert!(patch.validate().is_ok());
        assert_eq!(patch.apply(&mut item), None);
        assert_eq!(item.name, "Deora");
        assert_eq!(item.year, Some(1968));
        assert_eq!(item.color, None);
        assert_eq!(item.quantity, 2);
    }

    #[test]
    fn test_patch_image_changes_release_old_key() {
        let mut new = NewItem::named("Deora");
        new.image = Some("old.png".into());
        let mut item = Item::from_new(new);

        let released = ItemPatch {
            image: ImageChange::Replace("new.png".into()),
            ..Default::default()
        }
        .apply(&mut item);
        assert_eq!(released.as_deref(), Some("old.png"));
        assert_eq!(item.image.as_deref(), Some("new.png"));

        let released = ItemPatch {
            image: ImageChange::Remove,
            ..Default::default()
        }
        .apply(&mut item);
        assert_eq!(released.as_deref(), Some("new.png"));
        assert_eq!(item.image, None);

        let released = ItemPatch {
            image: ImageChange::Remove,
            ..Default::default()
        }
        .apply(&mut item);
        assert_eq!(released, None);
    }

    #[test]
    fn test_patch_rejects_negative_quantity() {
        let patch = ItemPatch {
            quantity: Some(-3),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("").unwrap(), None);
        assert_eq!(parse_year(" 1993 ").unwrap(), Some(1993));
        assert!(parse_year("nineties").is_err());
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text("   "), None);
        assert_eq!(optional_text(" Red ").as_deref(), Some("Red"));
        assert_eq!(optional_text("Red").as_deref(), Some("Red"));
    }
}
