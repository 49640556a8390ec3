//! Translation of loosely-typed list/search parameters into a typed filter,
//! a sort order and a page request.

pub mod pagination;

use std::cmp::Ordering;

use crate::models::{Item, ItemType, SubType};

pub use pagination::{Page, PageRequest, PageWindow, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Wildcard accepted by every categorical filter.
pub const ALL: &str = "All";

/// Raw list/search parameters as they arrive from a client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub item_type: Option<String>,
    pub sub_type: Option<String>,
    pub brand: Option<String>,
    pub owned: Option<String>,
    pub missing: Option<String>,
    pub query: Option<String>,
}

impl ItemQuery {
    pub fn filter(&self) -> ItemFilter {
        ItemFilter {
            item_type: category(&self.item_type).and_then(|s| s.parse().ok()),
            sub_type: category(&self.sub_type).and_then(|s| s.parse().ok()),
            brand: category(&self.brand).map(str::to_string),
            owned: yes_no(&self.owned),
            missing: yes_no(&self.missing),
            search: self.query.as_deref().and_then(TextSearch::new),
        }
    }

    pub fn sort(&self) -> Sort {
        Sort {
            field: self
                .sort
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(SortField::parse)
                .unwrap_or(SortField::Name),
            order: self
                .order
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or(SortOrder::Asc),
        }
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }
}

fn category(raw: &Option<String>) -> Option<&str> {
    raw.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case(ALL))
}

fn yes_no(raw: &Option<String>) -> Option<bool> {
    match raw.as_deref().map(str::trim) {
        Some(s) if s.eq_ignore_ascii_case("yes") => Some(true),
        Some(s) if s.eq_ignore_ascii_case("no") => Some(false),
        _ => None,
    }
}

/// A conjunction of optional constraints. The default value matches every
/// record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    pub sub_type: Option<SubType>,
    pub brand: Option<String>,
    pub owned: Option<bool>,
    pub missing: Option<bool>,
    pub search: Option<TextSearch>,
}

impl ItemFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, item: &Item) -> bool {
        self.item_type.map_or(true, |t| item.item_type == t)
            && self.sub_type.map_or(true, |t| item.sub_type == t)
            && self.brand.as_deref().map_or(true, |b| item.brand == b)
            && self.owned.map_or(true, |o| item.owned == o)
            && self.missing.map_or(true, |m| item.missing == m)
            && self.search.as_ref().map_or(true, |s| s.matches(item))
    }
}

/// Case-insensitive substring match over the descriptive text fields, OR-ed
/// with an exact year match when the needle is an integer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    needle: String,
    folded: String,
    year: Option<i32>,
}

impl TextSearch {
    pub fn new(query: &str) -> Option<Self> {
        let needle = query.trim();
        if needle.is_empty() {
            return None;
        }
        Some(Self {
            needle: needle.to_string(),
            folded: needle.to_lowercase(),
            year: needle.parse().ok(),
        })
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn matches(&self, item: &Item) -> bool {
        let texts = [
            Some(item.name.as_str()),
            item.series.as_deref(),
            item.color.as_deref(),
            item.number.as_deref(),
            Some(item.item_type.as_str()),
            Some(item.sub_type.as_str()),
            Some(item.brand.as_str()),
        ];
        texts
            .into_iter()
            .flatten()
            .any(|text| text.to_lowercase().contains(&self.folded))
            || self.year.is_some_and(|y| item.year == Some(y))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortField {
    Name,
    CollectionNumber,
    Year,
    Color,
    Series,
    Number,
    Quantity,
    Type,
    SubType,
    Brand,
    Owned,
    Missing,
    CreatedAt,
    /// Unrecognised names pass through; stores keep insertion order for them.
    Other(String),
}

impl SortField {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "name" => SortField::Name,
            "collectionNumber" | "collection_number" => SortField::CollectionNumber,
            "year" => SortField::Year,
            "color" => SortField::Color,
            "series" => SortField::Series,
            "number" => SortField::Number,
            "quantity" => SortField::Quantity,
            "type" => SortField::Type,
            "subType" | "sub_type" => SortField::SubType,
            "brand" => SortField::Brand,
            "owned" => SortField::Owned,
            "missing" => SortField::Missing,
            "createdAt" | "created_at" => SortField::CreatedAt,
            other => SortField::Other(other.to_string()),
        }
    }

    /// Column backing the field in the relational schema.
    pub fn column(&self) -> Option<&'static str> {
        Some(match self {
            SortField::Name => "name",
            SortField::CollectionNumber => "collection_number",
            SortField::Year => "year",
            SortField::Color => "color",
            SortField::Series => "series",
            SortField::Number => "number",
            SortField::Quantity => "quantity",
            SortField::Type => "item_type",
            SortField::SubType => "sub_type",
            SortField::Brand => "brand",
            SortField::Owned => "owned",
            SortField::Missing => "missing",
            SortField::CreatedAt => "created_at",
            SortField::Other(_) => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Anything but "asc" sorts descending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::Name,
            order: SortOrder::Asc,
        }
    }
}

impl Sort {
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// Ordering of two records under this sort. Missing values sort after
    /// present ones when ascending, before them when descending. Text compares
    /// case-insensitively first, like Postgres' default collation.
    pub fn compare(&self, a: &Item, b: &Item) -> Ordering {
        let ord = match &self.field {
            SortField::Name => text_cmp(&a.name, &b.name),
            SortField::CollectionNumber => {
                nulls_last_by(&a.collection_number, &b.collection_number, |a, b| text_cmp(a, b))
            }
            SortField::Year => nulls_last_by(&a.year, &b.year, Ord::cmp),
            SortField::Color => nulls_last_by(&a.color, &b.color, |a, b| text_cmp(a, b)),
            SortField::Series => nulls_last_by(&a.series, &b.series, |a, b| text_cmp(a, b)),
            SortField::Number => nulls_last_by(&a.number, &b.number, |a, b| text_cmp(a, b)),
            SortField::Quantity => a.quantity.cmp(&b.quantity),
            SortField::Type => text_cmp(a.item_type.as_str(), b.item_type.as_str()),
            SortField::SubType => text_cmp(a.sub_type.as_str(), b.sub_type.as_str()),
            SortField::Brand => text_cmp(&a.brand, &b.brand),
            SortField::Owned => a.owned.cmp(&b.owned),
            SortField::Missing => a.missing.cmp(&b.missing),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Other(_) => Ordering::Equal,
        };
        match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

fn text_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn nulls_last_by<T>(a: &Option<T>, b: &Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewItem;

    fn item(name: &str, f: impl FnOnce(&mut NewItem)) -> Item {
        let mut new = NewItem::named(name);
        f(&mut new);
        Item::from_new(new)
    }

    fn query(f: impl FnOnce(&mut ItemQuery)) -> ItemQuery {
        let mut q = ItemQuery::default();
        f(&mut q);
        q
    }

    #[test]
    fn test_no_parameters_is_unconstrained() {
        let filter = ItemQuery::default().filter();
        assert!(filter.is_unconstrained());
        assert!(filter.matches(&item("Anything", |_| {})));
    }

    #[test]
    fn test_all_sentinel_means_no_constraint() {
        let filter = query(|q| {
            q.item_type = Some("All".into());
            q.sub_type = Some("All".into());
            q.brand = Some("All".into());
            q.owned = Some("All".into());
            q.missing = Some("All".into());
            q.query = Some(String::new());
        })
        .filter();
        assert!(filter.is_unconstrained());
    }

    #[test]
    fn test_malformed_values_degrade_to_no_constraint() {
        let filter = query(|q| {
            q.item_type = Some("Spaceship".into());
            q.owned = Some("maybe".into());
        })
        .filter();
        assert!(filter.is_unconstrained());
    }

    #[test]
    fn test_categorical_and_boolean_constraints_are_anded() {
        let filter = query(|q| {
            q.item_type = Some("Car".into());
            q.sub_type = Some("Monster Trucks".into());
            q.brand = Some("Matchbox".into());
            q.owned = Some("Yes".into());
            q.missing = Some("No".into());
        })
        .filter();

        let hit = item("Bigfoot", |n| {
            n.sub_type = SubType::MonsterTrucks;
            n.brand = "Matchbox".into();
            n.owned = true;
        });
        assert!(filter.matches(&hit));

        let wrong_brand = item("Bigfoot", |n| {
            n.sub_type = SubType::MonsterTrucks;
            n.owned = true;
        });
        assert!(!filter.matches(&wrong_brand));

        let not_owned = item("Bigfoot", |n| {
            n.sub_type = SubType::MonsterTrucks;
            n.brand = "Matchbox".into();
        });
        assert!(!filter.matches(&not_owned));
    }

    #[test]
    fn test_text_search_is_case_insensitive_substring_over_fields() {
        let filter = query(|q| q.query = Some("SHARK".into())).filter();
        assert!(filter.matches(&item("Sharkruiser", |_| {})));
        assert!(filter.matches(&item("X", |n| n.series = Some("Shark Week".into()))));
        assert!(!filter.matches(&item("X", |n| {
            n.collection_number = Some("shark".into())
        })));

        let by_sub_type = query(|q| q.query = Some("monster".into())).filter();
        assert!(by_sub_type.matches(&item("X", |n| n.sub_type = SubType::MonsterTrucks)));

        let by_brand = query(|q| q.query = Some("wheels".into())).filter();
        assert!(by_brand.matches(&item("X", |_| {})));
    }

    #[test]
    fn test_integer_query_also_matches_year() {
        let twin_mill = item("Twin Mill", |n| n.year = Some(1993));
        let filter = query(|q| q.query = Some("1993".into())).filter();
        assert_eq!(filter.search.as_ref().and_then(TextSearch::year), Some(1993));
        assert!(filter.matches(&twin_mill));

        let other_year = item("Twin Mill", |n| n.year = Some(1970));
        assert!(!filter.matches(&other_year));
    }

    #[test]
    fn test_text_group_is_anded_with_categories() {
        let filter = query(|q| {
            q.query = Some("mill".into());
            q.item_type = Some("Playset".into());
        })
        .filter();
        assert!(!filter.matches(&item("Twin Mill", |_| {})));
        assert!(filter.matches(&item("Twin Mill", |n| n.item_type = ItemType::Playset)));
    }

    #[test]
    fn test_sort_defaults_and_parsing() {
        assert_eq!(ItemQuery::default().sort(), Sort::default());

        let sort = query(|q| {
            q.sort = Some("subType".into());
            q.order = Some("desc".into());
        })
        .sort();
        assert_eq!(sort, Sort::new(SortField::SubType, SortOrder::Desc));

        assert_eq!(SortOrder::parse("sideways"), SortOrder::Desc);
        assert_eq!(
            SortField::parse("horsepower"),
            SortField::Other("horsepower".into())
        );
        assert_eq!(SortField::parse("horsepower").column(), None);
    }

    #[test]
    fn test_sort_compare_places_missing_values_last_ascending() {
        let a = item("A", |n| n.year = Some(2000));
        let b = item("B", |_| {});
        let asc = Sort::new(SortField::Year, SortOrder::Asc);
        assert_eq!(asc.compare(&a, &b), Ordering::Less);
        let desc = Sort::new(SortField::Year, SortOrder::Desc);
        assert_eq!(desc.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_sort_compare_ignores_case_for_text() {
        let zebra = item("Zebra", |n| n.color = Some("white".into()));
        let apple = item("apple", |n| n.color = Some("Red".into()));
        let by_name = Sort::new(SortField::Name, SortOrder::Asc);
        assert_eq!(by_name.compare(&apple, &zebra), Ordering::Less);
        let by_color = Sort::new(SortField::Color, SortOrder::Asc);
        assert_eq!(by_color.compare(&apple, &zebra), Ordering::Less);

        let upper = item("Deora", |_| {});
        let lower = item("deora", |_| {});
        assert_ne!(by_name.compare(&upper, &lower), Ordering::Equal);
    }
}
