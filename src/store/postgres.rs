use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Item, ItemPatch, NewItem};
use crate::query::{ItemFilter, PageWindow, Sort};

use super::{ItemStore, UpdatedItem};

const COLUMNS: &str = "id, name, collection_number, year, color, series, number, quantity, \
                       item_type, sub_type, owned, missing, brand, image, created_at, updated_at";

/// Columns searched by free-text queries.
const TEXT_SEARCH_COLUMNS: [&str; 7] = [
    "name", "series", "color", "number", "item_type", "sub_type", "brand",
];

#[derive(Debug, Clone, FromRow)]
struct ItemRow {
    id: Uuid,
    name: String,
    collection_number: Option<String>,
    year: Option<i32>,
    color: Option<String>,
    series: Option<String>,
    number: Option<String>,
    quantity: i32,
    item_type: String,
    sub_type: String,
    owned: bool,
    missing: bool,
    brand: String,
    image: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = AppError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |e: AppError| AppError::Internal(format!("Corrupt item row {}: {}", id, e));
        Ok(Item {
            id: row.id,
            item_type: row.item_type.parse().map_err(corrupt)?,
            sub_type: row.sub_type.parse().map_err(corrupt)?,
            name: row.name,
            collection_number: row.collection_number,
            year: row.year,
            color: row.color,
            series: row.series,
            number: row.number,
            quantity: row.quantity,
            owned: row.owned,
            missing: row.missing,
            brand: row.brand,
            image: row.image,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Escapes `LIKE` wildcards so the needle matches literally.
fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ItemFilter) {
    qb.push(" WHERE TRUE");
    if let Some(item_type) = filter.item_type {
        qb.push(" AND item_type = ").push_bind(item_type.as_str());
    }
    if let Some(sub_type) = filter.sub_type {
        qb.push(" AND sub_type = ").push_bind(sub_type.as_str());
    }
    if let Some(brand) = &filter.brand {
        qb.push(" AND brand = ").push_bind(brand.clone());
    }
    if let Some(owned) = filter.owned {
        qb.push(" AND owned = ").push_bind(owned);
    }
    if let Some(missing) = filter.missing {
        qb.push(" AND missing = ").push_bind(missing);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search.needle()));
        qb.push(" AND (");
        {
            let mut any = qb.separated(" OR ");
            for column in TEXT_SEARCH_COLUMNS {
                any.push(format!("{} ILIKE ", column));
                any.push_bind_unseparated(pattern.clone());
            }
            if let Some(year) = search.year() {
                any.push("year = ");
                any.push_bind_unseparated(year);
            }
        }
        qb.push(")");
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: &Sort) {
    match sort.field.column() {
        Some(column) => {
            qb.push(format!(" ORDER BY {} {}, seq ASC", column, sort.order.as_sql()));
        }
        None => {
            qb.push(" ORDER BY seq ASC");
        }
    }
}

pub struct PgItemStore {
    pool: PgPool,
}

impl PgItemStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[tonic::async_trait]
impl ItemStore for PgItemStore {
    async fn find(
        &self,
        filter: &ItemFilter,
        sort: &Sort,
        window: PageWindow,
    ) -> AppResult<Vec<Item>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM items", COLUMNS));
        push_filter(&mut qb, filter);
        push_order(&mut qb, sort);
        if let Some(limit) = window.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        qb.push(" OFFSET ").push_bind(window.skip as i64);

        tracing::debug!("Item query: {}", qb.sql());

        let rows: Vec<ItemRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Item::try_from).collect()
    }

    async fn count(&self, filter: &ItemFilter) -> AppResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM items");
        push_filter(&mut qb, filter);
        let count: i64 = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn get(&self, id: Uuid) -> AppResult<Item> {
        let row: Option<ItemRow> =
            sqlx::query_as(&format!("SELECT {} FROM items WHERE id = $1", COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Item::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Item not found: {}", id)))
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Item>> {
        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM items WHERE name = $1 ORDER BY seq ASC LIMIT 1",
            COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Item::try_from).transpose()
    }

    async fn insert(&self, item: NewItem) -> AppResult<Item> {
        item.validate()?;
        let item = Item::from_new(item);

        let row: ItemRow = sqlx::query_as(&format!(
            "INSERT INTO items ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {}",
            COLUMNS, COLUMNS
        ))
        .bind(item.id)
        .bind(&item.name)
        .bind(&item.collection_number)
        .bind(item.year)
        .bind(&item.color)
        .bind(&item.series)
        .bind(&item.number)
        .bind(item.quantity)
        .bind(item.item_type.as_str())
        .bind(item.sub_type.as_str())
        .bind(item.owned)
        .bind(item.missing)
        .bind(&item.brand)
        .bind(&item.image)
        .bind(item.created_at)
        .bind(item.updated_at)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!("Inserted item: id={}, name={}", row.id, row.name);
        Item::try_from(row)
    }

    async fn update(&self, id: Uuid, patch: ItemPatch) -> AppResult<UpdatedItem> {
        patch.validate()?;
        let mut tx = self.pool.begin().await?;

        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM items WHERE id = $1 FOR UPDATE",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let mut item = row
            .map(Item::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Item not found: {}", id)))?;

        let released_image = patch.apply(&mut item);

        let row: ItemRow = sqlx::query_as(&format!(
            "UPDATE items SET name = $1, collection_number = $2, year = $3, color = $4, \
             series = $5, number = $6, quantity = $7, item_type = $8, sub_type = $9, \
             owned = $10, missing = $11, brand = $12, image = $13, updated_at = $14 \
             WHERE id = $15 \
             RETURNING {}",
            COLUMNS
        ))
        .bind(&item.name)
        .bind(&item.collection_number)
        .bind(item.year)
        .bind(&item.color)
        .bind(&item.series)
        .bind(&item.number)
        .bind(item.quantity)
        .bind(item.item_type.as_str())
        .bind(item.sub_type.as_str())
        .bind(item.owned)
        .bind(item.missing)
        .bind(&item.brand)
        .bind(&item.image)
        .bind(item.updated_at)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(UpdatedItem {
            item: Item::try_from(row)?,
            released_image,
        })
    }

    async fn delete(&self, id: Uuid) -> AppResult<Item> {
        let row: Option<ItemRow> =
            sqlx::query_as(&format!("DELETE FROM items WHERE id = $1 RETURNING {}", COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Item::try_from)
            .transpose()?
            .ok_or_else(|| AppError::NotFound(format!("Item not found: {}", id)))
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let rows_affected = sqlx::query("DELETE FROM items")
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(rows_affected)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ItemQuery, SortField, SortOrder};

    fn filter_sql(filter: &ItemFilter) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM items");
        push_filter(&mut qb, filter);
        qb.sql().to_string()
    }

    #[test]
    fn test_unconstrained_filter_sql() {
        assert_eq!(
            filter_sql(&ItemFilter::all()),
            "SELECT COUNT(*) FROM items WHERE TRUE"
        );
    }

    #[test]
    fn test_full_filter_sql() {
        let filter = ItemQuery {
            item_type: Some("Car".into()),
            brand: Some("Matchbox".into()),
            owned: Some("No".into()),
            query: Some("1993".into()),
            ..Default::default()
        }
        .filter();
        assert_eq!(
            filter_sql(&filter),
            "SELECT COUNT(*) FROM items WHERE TRUE AND item_type = $1 AND brand = $2 \
             AND owned = $3 AND (name ILIKE $4 OR series ILIKE $5 OR color ILIKE $6 \
             OR number ILIKE $7 OR item_type ILIKE $8 OR sub_type ILIKE $9 \
             OR brand ILIKE $10 OR year = $11)"
        );
    }

    #[test]
    fn test_text_only_query_has_no_year_branch() {
        let filter = ItemQuery {
            query: Some("mill".into()),
            ..Default::default()
        }
        .filter();
        assert!(!filter_sql(&filter).contains("year"));
    }

    #[test]
    fn test_order_by_uses_known_columns_only() {
        let mut qb = QueryBuilder::<Postgres>::new("");
        push_order(&mut qb, &Sort::new(SortField::SubType, SortOrder::Desc));
        assert_eq!(qb.sql(), " ORDER BY sub_type DESC, seq ASC");

        let mut qb = QueryBuilder::<Postgres>::new("");
        push_order(
            &mut qb,
            &Sort::new(SortField::Other("name; DROP TABLE items".into()), SortOrder::Asc),
        );
        assert_eq!(qb.sql(), " ORDER BY seq ASC");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
        assert_eq!(escape_like("Twin Mill"), "Twin Mill");
    }
}
