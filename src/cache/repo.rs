use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool};
use time::OffsetDateTime;
use tracing::debug;

use super::{CacheEntry, CacheError, CacheStore};
use crate::nutrition::dto::NutritionRecord;

#[derive(Debug, FromRow)]
struct CacheRow {
    food_name: String,
    product_id: Option<String>,
    nutrition_data: Option<Json<NutritionRecord>>,
    is_food: Option<bool>,
    created_at: OffsetDateTime,
}

impl From<CacheRow> for CacheEntry {
    fn from(r: CacheRow) -> Self {
        Self {
            key: r.food_name,
            product_id: r.product_id,
            nutrition_data: r.nutrition_data.map(|Json(record)| record),
            is_food: r.is_food,
            created_at: r.created_at,
        }
    }
}

/// `nutrition_cache` table in PostgreSQL.
#[derive(Clone)]
pub struct PgCacheStore {
    db: PgPool,
}

impl PgCacheStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT food_name, product_id, nutrition_data, is_food, created_at
              FROM nutrition_cache
             WHERE food_name = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(CacheEntry::from))
    }

    async fn get_by_product_id(&self, product_id: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT food_name, product_id, nutrition_data, is_food, created_at
              FROM nutrition_cache
             WHERE product_id = $1
             ORDER BY created_at DESC
             LIMIT 1
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(CacheEntry::from))
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO nutrition_cache (food_name, product_id, nutrition_data, is_food, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (food_name) DO UPDATE
               SET product_id = EXCLUDED.product_id,
                   nutrition_data = EXCLUDED.nutrition_data,
                   is_food = EXCLUDED.is_food,
                   created_at = EXCLUDED.created_at
            "#,
        )
        .bind(&entry.key)
        .bind(entry.product_id.as_deref())
        .bind(entry.nutrition_data.map(Json))
        .bind(entry.is_food)
        .bind(entry.created_at)
        .execute(&self.db)
        .await?;

        debug!(key = %entry.key, "cache entry upserted");
        Ok(())
    }
}
