mod memory;
mod repo;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::nutrition::dto::NutritionRecord;

pub use memory::MemoryCacheStore;
pub use repo::PgCacheStore;

/// One memoized resolution, keyed by normalized food name.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    /// External catalog id, kept as a secondary index.
    pub product_id: Option<String>,
    /// `None` only for confirmed non-foods.
    pub nutrition_data: Option<NutritionRecord>,
    /// `None` on legacy rows written before the flag existed.
    pub is_food: Option<bool>,
    pub created_at: OffsetDateTime,
}

impl CacheEntry {
    pub fn food(key: String, product_id: Option<String>, record: NutritionRecord) -> Self {
        Self {
            key,
            product_id,
            nutrition_data: Some(record),
            is_food: Some(true),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn not_food(key: String) -> Self {
        Self {
            key,
            product_id: None,
            nutrition_data: None,
            is_food: Some(false),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache query failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent memo of resolved foods. `Ok(None)` means the key is absent;
/// `Err` means the store itself could not answer.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn get_by_product_id(&self, product_id: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or fully replace the entry stored under `entry.key`.
    async fn upsert(&self, entry: CacheEntry) -> Result<(), CacheError>;
}
