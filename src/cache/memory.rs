use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheEntry, CacheError, CacheStore};

/// Process-local cache used when no database is configured. Contents are
/// lost on restart.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn get_by_product_id(&self, product_id: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .values()
            .filter(|e| e.product_id.as_deref() == Some(product_id))
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn upsert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().await.insert(entry.key.clone(), entry);
        Ok(())
    }
}
