use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::cache::{CacheStore, MemoryCacheStore, PgCacheStore};
use crate::config::{AppConfig, SourceConfig};
use crate::db;
use crate::nutrition::NutritionService;
use crate::sources::{FoodSource, GenerativeSource, OpenFoodFactsSource};

#[derive(Clone)]
pub struct AppState {
    pub nutrition: Arc<NutritionService>,
}

impl AppState {
    /// Builds the state from configuration. Returns the pool too so the
    /// caller can run migrations against it.
    pub async fn init(config: &AppConfig) -> anyhow::Result<(Self, Option<PgPool>)> {
        let (cache, pool): (Arc<dyn CacheStore>, _) = match &config.database_url {
            Some(url) => {
                let pool = db::connect(url).await?;
                (Arc::new(PgCacheStore::new(pool.clone())), Some(pool))
            }
            None => {
                info!("DATABASE_URL not set; using in-memory nutrition cache");
                (Arc::new(MemoryCacheStore::new()), None)
            }
        };

        let source: Arc<dyn FoodSource> = match &config.source {
            SourceConfig::Catalog(c) => Arc::new(OpenFoodFactsSource::new(c)?),
            SourceConfig::Generative(g) => Arc::new(GenerativeSource::new(g)?),
        };
        info!(source = source.name(), "nutrition source ready");

        Ok((Self::from_parts(cache, source), pool))
    }

    pub fn from_parts(cache: Arc<dyn CacheStore>, source: Arc<dyn FoodSource>) -> Self {
        Self {
            nutrition: Arc::new(NutritionService::new(cache, source)),
        }
    }
}
