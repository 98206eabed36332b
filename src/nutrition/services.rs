use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::dto::{NutritionRecord, ProductSummary};
use super::mapper::map_to_nutrition_record;
use crate::cache::{CacheEntry, CacheStore};
use crate::error::NutritionError;
use crate::sources::{FoodSource, SourceFood, SourceOutcome};

/// Common nouns rejected before any cache or source access.
const NON_FOOD_WORDS: &[&str] = &[
    "car",
    "computer",
    "phone",
    "building",
    "house",
    "table",
    "chair",
    "desk",
    "television",
    "laptop",
    "keyboard",
    "mouse",
    "monitor",
    "window",
    "door",
    "shoe",
    "shirt",
    "pants",
    "dress",
    "hat",
    "glove",
    "sock",
    "watch",
    "clock",
    "camera",
    "book",
    "pen",
    "pencil",
    "paper",
    "notebook",
    "calculator",
];

/// Lowercased, trimmed form of a query; this is the cache key.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_denylisted(term: &str) -> bool {
    NON_FOOD_WORDS.contains(&term)
}

/// Resolves food queries through the cache first and the external source
/// second, memoizing every definitive answer.
pub struct NutritionService {
    cache: Arc<dyn CacheStore>,
    source: Arc<dyn FoodSource>,
}

impl NutritionService {
    pub fn new(cache: Arc<dyn CacheStore>, source: Arc<dyn FoodSource>) -> Self {
        Self { cache, source }
    }

    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn resolve(&self, raw_query: &str) -> Result<NutritionRecord, NutritionError> {
        let term = validated_term(raw_query)?;

        match self.cache.get(&term).await {
            Ok(Some(entry)) if entry.is_food == Some(false) => {
                debug!(%term, "cached not-food judgment");
                return Err(NutritionError::NotFood);
            }
            Ok(Some(CacheEntry {
                nutrition_data: Some(record),
                ..
            })) => {
                debug!(%term, "cache hit");
                return Ok(record);
            }
            Ok(_) => debug!(%term, "cache miss"),
            Err(e) => warn!(error = %e, %term, "cache read failed; treating as miss"),
        }

        match self.source.lookup(&term).await? {
            SourceOutcome::NotFound => {
                info!(%term, "no products found");
                Err(NutritionError::NotFound)
            }
            SourceOutcome::NotFood => {
                info!(%term, "source judged term not to be a food");
                self.store(CacheEntry::not_food(term)).await;
                Err(NutritionError::NotFood)
            }
            SourceOutcome::Found(food) => {
                let (product_id, record) = normalize_food(food);
                self.store(CacheEntry::food(term, product_id, record.clone()))
                    .await;
                Ok(record)
            }
        }
    }

    /// Id-addressed variant of [`resolve`](Self::resolve). The result is
    /// stored under the product's normalized name with the id as secondary key.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn resolve_product(&self, product_id: &str) -> Result<NutritionRecord, NutritionError> {
        let product_id = validated_product_id(product_id)?;

        match self.cache.get_by_product_id(product_id).await {
            Ok(Some(CacheEntry {
                nutrition_data: Some(record),
                ..
            })) => {
                debug!(product_id, "cache hit");
                return Ok(record);
            }
            Ok(_) => debug!(product_id, "cache miss"),
            Err(e) => warn!(error = %e, product_id, "cache read failed; treating as miss"),
        }

        match self.source.product(product_id).await? {
            SourceOutcome::Found(food) => {
                let (_, record) = normalize_food(food);
                let key = record
                    .product_name
                    .as_deref()
                    .map(normalize)
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| product_id.to_string());
                self.store(CacheEntry::food(
                    key,
                    Some(product_id.to_string()),
                    record.clone(),
                ))
                .await;
                Ok(record)
            }
            SourceOutcome::NotFound => Err(NutritionError::NotFound),
            SourceOutcome::NotFood => Err(NutritionError::NotFood),
        }
    }

    /// Candidate products for a query. Not cached.
    #[instrument(skip(self), fields(source = self.source.name()))]
    pub async fn search(&self, raw_query: &str) -> Result<Vec<ProductSummary>, NutritionError> {
        let term = validated_term(raw_query)?;
        Ok(self.source.search(&term).await?)
    }

    /// Write failures never reach the caller.
    async fn store(&self, entry: CacheEntry) {
        let key = entry.key.clone();
        if let Err(e) = self.cache.upsert(entry).await {
            warn!(error = %e, %key, "cache write failed");
        }
    }
}

fn validated_term(raw_query: &str) -> Result<String, NutritionError> {
    let term = normalize(raw_query);
    if term.is_empty() {
        return Err(NutritionError::Validation("Query parameter is required"));
    }
    if is_denylisted(&term) {
        debug!(%term, "denylisted term");
        return Err(NutritionError::NotFood);
    }
    Ok(term)
}

/// Catalog ids are barcodes; anything else would be spliced into the
/// upstream URL path.
fn validated_product_id(raw: &str) -> Result<&str, NutritionError> {
    let product_id = raw.trim();
    if product_id.is_empty() {
        return Err(NutritionError::Validation("Product id is required"));
    }
    if !product_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(NutritionError::Validation("Product id must be alphanumeric"));
    }
    Ok(product_id)
}

fn normalize_food(food: SourceFood) -> (Option<String>, NutritionRecord) {
    match food {
        SourceFood::Catalog(product) => {
            let record = map_to_nutrition_record(&product);
            (product.code.clone().filter(|c| !c.is_empty()), record)
        }
        SourceFood::Generated(record) => (None, record),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::cache::{CacheError, MemoryCacheStore};
    use crate::sources::{OffProduct, SourceError};

    /// Source that replays canned outcomes and counts calls.
    struct ScriptedSource {
        outcome: Box<dyn Fn(&str) -> SourceOutcome + Send + Sync>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(f: impl Fn(&str) -> SourceOutcome + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                outcome: Box::new(f),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FoodSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn lookup(&self, term: &str) -> Result<SourceOutcome, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.outcome)(term))
        }

        async fn product(&self, product_id: &str) -> Result<SourceOutcome, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((self.outcome)(product_id))
        }
    }

    /// Cache whose every call fails.
    struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn get_by_product_id(&self, _id: &str) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn upsert(&self, _entry: CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    fn catalog(product: serde_json::Value) -> SourceOutcome {
        let product: OffProduct = serde_json::from_value(product).unwrap();
        SourceOutcome::Found(SourceFood::Catalog(Box::new(product)))
    }

    fn banana() -> SourceOutcome {
        catalog(json!({
            "code": "0000000004011",
            "product_name": "Banana",
            "nutriments": {
                "proteins": 1.3,
                "fat": 0.4,
                "carbohydrates": 27,
                "fiber": 3.1,
                "sugars": 14.4
            }
        }))
    }

    fn service(
        cache: Arc<MemoryCacheStore>,
        source: Arc<ScriptedSource>,
    ) -> NutritionService {
        NutritionService::new(cache, source)
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize("  Greek Yogurt \n"), "greek yogurt");
    }

    #[tokio::test]
    async fn denylisted_terms_never_reach_the_source() {
        let cache = Arc::new(MemoryCacheStore::new());
        let source = ScriptedSource::new(|_| banana());
        let svc = service(cache.clone(), source.clone());

        for word in NON_FOOD_WORDS {
            let err = svc.resolve(&format!(" {} ", word.to_uppercase())).await.unwrap_err();
            assert!(matches!(err, NutritionError::NotFood), "{word}");
        }
        assert_eq!(source.calls(), 0);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn blank_query_is_a_validation_error() {
        let source = ScriptedSource::new(|_| banana());
        let svc = service(Arc::new(MemoryCacheStore::new()), source.clone());

        let err = svc.resolve("   ").await.unwrap_err();
        assert!(matches!(err, NutritionError::Validation(_)));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let cache = Arc::new(MemoryCacheStore::new());
        let source = ScriptedSource::new(|_| {
            catalog(json!({"code": "1", "product_name": "Apple", "nutriments": {"energy": 52}}))
        });
        let svc = service(cache.clone(), source.clone());

        let first = svc.resolve("apple").await.unwrap();
        let second = svc.resolve("  APPLE").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.calories, 52.0);
        assert_eq!(source.calls(), 1);
        let entry = cache.get("apple").await.unwrap().unwrap();
        assert_eq!(entry.is_food, Some(true));
        assert_eq!(entry.product_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn banana_is_mapped_and_cached() {
        let cache = Arc::new(MemoryCacheStore::new());
        let svc = service(cache.clone(), ScriptedSource::new(|_| banana()));

        let record = svc.resolve("banana").await.unwrap();
        assert!(record.diet_labels.contains("LOW_FAT"));
        assert!(!record.diet_labels.contains("LOW_SODIUM"));
        assert!(!record.diet_labels.contains("HIGH_FIBER"));
        assert_eq!(record.nutrients["PROCNT"].quantity, 1.3);
        assert_eq!(
            cache.get("banana").await.unwrap().unwrap().nutrition_data,
            Some(record)
        );
    }

    #[tokio::test]
    async fn not_food_judgment_is_cached() {
        let cache = Arc::new(MemoryCacheStore::new());
        let source = ScriptedSource::new(|_| SourceOutcome::NotFood);
        let svc = service(cache.clone(), source.clone());

        assert!(matches!(svc.resolve("Stapler").await, Err(NutritionError::NotFood)));
        assert!(matches!(svc.resolve("stapler").await, Err(NutritionError::NotFood)));
        assert_eq!(source.calls(), 1);

        let entry = cache.get("stapler").await.unwrap().unwrap();
        assert_eq!(entry.is_food, Some(false));
        assert_eq!(entry.nutrition_data, None);
    }

    #[tokio::test]
    async fn not_found_is_not_cached() {
        let cache = Arc::new(MemoryCacheStore::new());
        let source = ScriptedSource::new(|_| SourceOutcome::NotFound);
        let svc = service(cache.clone(), source.clone());

        for _ in 0..2 {
            let err = svc.resolve("xyzzynotarealfood123").await.unwrap_err();
            assert!(matches!(err, NutritionError::NotFound));
        }
        assert_eq!(source.calls(), 2);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn legacy_entry_without_flag_is_a_hit() {
        let cache = Arc::new(MemoryCacheStore::new());
        let mut entry = CacheEntry::food("rice".into(), None, NutritionRecord::default());
        entry.is_food = None;
        cache.upsert(entry).await.unwrap();
        let source = ScriptedSource::new(|_| banana());
        let svc = service(cache, source.clone());

        svc.resolve("rice").await.unwrap();
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn entry_without_data_falls_through_to_source() {
        let cache = Arc::new(MemoryCacheStore::new());
        let mut entry = CacheEntry::not_food("banana".into());
        entry.is_food = None;
        cache.upsert(entry).await.unwrap();
        let source = ScriptedSource::new(|_| banana());
        let svc = service(cache, source.clone());

        svc.resolve("banana").await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn broken_cache_degrades_to_source() {
        let source = ScriptedSource::new(|_| banana());
        let svc = NutritionService::new(Arc::new(BrokenCache), source.clone());

        let record = svc.resolve("banana").await.unwrap();
        assert_eq!(record.product_name.as_deref(), Some("Banana"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn product_lookup_shares_keyspace_with_name_lookup() {
        let cache = Arc::new(MemoryCacheStore::new());
        let source = ScriptedSource::new(|_| banana());
        let svc = service(cache.clone(), source.clone());

        svc.resolve("banana").await.unwrap();
        let by_id = svc.resolve_product("0000000004011").await.unwrap();
        assert_eq!(by_id.product_name.as_deref(), Some("Banana"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn product_lookup_stores_under_product_name() {
        let cache = Arc::new(MemoryCacheStore::new());
        let source = ScriptedSource::new(|_| {
            catalog(json!({"product_name": "Nutella", "nutriments": {"fat": 30.9}}))
        });
        let svc = service(cache.clone(), source.clone());

        svc.resolve_product(" 3017620422003 ").await.unwrap();
        let entry = cache.get("nutella").await.unwrap().expect("stored by name");
        assert_eq!(entry.product_id.as_deref(), Some("3017620422003"));

        // the name lookup now hits the same row
        svc.resolve("Nutella").await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn product_id_with_path_characters_is_rejected() {
        let cache = Arc::new(MemoryCacheStore::new());
        let source = ScriptedSource::new(|_| banana());
        let svc = service(cache.clone(), source.clone());

        for id in ["../x", "123/../../cgi/search.pl", "123?x=", "12 34", "123.json", "%2F"] {
            let err = svc.resolve_product(id).await.unwrap_err();
            assert!(matches!(err, NutritionError::Validation(_)), "{id}");
        }
        assert_eq!(source.calls(), 0);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let svc = service(
            Arc::new(MemoryCacheStore::new()),
            ScriptedSource::new(|_| SourceOutcome::NotFound),
        );
        assert!(matches!(
            svc.resolve_product("999").await,
            Err(NutritionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn search_is_unsupported_without_catalog() {
        let svc = service(
            Arc::new(MemoryCacheStore::new()),
            ScriptedSource::new(|_| banana()),
        );
        assert!(matches!(
            svc.search("banana").await,
            Err(NutritionError::Unsupported(_))
        ));
        assert!(matches!(svc.search("car").await, Err(NutritionError::NotFood)));
    }
}
