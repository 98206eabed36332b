use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{FoodSource, SourceError, SourceFood, SourceOutcome};
use crate::config::CatalogConfig;
use crate::nutrition::{de, dto::ProductSummary};

const SOURCE_NAME: &str = "open food facts";
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Product as returned by the Open Food Facts API. Only the fields the
/// mapper reads are kept; everything is optional upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OffProduct {
    /// Barcode; some records carry it as a JSON number.
    #[serde(default, deserialize_with = "de::text")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub product_name: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub generic_name: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub brands: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub image_small_url: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub categories: Option<String>,
    #[serde(default, deserialize_with = "de::text")]
    pub nutriscore_grade: Option<String>,
    /// Declared package size, usually text like "500 g".
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default, deserialize_with = "de::tags")]
    pub categories_tags: Vec<String>,
    #[serde(default, deserialize_with = "de::tags")]
    pub labels_tags: Vec<String>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub nutriments: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, deserialize_with = "de::null_as_default")]
    products: Vec<OffProduct>,
}

#[derive(Debug, Deserialize)]
struct ProductResponse {
    #[serde(default, deserialize_with = "de::null_as_default")]
    status: i64,
    #[serde(default)]
    product: Option<OffProduct>,
}

pub struct OpenFoodFactsSource {
    http: Client,
    base_url: String,
    page_size: u32,
}

impl OpenFoodFactsSource {
    pub fn new(config: &CatalogConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size,
        })
    }

    async fn search_products(&self, term: &str) -> Result<Vec<OffProduct>, SourceError> {
        let page_size = self.page_size.to_string();
        let res = self
            .http
            .get(format!("{}/cgi/search.pl", self.base_url))
            .query(&[
                ("search_terms", term),
                ("search_simple", "1"),
                ("action", "process"),
                ("json", "1"),
                ("page_size", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(transport)?;

        let body: SearchResponse = decode(res).await?;
        debug!(term, count = body.products.len(), "catalog search finished");
        Ok(body.products)
    }
}

#[async_trait]
impl FoodSource for OpenFoodFactsSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    #[instrument(skip(self))]
    async fn lookup(&self, term: &str) -> Result<SourceOutcome, SourceError> {
        let products = self.search_products(term).await?;
        // The catalog orders by relevance; the first hit is the match.
        Ok(match products.into_iter().next() {
            Some(product) => SourceOutcome::Found(SourceFood::Catalog(Box::new(product))),
            None => SourceOutcome::NotFound,
        })
    }

    #[instrument(skip(self))]
    async fn product(&self, product_id: &str) -> Result<SourceOutcome, SourceError> {
        let res = self
            .http
            .get(format!("{}/api/v2/product/{}.json", self.base_url, product_id))
            .send()
            .await
            .map_err(transport)?;

        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(SourceOutcome::NotFound);
        }

        let body: ProductResponse = decode(res).await?;
        Ok(match body.product {
            Some(mut product) if body.status == 1 => {
                if product.code.is_none() {
                    product.code = Some(product_id.to_string());
                }
                SourceOutcome::Found(SourceFood::Catalog(Box::new(product)))
            }
            _ => SourceOutcome::NotFound,
        })
    }

    #[instrument(skip(self))]
    async fn search(&self, term: &str) -> Result<Vec<ProductSummary>, SourceError> {
        let products = self.search_products(term).await?;
        Ok(products.iter().map(summarize).collect())
    }
}

fn summarize(p: &OffProduct) -> ProductSummary {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    ProductSummary {
        id: text(&p.code),
        name: p
            .product_name
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| p.generic_name.clone())
            .unwrap_or_default(),
        brand: text(&p.brands),
        image: p
            .image_small_url
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| p.image_url.clone())
            .unwrap_or_default(),
        quantity: match &p.quantity {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        },
        categories: text(&p.categories),
        nutri_score: text(&p.nutriscore_grade),
    }
}

fn transport(error: reqwest::Error) -> SourceError {
    SourceError::Transport {
        source_name: SOURCE_NAME,
        error,
    }
}

async fn decode<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> Result<T, SourceError> {
    let status = res.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            source_name: SOURCE_NAME,
            status,
        });
    }
    let bytes = res.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode {
        source_name: SOURCE_NAME,
        message: e.to_string(),
    })
}
