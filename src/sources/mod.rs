pub mod generative;
pub mod open_food_facts;

use async_trait::async_trait;
use thiserror::Error;

use crate::nutrition::dto::{NutritionRecord, ProductSummary};

pub use generative::GenerativeSource;
pub use open_food_facts::{OffProduct, OpenFoodFactsSource};

/// Raw data as handed back by a source, before normalization.
#[derive(Debug, Clone)]
pub enum SourceFood {
    /// A catalog product that still has to go through the nutrient mapper.
    Catalog(Box<OffProduct>),
    /// A payload the source already produced in normalized form.
    Generated(NutritionRecord),
}

#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Found(SourceFood),
    NotFound,
    /// The source judged the term not to be a food at all.
    NotFood,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {source_name} failed: {error}")]
    Transport {
        source_name: &'static str,
        #[source]
        error: reqwest::Error,
    },

    #[error("{source_name} responded with status {status}")]
    Status {
        source_name: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("{source_name} returned an unreadable body: {message}")]
    Decode {
        source_name: &'static str,
        message: String,
    },

    #[error("{source_name} does not support {operation}")]
    Unsupported {
        source_name: &'static str,
        operation: &'static str,
    },
}

/// External food data provider. One implementation is active per deployment.
#[async_trait]
pub trait FoodSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolve a normalized free-text term to its most relevant food.
    async fn lookup(&self, term: &str) -> Result<SourceOutcome, SourceError>;

    /// Resolve a food by its external product identifier.
    async fn product(&self, _product_id: &str) -> Result<SourceOutcome, SourceError> {
        Err(SourceError::Unsupported {
            source_name: self.name(),
            operation: "product lookup",
        })
    }

    /// List candidate products for a term.
    async fn search(&self, _term: &str) -> Result<Vec<ProductSummary>, SourceError> {
        Err(SourceError::Unsupported {
            source_name: self.name(),
            operation: "candidate search",
        })
    }
}
