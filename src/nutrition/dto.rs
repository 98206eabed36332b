use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::de;

/// Normalized nutrition facts for one food.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRecord {
    #[serde(default, deserialize_with = "de::number_or_zero")]
    pub calories: f64,
    #[serde(default = "default_total_weight", deserialize_with = "total_weight")]
    pub total_weight: f64,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub diet_labels: BTreeSet<String>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub health_labels: BTreeSet<String>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub nutrients: BTreeMap<String, Nutrient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutri_score: Option<String>,
}

/// Grams assumed when a product declares no usable quantity.
pub const DEFAULT_TOTAL_WEIGHT: f64 = 100.0;

fn default_total_weight() -> f64 {
    DEFAULT_TOTAL_WEIGHT
}

fn total_weight<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de::number(&Value::deserialize(deserializer)?).unwrap_or(DEFAULT_TOTAL_WEIGHT))
}

impl Default for NutritionRecord {
    fn default() -> Self {
        Self {
            calories: 0.0,
            total_weight: DEFAULT_TOTAL_WEIGHT,
            diet_labels: BTreeSet::new(),
            health_labels: BTreeSet::new(),
            nutrients: BTreeMap::new(),
            product_name: None,
            brand: None,
            image: None,
            category: None,
            nutri_score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrient {
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub label: String,
    #[serde(default, deserialize_with = "de::number_or_zero")]
    pub quantity: f64,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub unit: String,
}

/// One catalog candidate as shown in a search result list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSummary {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub image: String,
    pub quantity: String,
    pub categories: String,
    pub nutri_score: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    #[serde(alias = "food")]
    pub query: Option<String>,
}

/// JSON body returned for every failed lookup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_food: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_found: Option<bool>,
}
