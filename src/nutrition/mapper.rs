use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::de;
use super::dto::{Nutrient, NutritionRecord, DEFAULT_TOTAL_WEIGHT};
use crate::sources::OffProduct;

struct NutrientDef {
    key: &'static str,
    code: &'static str,
    label: &'static str,
    default_unit: &'static str,
}

const fn nutrient(
    key: &'static str,
    code: &'static str,
    label: &'static str,
    default_unit: &'static str,
) -> NutrientDef {
    NutrientDef {
        key,
        code,
        label,
        default_unit,
    }
}

const NUTRIENTS: [NutrientDef; 14] = [
    nutrient("energy", "ENERC_KCAL", "Energy", "kcal"),
    nutrient("proteins", "PROCNT", "Protein", "g"),
    nutrient("fat", "FAT", "Fat", "g"),
    nutrient("carbohydrates", "CHOCDF", "Carbs", "g"),
    nutrient("fiber", "FIBTG", "Fiber", "g"),
    nutrient("calcium", "CA", "Calcium", "mg"),
    nutrient("iron", "FE", "Iron", "mg"),
    nutrient("vitamin-c", "VITC", "Vitamin C", "mg"),
    nutrient("sugars", "SUGAR", "Sugars", "g"),
    nutrient("sodium", "NA", "Sodium", "mg"),
    nutrient("salt", "SALT", "Salt", "mg"),
    nutrient("potassium", "K", "Potassium", "mg"),
    nutrient("magnesium", "MG", "Magnesium", "mg"),
    nutrient("saturated-fat", "FASAT", "Saturated Fat", "g"),
];

const ENERGY_CODE: &str = "ENERC_KCAL";

enum Threshold {
    Below(f64),
    Above(f64),
}

// Comparisons are strict: a value sitting on the boundary earns no label.
const DIET_RULES: [(&str, Threshold, &str); 6] = [
    ("fat", Threshold::Below(3.0), "LOW_FAT"),
    ("sugars", Threshold::Below(5.0), "LOW_SUGAR"),
    ("salt", Threshold::Below(0.3), "LOW_SODIUM"),
    ("proteins", Threshold::Above(20.0), "HIGH_PROTEIN"),
    ("carbohydrates", Threshold::Below(5.0), "LOW_CARB"),
    ("fiber", Threshold::Above(6.0), "HIGH_FIBER"),
];

enum TagScope {
    CategoriesOrLabels,
    LabelsOnly,
}

const HEALTH_RULES: [(&str, TagScope, &str); 5] = [
    ("vegan", TagScope::CategoriesOrLabels, "VEGAN"),
    ("vegetarian", TagScope::CategoriesOrLabels, "VEGETARIAN"),
    ("gluten-free", TagScope::LabelsOnly, "GLUTEN_FREE"),
    ("dairy-free", TagScope::LabelsOnly, "DAIRY_FREE"),
    ("organic", TagScope::LabelsOnly, "ORGANIC"),
];

lazy_static! {
    static ref LEADING_AMOUNT: Regex =
        Regex::new(r"^\s*([+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?)\s*([A-Za-z]+)?").unwrap();
}

/// Converts a catalog product into a `NutritionRecord`. Never fails: every
/// missing field falls back to a default.
pub fn map_to_nutrition_record(product: &OffProduct) -> NutritionRecord {
    let nutriments = &product.nutriments;
    let mut record = NutritionRecord::default();

    for entry in &NUTRIENTS {
        let Some(quantity) = numeric_field(nutriments, entry.key) else {
            continue;
        };
        let unit = nutriments
            .get(&format!("{}_unit", entry.key))
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(entry.default_unit);
        record.nutrients.insert(
            entry.code.to_string(),
            Nutrient {
                label: entry.label.to_string(),
                quantity,
                unit: unit.to_string(),
            },
        );
    }

    if !record.nutrients.contains_key(ENERGY_CODE) {
        let kcal = numeric_field(nutriments, "energy-kcal")
            .or_else(|| numeric_field(nutriments, "energy_kcal"));
        if let Some(quantity) = kcal {
            record.nutrients.insert(
                ENERGY_CODE.to_string(),
                Nutrient {
                    label: "Energy".into(),
                    quantity,
                    unit: "kcal".into(),
                },
            );
        }
    }

    record.calories = record
        .nutrients
        .get(ENERGY_CODE)
        .map_or(0.0, |n| n.quantity);
    record.total_weight = product
        .quantity
        .as_ref()
        .and_then(parse_quantity)
        .unwrap_or(DEFAULT_TOTAL_WEIGHT);
    record.diet_labels = diet_labels(nutriments);
    record.health_labels = health_labels(&product.categories_tags, &product.labels_tags);

    record.product_name =
        non_empty(&product.product_name).or_else(|| non_empty(&product.generic_name));
    record.brand = non_empty(&product.brands);
    record.image = non_empty(&product.image_url).or_else(|| non_empty(&product.image_small_url));
    record.category = non_empty(&product.categories);
    record.nutri_score = non_empty(&product.nutriscore_grade);

    record
}

fn diet_labels(nutriments: &Map<String, Value>) -> BTreeSet<String> {
    DIET_RULES
        .iter()
        .filter(|(key, threshold, _)| {
            numeric_field(nutriments, key).is_some_and(|v| match threshold {
                Threshold::Below(limit) => v < *limit,
                Threshold::Above(limit) => v > *limit,
            })
        })
        .map(|(_, _, label)| label.to_string())
        .collect()
}

fn any_contains(tags: &[String], needle: &str) -> bool {
    tags.iter().any(|t| t.contains(needle))
}

fn health_labels(categories: &[String], labels: &[String]) -> BTreeSet<String> {
    let categories: Vec<String> = categories.iter().map(|t| t.to_lowercase()).collect();
    let labels: Vec<String> = labels.iter().map(|t| t.to_lowercase()).collect();
    HEALTH_RULES
        .iter()
        .filter(|(needle, scope, _)| match scope {
            TagScope::CategoriesOrLabels => {
                any_contains(&categories, needle) || any_contains(&labels, needle)
            }
            TagScope::LabelsOnly => any_contains(&labels, needle),
        })
        .map(|(_, _, label)| label.to_string())
        .collect()
}

fn numeric_field(nutriments: &Map<String, Value>, key: &str) -> Option<f64> {
    nutriments.get(key).and_then(de::number)
}

/// Grams per declared unit. Volumes are taken at 1 g/ml; unknown or
/// missing units leave the number as is.
fn grams_per(unit: &str) -> f64 {
    match unit.to_ascii_lowercase().as_str() {
        "kg" => 1000.0,
        "mg" => 0.001,
        "l" => 1000.0,
        "dl" => 100.0,
        "cl" => 10.0,
        "oz" => 28.3495,
        "lb" | "lbs" => 453.592,
        _ => 1.0,
    }
}

/// Leading amount of a declared quantity in grams, so "500 g" yields 500
/// and "1.5 kg" yields 1500.
fn parse_quantity(quantity: &Value) -> Option<f64> {
    let value = match quantity {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => LEADING_AMOUNT.captures(s).and_then(|c| {
            let amount = c.get(1)?.as_str().parse::<f64>().ok()?;
            let scale = c.get(2).map_or(1.0, |u| grams_per(u.as_str()));
            Some(amount * scale)
        }),
        _ => None,
    }?;
    value.is_finite().then_some(value)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
