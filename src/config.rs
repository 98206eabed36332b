use anyhow::{bail, Context};

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub page_size: u32,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct GenerativeConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

/// Which external source backs cache misses.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    Catalog(CatalogConfig),
    Generative(GenerativeConfig),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Without a database the cache lives in process memory.
    pub database_url: Option<String>,
    pub source: SourceConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = var("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let source = match var("NUTRITION_SOURCE").as_deref().unwrap_or("catalog") {
            "catalog" => SourceConfig::Catalog(CatalogConfig {
                base_url: var("OFF_BASE_URL")
                    .unwrap_or_else(|| "https://world.openfoodfacts.org".into()),
                page_size: var("OFF_PAGE_SIZE")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(5),
                user_agent: var("OFF_USER_AGENT").unwrap_or_else(|| {
                    format!("nutritrack/{} (nutrition lookup)", env!("CARGO_PKG_VERSION"))
                }),
            }),
            "generative" => SourceConfig::Generative(GenerativeConfig {
                base_url: var("LLM_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".into()),
                api_key: var("LLM_API_KEY").context("LLM_API_KEY is required for the generative source")?,
                model: var("LLM_MODEL").unwrap_or_else(|| "gpt-4o".into()),
                temperature: var("LLM_TEMPERATURE")
                    .and_then(|v| v.parse::<f32>().ok())
                    .unwrap_or(0.2),
            }),
            other => bail!("unknown NUTRITION_SOURCE {other:?}; expected catalog or generative"),
        };

        Ok(Self {
            database_url,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_catalog_and_memory_cache() {
        let config = load(&[]).unwrap();
        assert!(config.database_url.is_none());
        match config.source {
            SourceConfig::Catalog(c) => {
                assert_eq!(c.base_url, "https://world.openfoodfacts.org");
                assert_eq!(c.page_size, 5);
                assert!(c.user_agent.starts_with("nutritrack/"));
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn generative_needs_api_key() {
        let err = load(&[("NUTRITION_SOURCE", "generative")]).unwrap_err();
        assert!(err.to_string().contains("LLM_API_KEY"));

        let config = load(&[
            ("NUTRITION_SOURCE", "generative"),
            ("LLM_API_KEY", "sk-test"),
            ("LLM_TEMPERATURE", "0.5"),
            ("DATABASE_URL", "postgres://localhost/nutrition"),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/nutrition"));
        match config.source {
            SourceConfig::Generative(g) => {
                assert_eq!(g.model, "gpt-4o");
                assert_eq!(g.temperature, 0.5);
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn unknown_source_is_rejected() {
        assert!(load(&[("NUTRITION_SOURCE", "edamam")]).is_err());
    }
}
