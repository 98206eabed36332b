use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{FoodSource, SourceError, SourceFood, SourceOutcome};
use crate::config::GenerativeConfig;
use crate::nutrition::dto::NutritionRecord;

const SOURCE_NAME: &str = "generative model";
const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Asks an OpenAI-compatible chat model to judge the term and synthesize
/// nutrition facts for it.
pub struct GenerativeSource {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GenerativeSource {
    pub fn new(config: &GenerativeConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn complete(&self, prompt: String) -> Result<String, SourceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".into(),
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let res = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| SourceError::Transport {
                source_name: SOURCE_NAME,
                error,
            })?;

        let status = res.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                source_name: SOURCE_NAME,
                status,
            });
        }

        let parsed: ChatResponse = res.json().await.map_err(|e| SourceError::Decode {
            source_name: SOURCE_NAME,
            message: e.to_string(),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SourceError::Decode {
                source_name: SOURCE_NAME,
                message: "completion had no content".into(),
            })
    }
}

#[async_trait]
impl FoodSource for GenerativeSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    #[instrument(skip(self))]
    async fn lookup(&self, term: &str) -> Result<SourceOutcome, SourceError> {
        let text = self.complete(nutrition_prompt(term)).await?;
        let outcome = parse_reply(&text)?;
        debug!(term, not_food = matches!(outcome, SourceOutcome::NotFood), "completion parsed");
        Ok(outcome)
    }
}

fn nutrition_prompt(term: &str) -> String {
    format!(
        r#"
First, determine if "{term}" is a food item that would have nutritional information.
If it is NOT a food item, respond with ONLY this exact JSON: {{"isFood": false}}

If it IS a food item, generate accurate nutrition information in this JSON format:
{{
  "isFood": true,
  "calories": number,
  "totalWeight": number,
  "dietLabels": ["LABEL1", "LABEL2"],
  "healthLabels": ["LABEL1", "LABEL2"],
  "nutrients": {{
    "NUTRIENT_CODE": {{
      "label": "Nutrient Name",
      "quantity": number,
      "unit": "g/mg/µg"
    }}
  }}
}}

Include these nutrients at minimum:
- ENERC_KCAL (Energy)
- PROCNT (Protein)
- FAT (Fat)
- CHOCDF (Carbs)
- FIBTG (Fiber)
- CA (Calcium)
- FE (Iron)
- VITC (Vitamin C)

Return ONLY valid JSON with no explanations or additional text.
"#
    )
}

/// Interprets the model's reply. Anything other than `"isFood": true` is a
/// not-food judgment.
fn parse_reply(text: &str) -> Result<SourceOutcome, SourceError> {
    let value: Value = serde_json::from_str(strip_code_fence(text)).map_err(|e| {
        warn!(error = %e, "completion is not valid JSON");
        SourceError::Decode {
            source_name: SOURCE_NAME,
            message: e.to_string(),
        }
    })?;

    if value.get("isFood") != Some(&Value::Bool(true)) {
        return Ok(SourceOutcome::NotFood);
    }

    let record: NutritionRecord =
        serde_json::from_value(value).map_err(|e| SourceError::Decode {
            source_name: SOURCE_NAME,
            message: e.to_string(),
        })?;
    Ok(SourceOutcome::Found(SourceFood::Generated(record)))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
