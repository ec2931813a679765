//! OpenAI-compatible chat-completions generator.

use std::env;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::extract::{extract_object, preview};
use super::mapping::{daily_from_object, weekly_from_object};
use super::prompt::{SYSTEM_PROMPT, user_message};
use super::{GeneratorError, PlanGenerator};
use crate::preferences::Preferences;
use crate::schedule::{DayMeals, WeeklySchedule};

/// Settings for [`OpenAiGenerator`].
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Bearer token. Without one every request fails as `unavailable`.
    pub api_key: Option<String>,
    /// Base URL up to and including the version segment, e.g.
    /// `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl GeneratorConfig {
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

    pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
    pub const BASE_URL_VAR: &str = "MEALPLAN_OPENAI_BASE_URL";
    pub const MODEL_VAR: &str = "MEALPLAN_OPENAI_MODEL";

    /// Override fields with any non-blank `OPENAI_API_KEY`,
    /// `MEALPLAN_OPENAI_BASE_URL` or `MEALPLAN_OPENAI_MODEL`; fields whose
    /// variable is unset keep their current value.
    pub fn with_env(mut self) -> Self {
        let var = |name: &str| {
            env::var(name)
                .ok()
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        if let Some(key) = var(Self::API_KEY_VAR) {
            self.api_key = Some(key);
        }
        if let Some(url) = var(Self::BASE_URL_VAR) {
            self.base_url = url;
        }
        if let Some(model) = var(Self::MODEL_VAR) {
            self.model = model;
        }
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Self::DEFAULT_BASE_URL.to_owned(),
            model: Self::DEFAULT_MODEL.to_owned(),
            temperature: 0.6,
            // Enough headroom that a seven-day plan is not cut off mid-JSON.
            max_tokens: 1200,
            connect_timeout: Duration::from_secs(8),
            request_timeout: Duration::from_secs(25),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    /// Usually a string; some compatible servers return the JSON object
    /// directly.
    #[serde(default)]
    content: Option<Value>,
}

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiGenerator {
    client: Client,
    config: GeneratorConfig,
}

impl OpenAiGenerator {
    pub fn new(config: GeneratorConfig) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Ask for `day_count` days and decode the reply into a JSON object.
    async fn request_days(
        &self,
        preferences: &Preferences,
        day_count: usize,
    ) -> Result<Map<String, Value>, GeneratorError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            tracing::error!("meal planner has no API key configured");
            GeneratorError::Unavailable("missing API key".to_string())
        })?;

        let country = preferences.country.as_deref().unwrap_or("Any");
        tracing::info!(
            days_requested = day_count,
            diet = %preferences.diet,
            goal = %preferences.goal,
            country,
            portion = %preferences.portion,
            allergen_count = preferences.allergens.len(),
            model = %self.config.model,
            "meal plan request start"
        );

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_message(preferences, day_count),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let started = Instant::now();
        let response = self
            .client
            .post(self.config.chat_completions_url())
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    ms = started.elapsed().as_millis() as u64,
                    days_requested = day_count,
                    error = %e,
                    "meal plan request failed"
                );
                GeneratorError::Upstream {
                    status: None,
                    message: e.to_string(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %preview(&text, 500),
                ms = started.elapsed().as_millis() as u64,
                days_requested = day_count,
                "meal plan request returned non-success status"
            );
            return Err(GeneratorError::Upstream {
                status: Some(status.as_u16()),
                message: format!("HTTP {status}"),
            });
        }

        let envelope: ChatResponse = response.json().await.map_err(|e| GeneratorError::Upstream {
            status: Some(status.as_u16()),
            message: format!("invalid response body: {e}"),
        })?;
        let ms = started.elapsed().as_millis() as u64;

        let content = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);

        let object = match content {
            Some(Value::Object(map)) => map,
            Some(Value::String(text)) => extract_object(&text).inspect_err(|e| {
                tracing::error!(
                    ms,
                    kind = %e.kind(),
                    content_preview = %preview(text.trim(), 400),
                    "meal plan content could not be decoded"
                );
            })?,
            _ => {
                tracing::error!(ms, "meal plan response had empty content");
                return Err(GeneratorError::EmptyContent);
            }
        };

        tracing::info!(
            ms,
            days_received = object.get("days").and_then(serde_json::Value::as_array).map_or(0, Vec::len),
            "meal plan request succeeded"
        );

        Ok(object)
    }
}

#[async_trait]
impl PlanGenerator for OpenAiGenerator {
    async fn generate_weekly(
        &self,
        preferences: &Preferences,
        week_start: NaiveDate,
    ) -> Result<WeeklySchedule, GeneratorError> {
        let object = self.request_days(preferences, 7).await?;
        weekly_from_object(&object, week_start)
    }

    async fn generate_daily(
        &self,
        preferences: &Preferences,
        date: NaiveDate,
    ) -> Result<DayMeals, GeneratorError> {
        let object = self.request_days(preferences, 1).await?;
        daily_from_object(&object, date)
    }
}
