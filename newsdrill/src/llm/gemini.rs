use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::{with_retry, AttemptError, RetryPolicy};
use super::{AiProvider, LlmRequest, ProviderError};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Google Gemini `generateContent` backend; the only one accepting images.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    default_timeout: Duration,
    default_temperature: f32,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_timeout: Duration::from_secs(60),
            default_temperature: 0.5,
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &common::ProviderConfig, api_key: String) -> Self {
        let mut provider = Self::new(
            cfg.api_url.clone().unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key,
            cfg.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        );
        if let Some(secs) = cfg.timeout_seconds {
            provider.default_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = cfg.max_retries {
            provider.retry.max_attempts = max;
        }
        provider
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn attempt(&self, url: &str, body: &GenerateRequest) -> Result<String, AttemptError> {
        tokio::time::timeout(self.default_timeout, self.request(url, body))
            .await
            .map_err(|_| ProviderError::Timeout)?
    }

    async fn request(&self, url: &str, body: &GenerateRequest) -> Result<String, AttemptError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || body.contains("RESOURCE_EXHAUSTED") {
                return Err(AttemptError::RateLimited(format!("{}: {}", status, body)));
            }
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let resp_body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let text: String = resp_body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::Decode("response has no text candidate".to_string()).into());
        }
        Ok(text)
    }
}

#[async_trait::async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: LlmRequest) -> Result<String, ProviderError> {
        let prompt = match request.system {
            Some(system) => format!("{}\n\n{}", system, request.prompt),
            None => request.prompt,
        };

        let mut parts = vec![Part {
            text: Some(prompt),
            inline_data: None,
        }];
        if let Some(image) = request.image {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type,
                    data: BASE64.encode(&image.bytes),
                }),
            });
        }

        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: self.default_temperature,
            },
        };

        let url = self.endpoint();
        with_retry(&self.retry, "gemini", || self.attempt(&url, &body)).await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}
