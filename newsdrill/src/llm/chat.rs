use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::retry::{with_retry, AttemptError, RetryPolicy};
use super::{AiProvider, LlmRequest, ProviderError};

/// Endpoint and model used when the config section leaves them out
#[derive(Debug, Clone, Copy)]
pub struct ChatDefaults {
    pub api_url: &'static str,
    pub model: &'static str,
}

pub const XAI_DEFAULTS: ChatDefaults = ChatDefaults {
    api_url: "https://api.x.ai/v1/chat/completions",
    model: "grok-beta",
};

pub const GROQ_DEFAULTS: ChatDefaults = ChatDefaults {
    api_url: "https://api.groq.com/openai/v1/chat/completions",
    model: "llama-3.3-70b-versatile",
};

/// Provider speaking the OpenAI-compatible chat completions API (xAI, Groq)
pub struct ChatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    default_timeout: Duration,
    default_temperature: f32,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl ChatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_timeout: Duration::from_secs(60),
            default_temperature: 0.5,
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(
        name: &str,
        cfg: &common::ProviderConfig,
        api_key: String,
        defaults: ChatDefaults,
    ) -> Self {
        let mut provider = Self::new(
            name,
            cfg.api_url.clone().unwrap_or_else(|| defaults.api_url.to_string()),
            api_key,
            cfg.model.clone().unwrap_or_else(|| defaults.model.to_string()),
        );
        if let Some(secs) = cfg.timeout_seconds {
            provider.default_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = cfg.max_retries {
            provider.retry.max_attempts = max;
        }
        provider
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// One request, bounded as a whole (headers and body) by the timeout
    async fn attempt(&self, body: &ChatRequest) -> Result<String, AttemptError> {
        tokio::time::timeout(self.default_timeout, self.request(body))
            .await
            .map_err(|_| ProviderError::Timeout)?
    }

    async fn request(&self, body: &ChatRequest) -> Result<String, AttemptError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || body.contains("rate_limit") {
                return Err(AttemptError::RateLimited(format!("{}: {}", status, body)));
            }
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let resp_body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        resp_body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Decode("response has no choices".to_string()).into())
    }
}

#[async_trait::async_trait]
impl AiProvider for ChatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: LlmRequest) -> Result<String, ProviderError> {
        if request.image.is_some() {
            return Err(ProviderError::Unsupported("image input"));
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(Message {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(Message {
            role: "user".to_string(),
            content: request.prompt,
        });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.default_temperature),
        };

        with_retry(&self.retry, &self.name, || self.attempt(&body)).await
    }
}

// OpenAI API request/response structures
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}
