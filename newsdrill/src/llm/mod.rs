use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::ingestion::FeedCandidate;

pub mod chat;
pub mod extract;
pub mod gemini;
pub mod prompts;
pub mod retry;

pub use extract::extract_json;
pub use retry::RetryPolicy;

/// Failure of a single provider call, after retries.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Every attempt was rejected with a rate-limit signal
    #[error("rate limited, gave up after {attempts} attempts")]
    RateLimited { attempts: u32 },
    #[error("provider is not configured")]
    Unconfigured,
    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),
    #[error("request timed out")]
    Timeout,
    #[error("API error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Transient exhaustion, as opposed to a hard failure
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Image handed to a vision-capable backend
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Request structure for one structured-output generation
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub image: Option<ImageInput>,
}

/// A curated article as returned by a provider, before normalization
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CuratedArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "text_or_lines")]
    pub summary: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub category: String,
}

/// A vocabulary entry as returned by a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VocabDraft {
    #[serde(default, alias = "word")]
    pub target_word: String,
    #[serde(default, deserialize_with = "text_or_lines")]
    pub meaning: String,
    #[serde(default, alias = "sentence", deserialize_with = "text_or_lines")]
    pub original_sentence: String,
    #[serde(default, alias = "grammar", deserialize_with = "text_or_lines")]
    pub grammar_point: String,
    #[serde(default, deserialize_with = "text_or_lines")]
    pub examples: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentenceEvaluation {
    #[serde(default, alias = "correct")]
    pub is_correct: bool,
    #[serde(default)]
    pub feedback: String,
}

impl SentenceEvaluation {
    pub fn rejected(feedback: impl Into<String>) -> Self {
        Self {
            is_correct: false,
            feedback: feedback.into(),
        }
    }
}

/// Models drift between a string and a list of lines for free-text fields.
fn text_or_lines<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(parts) => parts
            .into_iter()
            .map(|p| match p {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    })
}

/// Turn an extracted value into a list: arrays pass through, an object carrying one of
/// `wrapper_keys` as an array is unwrapped, any other object becomes a single item.
pub fn unwrap_items(value: Value, wrapper_keys: &[&str]) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in wrapper_keys {
                if let Some(Value::Array(_)) = map.get(*key) {
                    if let Some(Value::Array(items)) = map.remove(*key) {
                        return items;
                    }
                }
            }
            if map.is_empty() {
                Vec::new()
            } else {
                vec![Value::Object(map)]
            }
        }
        _ => Vec::new(),
    }
}

fn decode_items<T: serde::de::DeserializeOwned>(items: Vec<Value>, what: &str) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("skipping malformed {} item: {}", what, e);
                None
            }
        })
        .collect()
}

/// One AI backend. Implementors provide `generate` (one structured-output call, with
/// rate-limit retry); the task methods are built on top of it.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short backend name for logs ("xai", "groq", "gemini")
    fn name(&self) -> &str;

    /// Run one request and return the raw model text
    async fn generate(&self, request: LlmRequest) -> Result<String, ProviderError>;

    /// Curate and summarize feed entries of one category
    async fn curate(
        &self,
        entries: &[FeedCandidate],
        category: &str,
    ) -> Result<Vec<CuratedArticle>, ProviderError> {
        let request = prompts::curation_request(entries, category);
        let raw = self.generate(request).await?;
        let items = unwrap_items(extract_json(&raw), &["articles", "items"]);
        Ok(decode_items(items, "curation"))
    }

    /// Build vocabulary entries for the words or text given by the user
    async fn generate_vocab(&self, text: &str) -> Result<Vec<VocabDraft>, ProviderError> {
        let raw = self.generate(prompts::vocab_from_text_request(text)).await?;
        let items = unwrap_items(extract_json(&raw), &["words", "items"]);
        Ok(decode_items(items, "vocab"))
    }

    /// Judge whether `sentence` uses `word` correctly
    async fn evaluate_sentence(
        &self,
        word: &str,
        sentence: &str,
    ) -> Result<SentenceEvaluation, ProviderError> {
        let raw = self
            .generate(prompts::evaluate_sentence_request(word, sentence))
            .await?;
        let evaluation = match extract_json(&raw) {
            Value::Array(items) => items
                .into_iter()
                .next()
                .and_then(|first| serde_json::from_value(first).ok()),
            other => serde_json::from_value(other).ok(),
        };
        Ok(evaluation.unwrap_or_else(|| SentenceEvaluation::rejected("Invalid response")))
    }

    /// Pull study words out of a photographed page
    async fn extract_vocab_from_image(
        &self,
        image: &ImageInput,
    ) -> Result<Vec<VocabDraft>, ProviderError> {
        let raw = self
            .generate(prompts::vocab_from_image_request(image.clone()))
            .await?;
        let items = unwrap_items(extract_json(&raw), &["words", "items"]);
        Ok(decode_items(items, "vocab"))
    }
}

/// Configured providers in fallback order. The first provider that yields an accepted
/// result wins; unconfigured or failing providers are skipped.
#[derive(Clone, Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn AiProvider>>,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn AiProvider>>) -> Self {
        Self { providers }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Try each provider in order and return the first result for which `accept` holds.
    pub async fn first_accepted<T, F, Fut, A>(&self, task: &str, mut call: F, accept: A) -> Option<T>
    where
        F: FnMut(Arc<dyn AiProvider>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
        A: Fn(&T) -> bool,
    {
        for provider in &self.providers {
            match call(provider.clone()).await {
                Ok(result) if accept(&result) => {
                    info!(provider = provider.name(), "{} succeeded", task);
                    return Some(result);
                }
                Ok(_) => warn!(provider = provider.name(), "{} returned no usable output", task),
                Err(e) if e.is_rate_limited() => {
                    warn!(provider = provider.name(), "{} rate limited: {}", task, e)
                }
                Err(e) => warn!(provider = provider.name(), "{} failed: {}", task, e),
            }
        }
        if self.providers.is_empty() {
            warn!("{}: no AI provider configured", task);
        } else {
            error!("{}: all providers failed", task);
        }
        None
    }
}

/// Build the provider chain from configuration, reading credentials from the environment.
pub fn build_providers(cfg: &common::ProvidersConfig) -> ProviderChain {
    build_providers_with(cfg, |name| std::env::var(name).ok())
}

/// Same as [`build_providers`] with an explicit credential lookup.
/// Order is fixed: xai, groq, gemini. Providers without a credential are skipped.
pub fn build_providers_with<L>(cfg: &common::ProvidersConfig, lookup: L) -> ProviderChain
where
    L: Fn(&str) -> Option<String>,
{
    let mut providers: Vec<Arc<dyn AiProvider>> = Vec::new();

    let xai = cfg.xai.clone().unwrap_or_default();
    match resolve_key(&xai, "XAI_API_KEY", &lookup) {
        Some(key) => providers.push(Arc::new(chat::ChatProvider::from_config(
            "xai",
            &xai,
            key,
            chat::XAI_DEFAULTS,
        ))),
        None => info!("xai provider skipped: no credential"),
    }

    let groq = cfg.groq.clone().unwrap_or_default();
    match resolve_key(&groq, "GROQ_API_KEY", &lookup) {
        Some(key) => providers.push(Arc::new(chat::ChatProvider::from_config(
            "groq",
            &groq,
            key,
            chat::GROQ_DEFAULTS,
        ))),
        None => info!("groq provider skipped: no credential"),
    }

    let gemini_cfg = cfg.gemini.clone().unwrap_or_default();
    match resolve_key(&gemini_cfg, "GOOGLE_API_KEY", &lookup) {
        Some(key) => providers.push(Arc::new(gemini::GeminiProvider::from_config(&gemini_cfg, key))),
        None => info!("gemini provider skipped: no credential"),
    }

    ProviderChain::new(providers)
}

fn resolve_key<L>(cfg: &common::ProviderConfig, default_env: &str, lookup: &L) -> Option<String>
where
    L: Fn(&str) -> Option<String>,
{
    let env = cfg.api_key_env.as_deref().unwrap_or(default_env);
    lookup(env).filter(|k| !k.trim().is_empty())
}
