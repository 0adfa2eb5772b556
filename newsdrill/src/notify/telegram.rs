use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use super::{InlineKeyboard, NotificationChannel};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API channel posting to a single chat
pub struct TelegramChannel {
    api_base: String,
    token: String,
    chat_id: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboard>,
}

#[derive(Debug, Serialize)]
struct AnswerCallback<'a> {
    callback_query_id: &'a str,
    text: &'a str,
    show_alert: bool,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramChannel {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>, chat_id: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            api_base: api_base.into(),
            token: token.into(),
            chat_id: chat_id.into(),
            client,
        })
    }

    /// Build from config, reading the bot token (and chat id unless given literally) from the environment.
    pub fn from_config(cfg: &common::TelegramConfig) -> Result<Self> {
        let token_env = cfg.token_env.as_deref().unwrap_or("TELEGRAM_TOKEN");
        let token = std::env::var(token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .with_context(|| format!("{} is not set", token_env))?;

        let chat_env = cfg.chat_id_env.as_deref().unwrap_or("TELEGRAM_CHAT_ID");
        let chat_id = std::env::var(chat_env)
            .ok()
            .filter(|c| !c.is_empty())
            .or_else(|| cfg.chat_id.clone())
            .with_context(|| format!("{} is not set and no chat_id configured", chat_env))?;

        Self::new(
            cfg.api_base.as_deref().unwrap_or(DEFAULT_API_BASE),
            token,
            chat_id,
            Duration::from_secs(cfg.timeout_seconds.unwrap_or(30)),
        )
    }

    /// Bot token; also the secret path segment of the webhook
    pub fn token(&self) -> &str {
        &self.token
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base.trim_end_matches('/'), self.token, method)
    }

    async fn call<T: Serialize + ?Sized>(&self, method: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .with_context(|| format!("telegram {} request failed", method))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("telegram {} error {}: {}", method, status, text);
        }
        let reply: ApiReply = serde_json::from_str(&text)
            .with_context(|| format!("unexpected telegram {} reply: {}", method, text))?;
        if !reply.ok {
            anyhow::bail!(
                "telegram {} refused: {}",
                method,
                reply.description.unwrap_or_default()
            );
        }
        Ok(())
    }

    /// Point Telegram at `{public_url}/webhook/{token}`
    pub async fn set_webhook(&self, public_url: &str) -> Result<()> {
        let url = format!("{}/webhook/{}", public_url.trim_end_matches('/'), self.token);
        self.call("setWebhook", &serde_json::json!({ "url": url })).await?;
        info!("Webhook registered at {}/webhook/<token>", public_url.trim_end_matches('/'));
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<()> {
        self.call("deleteWebhook", &serde_json::json!({})).await?;
        info!("Webhook removed");
        Ok(())
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, text: &str, controls: Option<&InlineKeyboard>) -> bool {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
            reply_markup: controls,
        };
        match self.call("sendMessage", &body).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send telegram message: {:#}", e);
                false
            }
        }
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> bool {
        let body = AnswerCallback {
            callback_query_id: callback_id,
            text,
            show_alert: true,
        };
        match self.call("answerCallbackQuery", &body).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to answer callback query: {:#}", e);
                false
            }
        }
    }
}
