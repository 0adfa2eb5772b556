use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod cards;
pub mod telegram;

pub use cards::Card;
pub use telegram::TelegramChannel;

/// Callback payload of the "new words" button
pub const VOCAB_REFRESH: &str = "vocab_refresh";

/// One inline button: either opens a URL or sends callback data back to the bot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineButton {
    pub fn link(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
        }
    }

    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
        }
    }
}

/// Rows of inline buttons attached to a message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}

/// Where rendered cards are delivered.
///
/// Sends report plain success; failures are logged by the implementation and the caller
/// decides whether to retry later.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, text: &str, controls: Option<&InlineKeyboard>) -> bool;

    /// Acknowledge a button press
    async fn answer_callback(&self, callback_id: &str, text: &str) -> bool;

    async fn send_card(&self, card: &Card) -> bool {
        self.send(&card.text, card.controls.as_ref()).await
    }
}
