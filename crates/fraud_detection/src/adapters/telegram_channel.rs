// Rust guideline compliant 2026-10-19

//! Telegram Bot API adapter for the `NotificationChannel` port.
//!
//! Posts the rich (HTML) body to `sendMessage`. Any non-2xx answer is a
//! rejection; connection and timeout problems are transport errors. The
//! dispatcher enforces its own per-channel timeout on top of this.

use std::fmt;

use domain::{ChannelError, NotificationChannel, RenderedMessage};
use reqwest::Client;

const API_BASE: &str = "https://api.telegram.org";

/// Sends notices to one Telegram chat.
pub struct TelegramChannel {
    client: Client,
    // Contains the bot token; kept out of `Debug`.
    endpoint: String,
    chat_id: String,
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramChannel {
    /// Create a channel for bot `token` posting into `chat_id`.
    #[must_use]
    pub fn new(token: &str, chat_id: impl Into<String>) -> Self {
        Self::with_base(API_BASE, token, chat_id)
    }

    fn with_base(base: &str, token: &str, chat_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{base}/bot{token}/sendMessage"),
            chat_id: chat_id.into(),
        }
    }
}

impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), ChannelError> {
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": message.rich,
            "parse_mode": "HTML",
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Transport { reason: e.without_url().to_string() })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(transaction_id = %message.transaction_id, "telegram_channel.sent");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ChannelError::Rejected { reason: format!("{status}: {body}") })
    }
}
