//! Session summary delivery.
//!
//! [`TelegramNotifier`] posts the summary to a Telegram chat;
//! [`LogNotifier`] writes it to the log and is the default when no
//! Telegram credentials are configured.

use anyhow::{bail, Result};
use async_trait::async_trait;
use common::traits::IsNotifier;

pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        TelegramNotifier {
            http: reqwest::Client::new(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }
}

#[async_trait]
impl IsNotifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("telegram sendMessage returned {}: {}", status, detail);
        }
        log::info!("summary delivered to telegram chat {}", self.chat_id);
        Ok(())
    }
}

/// Fallback sink: the summary only reaches the log.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl IsNotifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<()> {
        log::info!("session summary:\n{}", text);
        Ok(())
    }
}
