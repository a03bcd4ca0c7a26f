//! Outbound chat delivery. The notifier sends to one fixed destination,
//! either plain text or a preformatted block such as a table.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    /// Column-aligned text that must render in a fixed-width font.
    Preformatted(String),
}

impl Message {
    pub fn as_str(&self) -> &str {
        match self {
            Message::Text(text) | Message::Preformatted(text) => text,
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;

    /// Sinks without a fixed-width mode deliver the block as plain text.
    async fn send_preformatted(&self, text: &str) -> Result<()> {
        self.send(text).await
    }

    async fn deliver(&self, message: &Message) -> Result<()> {
        match message {
            Message::Text(text) => self.send(text).await,
            Message::Preformatted(text) => self.send_preformatted(text).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: DEFAULT_TELEGRAM_API.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends to a group chat through the Telegram Bot API.
pub struct TelegramSink {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSink {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    async fn send_message(&self, body: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .context("telegram sendMessage failed")?;
        let result: TelegramApiResponse = response
            .json()
            .await
            .context("invalid telegram sendMessage response")?;
        if !result.ok {
            return Err(anyhow!(
                "telegram rejected message: {}",
                result.description.unwrap_or_default()
            ));
        }
        Ok(())
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn send(&self, text: &str) -> Result<()> {
        self.send_message(serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        }))
        .await
    }

    async fn send_preformatted(&self, text: &str) -> Result<()> {
        self.send_message(serde_json::json!({
            "chat_id": self.config.chat_id,
            "text": format!("<pre>{}</pre>", escape_html(text)),
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        }))
        .await
    }
}

/// Escape the characters Telegram's HTML mode treats as markup.
fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Logs messages instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn send(&self, text: &str) -> Result<()> {
        info!(message = %text, "dry run, message not delivered");
        Ok(())
    }
}
