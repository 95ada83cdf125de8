use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::TelegramConfig;

/// Telegram rejects messages longer than this many characters.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

const SEND_TIMEOUT: Duration = Duration::from_secs(20);
const ACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Split long messages for Telegram's per-message limit.
///
/// `max_len` counts characters, not bytes. Cuts prefer the last newline in
/// the window, then the last space, then a hard cut at the window end.
/// Trailing whitespace is trimmed from each chunk and empty chunks are
/// dropped.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.trim().is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let rest = &text[start..];
        // Byte offset of the window end, always on a char boundary
        let end = match rest.char_indices().nth(max_len) {
            Some((offset, _)) => start + offset,
            None => text.len(),
        };

        let cut = if end < text.len() {
            let window = &text[start..end];
            // A separator at the window start would make an empty cut
            window
                .rfind('\n')
                .filter(|&pos| pos > 0)
                .or_else(|| window.rfind(' ').filter(|&pos| pos > 0))
                .map(|pos| start + pos)
                .unwrap_or(end)
        } else {
            end
        };

        let chunk = text[start..cut].trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        start = cut;
    }

    chunks
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SendChatAction<'a> {
    chat_id: i64,
    action: &'a str,
}

/// Outbound side of the Bot API.
pub struct TelegramClient {
    client: reqwest::Client,
    /// `<api_base_url>/bot<token>`; never log this.
    api_url: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build Telegram HTTP client")?;
        let api_url = format!(
            "{}/bot{}",
            config.api_base_url.trim_end_matches('/'),
            config.bot_token
        );
        Ok(Self { client, api_url })
    }

    /// Show the "typing" indicator. Best effort: returns whether Telegram
    /// accepted it.
    pub async fn send_typing(&self, chat_id: i64) -> bool {
        let result = self
            .client
            .post(format!("{}/sendChatAction", self.api_url))
            .timeout(ACTION_TIMEOUT)
            .json(&SendChatAction {
                chat_id,
                action: "typing",
            })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!("sendChatAction error {}: {}", status, body);
                false
            }
            Err(e) => {
                warn!("sendChatAction failed: {}", e.without_url());
                false
            }
        }
    }

    /// Send `text` as one or more messages, in order.
    ///
    /// A failed chunk is logged and skipped; the rest are still sent.
    /// Returns how many chunks Telegram accepted.
    pub async fn send_text(&self, chat_id: i64, text: &str) -> usize {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LEN);
        let total = chunks.len();
        let mut delivered = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            match self.send_message(chat_id, chunk).await {
                Ok(()) => delivered += 1,
                Err(e) => error!(
                    "Failed to deliver chunk {}/{} to chat {}: {:#}",
                    index + 1,
                    total,
                    chat_id,
                    e
                ),
            }
        }

        debug!("Delivered {}/{} chunk(s) to chat {}", delivered, total, chat_id);
        delivered
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/sendMessage", self.api_url))
            .timeout(SEND_TIMEOUT)
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("sendMessage request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("sendMessage error {}: {}", status, body);
        }

        Ok(())
    }
}
