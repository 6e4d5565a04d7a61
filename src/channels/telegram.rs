//! Telegram channel — long-polls the Bot API for updates and sends to the
//! destination channel.
//!
//! Native Bot API implementation over reqwest: `getUpdates` feeds the relay,
//! `sendMessage`/`sendPhoto`/`sendVideo`/`sendMediaGroup` deliver.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::channels::{
    Channel, MediaKind, MessageStream, OutgoingMedia, Outbound, ParseMode,
};
use crate::config::DEFAULT_API_BASE;
use crate::error::ChannelError;
use crate::relay::types::{InboundItem, PayloadKind};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// sendMediaGroup accepts 2–10 items.
const TELEGRAM_MAX_ALBUM_SIZE: usize = 10;

/// Long-poll timeout passed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Media keys that are recognized but not relayed.
const UNSUPPORTED_MEDIA: &[&str] = &["document", "audio", "animation", "voice", "sticker"];

/// Telegram channel — connects to the Bot API via long-polling.
#[derive(Clone)]
pub struct TelegramChannel {
    api_base: String,
    bot_token: SecretString,
    skip_updates: bool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            bot_token,
            skip_updates: true,
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Whether to drop updates that queued while the bot was offline.
    pub fn with_skip_updates(mut self, skip: bool) -> Self {
        self.skip_updates = skip;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// POST a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| send_failed(method, e))?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} returned {status}: {err}"),
            });
        }

        let data: Value = resp.json().await.map_err(|e| send_failed(method, e))?;
        if data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} not ok: {description}"),
            });
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Offset that skips everything currently queued on the server.
    async fn pending_offset(&self) -> Result<i64, ChannelError> {
        let result = self
            .call("getUpdates", &json!({ "offset": -1, "timeout": 0 }))
            .await?;
        Ok(result
            .as_array()
            .and_then(|updates| updates.last())
            .and_then(|u| u.get("update_id"))
            .and_then(Value::as_i64)
            .map_or(0, |id| id + 1))
    }

    async fn poll_loop(self, tx: tokio::sync::mpsc::UnboundedSender<InboundItem>) {
        let mut offset: i64 = 0;

        if self.skip_updates {
            match self.pending_offset().await {
                Ok(next) => {
                    if next > 0 {
                        tracing::info!(offset = next, "Skipping updates queued while offline");
                    }
                    offset = next;
                }
                Err(e) => tracing::warn!("Telegram: could not skip pending updates: {e}"),
            }
        }

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let body = json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"]
            });

            let updates = match self.call("getUpdates", &body).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                }
            };

            let Some(results) = updates.as_array() else {
                continue;
            };

            for update in results {
                // Advance offset past this update
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(item) = parse_update(update) else {
                    tracing::debug!("Telegram: skipping update without relayable content");
                    continue;
                };

                if tx.send(item).is_err() {
                    tracing::info!("Telegram listener channel closed");
                    return;
                }
            }
        }
    }
}

fn send_failed(method: &str, e: reqwest::Error) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason: format!("{method}: {e}"),
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(self.clone().poll_loop(tx));

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let me = self
            .call("getMe", &json!({}))
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        let username = me.get("username").and_then(Value::as_str).unwrap_or("?");
        tracing::info!(bot = %username, "Telegram bot authenticated");
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Outbound implementation ─────────────────────────────────────────

#[async_trait]
impl Outbound for TelegramChannel {
    /// Send a text message, split if it exceeds Telegram's 4096 char limit.
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            let mut body = json!({ "chat_id": chat_id, "text": chunk });
            if let Some(ParseMode::Html) = parse_mode {
                body["parse_mode"] = Value::String("HTML".into());
            }
            self.call("sendMessage", &body).await?;
        }
        Ok(())
    }

    async fn send_media(&self, chat_id: &str, media: &OutgoingMedia) -> Result<(), ChannelError> {
        let method = match media.kind {
            MediaKind::Photo => "sendPhoto",
            MediaKind::Video => "sendVideo",
        };

        let mut body = json!({ "chat_id": chat_id });
        body[media.kind.as_str()] = Value::String(media.file_id.clone());
        if let Some(cap) = media.caption.as_deref().filter(|c| !c.is_empty()) {
            body["caption"] = Value::String(cap.to_string());
        }

        self.call(method, &body).await?;
        tracing::debug!(chat_id, kind = media.kind.as_str(), "Telegram media sent");
        Ok(())
    }

    /// Albums of one go out as a plain photo/video; larger ones in chunks of ten.
    async fn send_media_group(
        &self,
        chat_id: &str,
        media: &[OutgoingMedia],
    ) -> Result<(), ChannelError> {
        if let [single] = media {
            return self.send_media(chat_id, single).await;
        }

        for chunk in media.chunks(TELEGRAM_MAX_ALBUM_SIZE) {
            if let [single] = chunk {
                self.send_media(chat_id, single).await?;
                continue;
            }
            let body = json!({
                "chat_id": chat_id,
                "media": input_media(chunk),
            });
            self.call("sendMediaGroup", &body).await?;
        }

        tracing::debug!(chat_id, members = media.len(), "Telegram album sent");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Convert one Bot API update into an inbound item.
///
/// Returns `None` for updates without a message or without content the
/// relay recognizes (service messages, polls, ...).
pub fn parse_update(update: &Value) -> Option<InboundItem> {
    let message = update.get("message")?;
    let id = message.get("message_id").and_then(Value::as_i64)?;

    let file_id = |key: &str| {
        message
            .get(key)
            .and_then(|m| m.get("file_id"))
            .and_then(Value::as_str)
    };

    let (kind, content) = if let Some(text) = message.get("text").and_then(Value::as_str) {
        (PayloadKind::Text, text)
    } else if let Some(sizes) = message.get("photo").and_then(Value::as_array) {
        // Sizes are ordered smallest to largest
        let largest = sizes
            .last()
            .and_then(|s| s.get("file_id"))
            .and_then(Value::as_str)?;
        (PayloadKind::Photo, largest)
    } else if let Some(video) = file_id("video") {
        (PayloadKind::Video, video)
    } else if let Some(other) = UNSUPPORTED_MEDIA.iter().find_map(|key| file_id(key)) {
        (PayloadKind::Other, other)
    } else {
        return None;
    };

    let caption = match kind {
        PayloadKind::Text => None,
        _ => message.get("caption").and_then(Value::as_str),
    };

    let mut item = InboundItem::new(id, kind, content, caption);
    item.correlation_key = message
        .get("media_group_id")
        .and_then(Value::as_str)
        .map(String::from);
    item.sender_id = message
        .get("from")
        .and_then(|f| f.get("id"))
        .and_then(Value::as_i64);
    item.chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64);
    if let Some(sent_at) = message
        .get("date")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    {
        item.received_at = sent_at;
    }

    Some(item)
}

/// Build the `media` array for sendMediaGroup.
fn input_media(media: &[OutgoingMedia]) -> Vec<Value> {
    media
        .iter()
        .map(|m| {
            let mut entry = json!({ "type": m.kind.as_str(), "media": m.file_id });
            if let Some(cap) = m.caption.as_deref().filter(|c| !c.is_empty()) {
                entry["caption"] = Value::String(cap.to_string());
            }
            entry
        })
        .collect()
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    loop {
        // Byte offset of the first char past the limit
        let Some((cut, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..cut];
        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            // Don't split at position 0 (infinite loop guard)
            .filter(|&i| i > 0)
            .unwrap_or(cut);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
        if remaining.is_empty() {
            break;
        }
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
