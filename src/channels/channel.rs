//! Channel traits: the inbound feed and the outbound send primitive.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::relay::types::InboundItem;

/// Stream of inbound items produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = InboundItem> + Send>>;

/// Source of inbound items.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Start listening. Items arrive on the returned stream until it ends.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Verify credentials/connectivity.
    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}

/// Media kinds the destination accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }
}

/// One media item ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMedia {
    pub kind: MediaKind,
    /// Channel-native file reference.
    pub file_id: String,
    pub caption: Option<String>,
}

/// Text formatting mode for outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Html,
}

/// Outbound send primitive. One call is one delivery attempt, no retries.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), ChannelError>;

    async fn send_media(&self, chat_id: &str, media: &OutgoingMedia) -> Result<(), ChannelError>;

    /// Send media as one album, in order.
    async fn send_media_group(
        &self,
        chat_id: &str,
        media: &[OutgoingMedia],
    ) -> Result<(), ChannelError>;
}
