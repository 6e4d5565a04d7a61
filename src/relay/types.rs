//! Shared types for the relay pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound item ────────────────────────────────────────────────────

/// What an inbound item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Text,
    Photo,
    Video,
    /// Media the relay does not forward (documents, audio, stickers, ...).
    Other,
}

impl PayloadKind {
    pub fn is_media(self) -> bool {
        matches!(self, Self::Photo | Self::Video)
    }

    /// Short label for logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Other => "other",
        }
    }
}

/// One message from the inbound feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundItem {
    /// Channel-native message id.
    pub id: i64,
    /// Album identifier, present only on members of a multi-item burst.
    pub correlation_key: Option<String>,
    pub kind: PayloadKind,
    /// Message body for text, file reference for media.
    pub content: String,
    /// Media caption. Always `None` for text.
    pub caption: Option<String>,
    /// Who sent it (used to authorize commands).
    pub sender_id: Option<i64>,
    /// Where it came from (command confirmations go back here).
    pub chat_id: Option<i64>,
    pub received_at: DateTime<Utc>,
}

impl InboundItem {
    pub fn text(id: i64, body: impl Into<String>) -> Self {
        Self::new(id, PayloadKind::Text, body, None)
    }

    pub fn photo(id: i64, file_id: impl Into<String>, caption: Option<&str>) -> Self {
        Self::new(id, PayloadKind::Photo, file_id, caption)
    }

    pub fn video(id: i64, file_id: impl Into<String>, caption: Option<&str>) -> Self {
        Self::new(id, PayloadKind::Video, file_id, caption)
    }

    pub fn new(
        id: i64,
        kind: PayloadKind,
        content: impl Into<String>,
        caption: Option<&str>,
    ) -> Self {
        Self {
            id,
            correlation_key: None,
            kind,
            content: content.into(),
            caption: caption.map(String::from),
            sender_id: None,
            chat_id: None,
            received_at: Utc::now(),
        }
    }

    pub fn in_group(mut self, key: impl Into<String>) -> Self {
        self.correlation_key = Some(key.into());
        self
    }

    pub fn from_sender(mut self, sender_id: i64, chat_id: i64) -> Self {
        self.sender_id = Some(sender_id);
        self.chat_id = Some(chat_id);
        self
    }

    /// The text the template is applied to: the body for text items, the
    /// caption for media.
    pub fn templatable_text(&self) -> Option<&str> {
        match self.kind {
            PayloadKind::Text => Some(&self.content),
            _ => self.caption.as_deref(),
        }
    }

    /// Split a `/command args` text into its parts. `/cmd@BotName` is accepted.
    pub fn command(&self) -> Option<(&str, &str)> {
        if self.kind != PayloadKind::Text {
            return None;
        }
        let body = self.content.strip_prefix('/')?;
        let (head, args) = match body.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim_start()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or(head);
        if name.is_empty() {
            return None;
        }
        Some((name, args))
    }
}

// ── Group ───────────────────────────────────────────────────────────

/// In-flight aggregation of items sharing one correlation key.
#[derive(Debug, Clone)]
pub struct Group {
    pub key: String,
    /// Process-unique id; a reused key gets a new one.
    pub id: u64,
    /// Arrival order; the opener is first.
    pub members: Vec<InboundItem>,
    pub closed: bool,
}

impl Group {
    pub fn open(key: String, id: u64, opener: InboundItem) -> Self {
        Self {
            key,
            id,
            members: vec![opener],
            closed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, item_id: i64) -> bool {
        self.members.iter().any(|m| m.id == item_id)
    }

    /// Time between the first and last arrival.
    pub fn span(&self) -> chrono::Duration {
        match (self.members.first(), self.members.last()) {
            (Some(first), Some(last)) => last.received_at - first.received_at,
            _ => chrono::Duration::zero(),
        }
    }
}

// ── Delivery unit ───────────────────────────────────────────────────

/// A unit ready for routing: one standalone item or a closed group.
#[derive(Debug, Clone)]
pub enum DeliveryUnit {
    Singleton(InboundItem),
    Group(Group),
}
