//! Content router — picks the delivery path for a unit.

use tracing::debug;

use super::types::{DeliveryUnit, InboundItem, PayloadKind};

/// Delivery path chosen for a unit.
#[derive(Debug, Clone)]
pub enum Route {
    /// Plain text message.
    Text(InboundItem),
    /// One photo or video.
    SingleMedia(InboundItem),
    /// Photos/videos of one album, arrival order, non-media members removed.
    ///
    /// `captioned` is false when the album's first arrival was not a photo
    /// or video; such an album goes out without a caption.
    Album {
        members: Vec<InboundItem>,
        captioned: bool,
    },
    /// Nothing to send.
    Skip { reason: &'static str },
}

impl Route {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::SingleMedia(_) => "single_media",
            Self::Album { .. } => "album",
            Self::Skip { .. } => "skip",
        }
    }
}

/// Classify a delivery unit.
pub fn route(unit: DeliveryUnit) -> Route {
    match unit {
        DeliveryUnit::Singleton(item) => match item.kind {
            PayloadKind::Text => Route::Text(item),
            PayloadKind::Photo | PayloadKind::Video => Route::SingleMedia(item),
            PayloadKind::Other => Route::Skip {
                reason: "unsupported payload",
            },
        },
        DeliveryUnit::Group(group) => {
            let total = group.len();
            let captioned = group.members.first().is_some_and(|m| m.kind.is_media());
            let media: Vec<InboundItem> = group
                .members
                .into_iter()
                .filter(|m| m.kind.is_media())
                .collect();

            if media.len() < total {
                debug!(
                    group = %group.key,
                    skipped = total - media.len(),
                    "Dropping non-media album members"
                );
            }

            if media.is_empty() {
                Route::Skip {
                    reason: "album without photos or videos",
                }
            } else {
                Route::Album {
                    members: media,
                    captioned,
                }
            }
        }
    }
}
