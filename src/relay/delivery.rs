//! Delivery pipeline — applies the template and calls the outbound primitive.

use std::sync::Arc;

use tracing::{debug, info};

use super::router::Route;
use super::types::{InboundItem, PayloadKind};
use crate::channels::{MediaKind, OutgoingMedia, Outbound};
use crate::error::DeliveryError;
use crate::template::{Template, TemplateStore};

/// What a delivery sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Text,
    Media(MediaKind),
    Album { members: usize },
    Skipped,
}

/// Formats routed units and sends them to the destination.
pub struct DeliveryPipeline {
    outbound: Arc<dyn Outbound>,
    templates: Arc<TemplateStore>,
    destination: String,
}

impl DeliveryPipeline {
    pub fn new(
        outbound: Arc<dyn Outbound>,
        templates: Arc<TemplateStore>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            outbound,
            templates,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Format and send one routed unit.
    ///
    /// Everything is formatted before the first send, so a template error
    /// sends nothing.
    pub async fn deliver(&self, route: Route) -> Result<Delivery, DeliveryError> {
        let template = self.templates.get().await;

        match route {
            Route::Text(item) => {
                let text = apply(&template, &item)?;
                self.outbound
                    .send_text(&self.destination, &text, None)
                    .await?;
                info!(item_id = item.id, "Relayed text");
                Ok(Delivery::Text)
            }
            Route::SingleMedia(item) => {
                let caption = apply(&template, &item)?;
                let Some(media) = outgoing(&item, Some(caption)) else {
                    return Ok(Delivery::Skipped);
                };
                self.outbound.send_media(&self.destination, &media).await?;
                info!(item_id = item.id, kind = media.kind.as_str(), "Relayed media");
                Ok(Delivery::Media(media.kind))
            }
            Route::Album {
                members: items,
                captioned,
            } => {
                let Some(first) = items.first() else {
                    return Ok(Delivery::Skipped);
                };
                let caption = if captioned {
                    Some(apply(&template, first)?)
                } else {
                    None
                };

                let media: Vec<OutgoingMedia> = items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, item)| outgoing(item, caption.clone().filter(|_| i == 0)))
                    .collect();

                self.outbound
                    .send_media_group(&self.destination, &media)
                    .await?;
                info!(
                    first_item_id = first.id,
                    members = media.len(),
                    "Relayed album"
                );
                Ok(Delivery::Album {
                    members: media.len(),
                })
            }
            Route::Skip { reason } => {
                debug!(reason, "Nothing to relay");
                Ok(Delivery::Skipped)
            }
        }
    }
}

/// Render the item's caption/text; a missing one renders as empty.
fn apply(template: &Template, item: &InboundItem) -> Result<String, DeliveryError> {
    Ok(template.render(item.templatable_text().unwrap_or(""))?)
}

fn outgoing(item: &InboundItem, caption: Option<String>) -> Option<OutgoingMedia> {
    let kind = match item.kind {
        PayloadKind::Photo => MediaKind::Photo,
        PayloadKind::Video => MediaKind::Video,
        PayloadKind::Text | PayloadKind::Other => return None,
    };
    Some(OutgoingMedia {
        kind,
        file_id: item.content.clone(),
        caption,
    })
}
