//! Relay dispatcher — consumes the inbound stream, one task per item.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::aggregator::{Admission, AlbumAggregator};
use super::delivery::{Delivery, DeliveryPipeline};
use super::router;
use super::types::{DeliveryUnit, InboundItem};
use crate::channels::{MessageStream, Outbound, ParseMode};
use crate::error::Result;
use crate::template::handler::{self, TemplateUpdateHandler};

/// What happened to one inbound item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Routed and sent (or skipped by the router).
    Delivered(Delivery),
    /// Folded into an album another task delivers.
    Suppressed,
    /// Operator changed the template.
    TemplateUpdated,
    /// Operator's pattern was invalid or could not be saved.
    TemplateRejected,
    /// Privileged command from someone else.
    Ignored,
}

/// Result of the stream-ordered half of handling an item.
enum Step {
    Done(Outcome),
    Pending(Admission),
}

/// Wires the aggregator, router and delivery pipeline together.
pub struct Relay {
    aggregator: AlbumAggregator,
    pipeline: DeliveryPipeline,
    updates: TemplateUpdateHandler,
    replies: Arc<dyn Outbound>,
}

impl Relay {
    pub fn new(
        aggregator: AlbumAggregator,
        pipeline: DeliveryPipeline,
        updates: TemplateUpdateHandler,
        replies: Arc<dyn Outbound>,
    ) -> Arc<Self> {
        Arc::new(Self {
            aggregator,
            pipeline,
            updates,
            replies,
        })
    }

    pub fn aggregator(&self) -> &AlbumAggregator {
        &self.aggregator
    }

    /// Handle one inbound item to completion.
    ///
    /// For the opener of an album this includes waiting out the album window.
    pub async fn handle(&self, item: InboundItem) -> Result<Outcome> {
        match self.accept(item).await? {
            Step::Done(outcome) => Ok(outcome),
            Step::Pending(admission) => self.complete(admission).await,
        }
    }

    /// The part of handling that must follow stream order: commands and
    /// album membership. Never waits on the album window.
    async fn accept(&self, item: InboundItem) -> Result<Step> {
        if let Some((name, args)) = item.command() {
            if name == handler::COMMAND {
                return self.handle_command(&item, args).await.map(Step::Done);
            }
        }

        Ok(match self.aggregator.admit(item).await {
            Admission::Suppressed => Step::Done(Outcome::Suppressed),
            admission => Step::Pending(admission),
        })
    }

    /// Settle, route and deliver an admitted item.
    async fn complete(&self, mut admission: Admission) -> Result<Outcome> {
        let unit = loop {
            match admission {
                Admission::Standalone(item) => break DeliveryUnit::Singleton(item),
                Admission::GroupOpened(ticket) => {
                    admission = self.aggregator.settle(ticket).await;
                }
                Admission::Suppressed => return Ok(Outcome::Suppressed),
                Admission::GroupClosed(group) => break DeliveryUnit::Group(group),
            }
        };

        let route = router::route(unit);
        let delivery = self.pipeline.deliver(route).await?;
        Ok(Outcome::Delivered(delivery))
    }

    async fn handle_command(&self, item: &InboundItem, args: &str) -> Result<Outcome> {
        let (outcome, reply) = match self.updates.handle(item.sender_id, args).await {
            Ok(None) => return Ok(Outcome::Ignored),
            Ok(Some(confirmation)) => (Outcome::TemplateUpdated, confirmation),
            Err(e) => {
                warn!(error = %e, "Template update rejected");
                (
                    Outcome::TemplateRejected,
                    format!("Template not updated: {}", handler::escape_html(&e.to_string())),
                )
            }
        };

        match item.chat_id {
            Some(chat_id) => {
                self.replies
                    .send_text(&chat_id.to_string(), &reply, Some(ParseMode::Html))
                    .await?;
            }
            None => warn!(item_id = item.id, "No chat to confirm template update in"),
        }

        Ok(outcome)
    }

    /// Drive the relay until `stream` ends, then wait for in-flight items.
    ///
    /// Items are admitted in stream order; settling and delivery run in one
    /// task per item. A failing item is logged and never stops the loop.
    pub async fn run(self: Arc<Self>, mut stream: MessageStream) {
        let mut tasks = JoinSet::new();

        info!(
            destination = %self.pipeline.destination(),
            window_ms = self.aggregator.window().as_millis() as u64,
            "Relay started"
        );

        while let Some(item) = stream.next().await {
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    error!("Relay task panicked: {e}");
                }
            }

            let item_id = item.id;
            let kind = item.kind.label();
            let admission = match self.accept(item).await {
                Ok(Step::Pending(admission)) => admission,
                Ok(Step::Done(_)) => continue,
                Err(e) => {
                    warn!(item_id, kind, error = %e, "Failed to relay item");
                    continue;
                }
            };

            let relay = Arc::clone(&self);
            tasks.spawn(async move {
                if let Err(e) = relay.complete(admission).await {
                    warn!(item_id, kind, error = %e, "Failed to relay item");
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Relay task panicked: {e}");
            }
        }

        info!("Inbound stream ended");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::channels::{MediaKind, OutgoingMedia};
    use crate::error::{ChannelError, Error, TemplateError};
    use crate::relay::delivery::tests::{RecordingOutbound, Sent};
    use crate::relay::types::PayloadKind;
    use crate::template::{Template, TemplatePersistence, TemplateStore};

    const ADMIN: i64 = 1;
    const ADMIN_CHAT: i64 = 500;

    struct NullPersistence;

    #[async_trait]
    impl TemplatePersistence for NullPersistence {
        async fn load(&self) -> std::result::Result<Option<String>, TemplateError> {
            Ok(None)
        }

        async fn save(&self, _pattern: &str) -> std::result::Result<(), TemplateError> {
            Ok(())
        }
    }

    fn relay(pattern: &str, window_ms: u64) -> (Arc<Relay>, Arc<RecordingOutbound>) {
        let outbound = Arc::new(RecordingOutbound::default());
        let store = TemplateStore::new(Template::new(pattern));
        let relay = Relay::new(
            AlbumAggregator::new(Duration::from_millis(window_ms)),
            DeliveryPipeline::new(outbound.clone(), Arc::clone(&store), "@dest"),
            TemplateUpdateHandler::new(ADMIN, store, Arc::new(NullPersistence)),
            outbound.clone(),
        );
        (relay, outbound)
    }

    fn stream_of(items: Vec<InboundItem>) -> MessageStream {
        Box::pin(futures::stream::iter(items))
    }

    fn photo(id: i64, key: &str, caption: Option<&str>) -> InboundItem {
        InboundItem::photo(id, format!("p{id}"), caption).in_group(key)
    }

    #[tokio::test]
    async fn scenario_text_with_template() {
        let (relay, outbound) = relay("📢 {}", 10);
        let outcome = relay.handle(InboundItem::text(1, "Hello")).await.unwrap();

        assert_eq!(outcome, Outcome::Delivered(Delivery::Text));
        assert_eq!(
            outbound.sent(),
            vec![Sent::Text {
                chat_id: "@dest".into(),
                text: "📢 Hello".into(),
                html: false,
            }]
        );
    }

    #[tokio::test]
    async fn scenario_album_of_three() {
        let (relay, outbound) = relay("📢 {}", 20);
        relay
            .run(stream_of(vec![
                photo(1, "g1", Some("caption")),
                photo(2, "g1", None),
                photo(3, "g1", Some("dropped")),
            ]))
            .await;

        let sent = outbound.sent();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Sent::Group { chat_id, media } => {
                assert_eq!(chat_id, "@dest");
                let ids: Vec<&str> = media.iter().map(|m| m.file_id.as_str()).collect();
                assert_eq!(ids, vec!["p1", "p2", "p3"]);
                assert_eq!(media[0].caption.as_deref(), Some("📢 caption"));
                assert!(media[1..].iter().all(|m| m.caption.is_none()));
            }
            other => panic!("Expected group, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn scenario_album_of_one() {
        let (relay, outbound) = relay("{}", 10);
        let outcome = relay.handle(photo(1, "g2", Some("solo"))).await.unwrap();

        assert_eq!(outcome, Outcome::Delivered(Delivery::Album { members: 1 }));
        assert_eq!(
            outbound.sent(),
            vec![Sent::Group {
                chat_id: "@dest".into(),
                media: vec![OutgoingMedia {
                    kind: MediaKind::Photo,
                    file_id: "p1".into(),
                    caption: Some("solo".into()),
                }],
            }]
        );
    }

    #[tokio::test]
    async fn scenario_non_operator_command() {
        let (relay, outbound) = relay("keep {}", 10);
        let cmd = InboundItem::text(1, "/pattern evil {}").from_sender(99, 99);

        assert_eq!(relay.handle(cmd).await.unwrap(), Outcome::Ignored);
        assert!(outbound.sent().is_empty());

        relay.handle(InboundItem::text(2, "x")).await.unwrap();
        assert!(matches!(&outbound.sent()[0], Sent::Text { text, .. } if text == "keep x"));
    }

    #[tokio::test]
    async fn scenario_empty_template_resets() {
        let (relay, outbound) = relay("📢 {}", 10);
        let cmd = InboundItem::text(1, "/pattern").from_sender(ADMIN, ADMIN_CHAT);
        assert_eq!(relay.handle(cmd).await.unwrap(), Outcome::TemplateUpdated);

        relay.handle(InboundItem::text(2, "Hi")).await.unwrap();

        let sent = outbound.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(&sent[0], Sent::Text { chat_id, html: true, .. } if chat_id == "500"));
        assert_eq!(
            sent[1],
            Sent::Text {
                chat_id: "@dest".into(),
                text: "Hi".into(),
                html: false,
            }
        );
    }

    #[tokio::test]
    async fn operator_command_with_escaped_newline() {
        let (relay, outbound) = relay("{}", 10);
        let cmd = InboundItem::text(1, "/pattern {}\\n#news").from_sender(ADMIN, ADMIN_CHAT);
        relay.handle(cmd).await.unwrap();

        relay.handle(InboundItem::text(2, "story")).await.unwrap();
        assert!(matches!(&outbound.sent()[1], Sent::Text { text, .. } if text == "story\n#news"));
    }

    #[tokio::test]
    async fn invalid_pattern_reported_to_operator() {
        let (relay, outbound) = relay("keep {}", 10);
        let cmd = InboundItem::text(1, "/pattern {a} {b}").from_sender(ADMIN, ADMIN_CHAT);

        assert_eq!(relay.handle(cmd).await.unwrap(), Outcome::TemplateRejected);
        match &outbound.sent()[0] {
            Sent::Text { chat_id, text, html } => {
                assert_eq!(chat_id, "500");
                assert!(text.starts_with("Template not updated:"));
                assert!(html);
            }
            other => panic!("Expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_commands_are_relayed_as_text() {
        let (relay, outbound) = relay("{}", 10);
        relay.handle(InboundItem::text(1, "/start")).await.unwrap();
        assert!(matches!(&outbound.sent()[0], Sent::Text { text, .. } if text == "/start"));
    }

    #[tokio::test]
    async fn singletons_are_never_grouped() {
        let (relay, outbound) = relay("{}", 10);
        relay
            .run(stream_of(vec![
                InboundItem::text(1, "a"),
                InboundItem::photo(2, "p2", None),
                InboundItem::video(3, "v3", None),
                InboundItem::text(4, "b"),
            ]))
            .await;

        let sent = outbound.sent();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|s| !matches!(s, Sent::Group { .. })));
    }

    #[tokio::test]
    async fn interleaved_albums_are_separate() {
        let (relay, outbound) = relay("{}", 20);
        Arc::clone(&relay)
            .run(stream_of(vec![
                photo(1, "a", Some("A")),
                photo(2, "b", Some("B")),
                photo(3, "a", None),
                InboundItem::text(4, "between"),
                photo(5, "b", None),
                photo(6, "b", None),
            ]))
            .await;

        let mut groups: Vec<Vec<String>> = outbound
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Group { media, .. } => Some(media.into_iter().map(|m| m.file_id).collect()),
                _ => None,
            })
            .collect();
        groups.sort();
        assert_eq!(groups, vec![vec!["p1", "p3"], vec!["p2", "p5", "p6"]]);
        assert_eq!(relay.aggregator().open_groups().await, 0);
    }

    #[tokio::test]
    async fn album_with_document_member_skips_it() {
        let (relay, outbound) = relay("{}", 10);
        let doc = InboundItem::new(2, PayloadKind::Other, "doc", None).in_group("g");
        relay
            .run(stream_of(vec![photo(1, "g", Some("c")), doc, photo(3, "g", None)]))
            .await;

        match &outbound.sent()[0] {
            Sent::Group { media, .. } => assert_eq!(media.len(), 2),
            other => panic!("Expected group, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_item_does_not_stop_stream() {
        let (relay, outbound) = relay("{} {}", 10);
        Arc::clone(&relay)
            .run(stream_of(vec![
                InboundItem::text(1, "first"),
                InboundItem::text(2, "second"),
            ]))
            .await;
        assert!(outbound.sent().is_empty());

        let err = relay.handle(InboundItem::text(3, "x")).await.unwrap_err();
        assert!(matches!(err, Error::Delivery(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn album_keeps_arrival_order_across_workers() {
        for round in 0..50 {
            let (relay, outbound) = relay("📢 {}", 15);
            let items: Vec<InboundItem> = (1..=10)
                .map(|id| photo(id, "burst", Some(format!("c{id}").as_str())))
                .collect();
            relay.run(stream_of(items)).await;

            let sent = outbound.sent();
            assert_eq!(sent.len(), 1, "round {round}");
            match &sent[0] {
                Sent::Group { media, .. } => {
                    let ids: Vec<&str> = media.iter().map(|m| m.file_id.as_str()).collect();
                    let expected: Vec<String> = (1..=10).map(|id| format!("p{id}")).collect();
                    assert_eq!(ids, expected, "round {round}");
                    assert_eq!(media[0].caption.as_deref(), Some("📢 c1"), "round {round}");
                }
                other => panic!("Expected group, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn template_update_applies_to_next_item_in_stream() {
        let (relay, outbound) = relay("old {}", 10);
        relay
            .run(stream_of(vec![
                InboundItem::text(1, "/pattern new {}").from_sender(ADMIN, ADMIN_CHAT),
                InboundItem::text(2, "post"),
            ]))
            .await;

        let sent = outbound.sent();
        assert!(
            matches!(sent.last(), Some(Sent::Text { chat_id, text, .. }) if chat_id == "@dest" && text == "new post")
        );
    }

    #[tokio::test]
    async fn failed_confirmation_is_channel_error() {
        let outbound = Arc::new(RecordingOutbound {
            fail: true,
            ..Default::default()
        });
        let store = TemplateStore::new(Template::identity());
        let relay = Relay::new(
            AlbumAggregator::new(Duration::from_millis(10)),
            DeliveryPipeline::new(outbound.clone(), Arc::clone(&store), "@dest"),
            TemplateUpdateHandler::new(ADMIN, Arc::clone(&store), Arc::new(NullPersistence)),
            outbound,
        );

        let cmd = InboundItem::text(1, "/pattern >> {}").from_sender(ADMIN, ADMIN_CHAT);
        let err = relay.handle(cmd).await.unwrap_err();
        assert!(matches!(err, Error::Channel(ChannelError::SendFailed { .. })));
        assert_eq!(store.get().await.pattern(), ">> {}");
    }
}
