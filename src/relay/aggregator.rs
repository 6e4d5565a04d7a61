//! Album aggregator — folds a burst of items sharing a correlation key into
//! one group.
//!
//! There is no "album complete" signal on the wire, so the first item of a
//! burst opens a group and its handler waits out a short window; everything
//! that arrives for the same key in the meantime is appended and suppressed.
//! When the window elapses the group is removed from the registry and
//! handed back as a whole.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{Group, InboundItem};

/// Outcome of admitting one item.
#[derive(Debug)]
pub enum Admission {
    /// No correlation key: deliver on its own.
    Standalone(InboundItem),
    /// First member of a new group. Pass the ticket to [`AlbumAggregator::settle`].
    GroupOpened(GroupTicket),
    /// Folded into an open group; nothing to deliver for this item.
    Suppressed,
    /// The window elapsed; deliver these members together.
    GroupClosed(Group),
}

/// Handle held by the task that opened a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTicket {
    pub key: String,
    pub group_id: u64,
}

/// Registry of open groups keyed by correlation key.
pub struct AlbumAggregator {
    window: Duration,
    groups: Mutex<HashMap<String, Group>>,
    next_id: AtomicU64,
}

impl AlbumAggregator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            groups: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide what to do with `item`. Never waits on the window.
    pub async fn admit(&self, item: InboundItem) -> Admission {
        let Some(key) = item.correlation_key.clone() else {
            return Admission::Standalone(item);
        };

        let mut groups = self.groups.lock().await;

        if let Some(group) = groups.get_mut(&key) {
            if group.contains(item.id) {
                debug!(group = %key, item_id = item.id, "Duplicate album member ignored");
            } else {
                group.members.push(item);
                debug!(group = %key, members = group.len(), "Album member appended");
            }
            return Admission::Suppressed;
        }

        let group_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(group = %key, group_id, item_id = item.id, "Album opened");
        groups.insert(key.clone(), Group::open(key.clone(), group_id, item));

        Admission::GroupOpened(GroupTicket { key, group_id })
    }

    /// Wait out the window for an opened group, then close it.
    ///
    /// Always yields [`Admission::GroupClosed`]. Items that arrive for the
    /// same key after this returns open a fresh group.
    pub async fn settle(&self, ticket: GroupTicket) -> Admission {
        tokio::time::sleep(self.window).await;
        Admission::GroupClosed(self.close(&ticket).await)
    }

    /// Remove the ticket's group from the registry and mark it closed.
    async fn close(&self, ticket: &GroupTicket) -> Group {
        let mut groups = self.groups.lock().await;

        let owned = groups
            .get(&ticket.key)
            .is_some_and(|g| g.id == ticket.group_id);
        let Some(mut group) = owned.then(|| groups.remove(&ticket.key)).flatten() else {
            warn!(group = %ticket.key, group_id = ticket.group_id, "Album vanished before close");
            return Group {
                key: ticket.key.clone(),
                id: ticket.group_id,
                members: Vec::new(),
                closed: true,
            };
        };
        group.closed = true;

        info!(
            group = %group.key,
            members = group.len(),
            span_ms = group.span().num_milliseconds(),
            "Album closed"
        );

        group
    }

    /// Number of groups currently waiting for their window.
    pub async fn open_groups(&self) -> usize {
        self.groups.lock().await.len()
    }
}
