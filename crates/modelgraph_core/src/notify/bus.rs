//! Drain-based notification queues.
//!
//! # Invariants
//! - Each subscriber has its own FIFO queue capped at the configured limit;
//!   on overflow the oldest notification is dropped.
//! - Unsubscribing twice is harmless.

use crate::model::record::RecordLid;
use crate::store::StoreId;
use log::warn;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Closed set of notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RelationshipChanged,
    RecordLoaded,
    RecordCreated,
    RecordUpdated,
    RecordDeleted,
    RecordRolledBack,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RelationshipChanged => "relationship_changed",
            Self::RecordLoaded => "record_loaded",
            Self::RecordCreated => "record_created",
            Self::RecordUpdated => "record_updated",
            Self::RecordDeleted => "record_deleted",
            Self::RecordRolledBack => "record_rolled_back",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    RelationshipChanged { record: RecordLid, field: String },
    RecordLoaded { record: RecordLid },
    RecordCreated { record: RecordLid },
    RecordUpdated { record: RecordLid },
    RecordDeleted { record: RecordLid },
    RecordRolledBack { record: RecordLid },
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::RelationshipChanged { .. } => NotificationKind::RelationshipChanged,
            Self::RecordLoaded { .. } => NotificationKind::RecordLoaded,
            Self::RecordCreated { .. } => NotificationKind::RecordCreated,
            Self::RecordUpdated { .. } => NotificationKind::RecordUpdated,
            Self::RecordDeleted { .. } => NotificationKind::RecordDeleted,
            Self::RecordRolledBack { .. } => NotificationKind::RecordRolledBack,
        }
    }

    pub fn record(&self) -> RecordLid {
        match self {
            Self::RelationshipChanged { record, .. }
            | Self::RecordLoaded { record }
            | Self::RecordCreated { record }
            | Self::RecordUpdated { record }
            | Self::RecordDeleted { record }
            | Self::RecordRolledBack { record } => *record,
        }
    }
}

/// Which notifications a subscriber receives. Empty filter = everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFilter {
    kinds: Option<BTreeSet<NotificationKind>>,
    record: Option<RecordLid>,
}

impl NotificationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn kinds(kinds: impl IntoIterator<Item = NotificationKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            record: None,
        }
    }

    pub fn for_record(record: RecordLid) -> Self {
        Self {
            kinds: None,
            record: Some(record),
        }
    }

    pub fn and_record(mut self, record: RecordLid) -> Self {
        self.record = Some(record);
        self
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        let kind_ok = self
            .kinds
            .as_ref()
            .map_or(true, |kinds| kinds.contains(&notification.kind()));
        let record_ok = self
            .record
            .map_or(true, |record| record == notification.record());
        kind_ok && record_ok
    }
}

/// Subscription handle. Not `Clone`: one owner unsubscribes.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    store: StoreId,
    id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
struct Subscriber {
    filter: NotificationFilter,
    queue: VecDeque<Notification>,
    dropped: u64,
}

#[derive(Debug)]
pub struct NotificationBus {
    store: StoreId,
    next_id: u64,
    queue_limit: usize,
    subscribers: BTreeMap<u64, Subscriber>,
}

impl NotificationBus {
    pub fn new(store: StoreId, queue_limit: usize) -> Self {
        Self {
            store,
            next_id: 1,
            queue_limit,
            subscribers: BTreeMap::new(),
        }
    }

    pub fn subscribe(&mut self, filter: NotificationFilter) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(
            id,
            Subscriber {
                filter,
                queue: VecDeque::new(),
                dropped: 0,
            },
        );
        Subscription {
            store: self.store,
            id,
        }
    }

    /// Returns `false` when the handle was already released or is foreign.
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        subscription.store == self.store && self.subscribers.remove(&subscription.id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&mut self, notification: Notification) {
        for (id, subscriber) in self.subscribers.iter_mut() {
            if !subscriber.filter.matches(&notification) {
                continue;
            }
            subscriber.queue.push_back(notification.clone());
            if subscriber.queue.len() > self.queue_limit {
                subscriber.queue.pop_front();
                subscriber.dropped += 1;
                warn!(
                    "event=notification_dropped module=notify status=skipped subscription={} dropped_total={}",
                    id, subscriber.dropped
                );
            }
        }
    }

    /// Takes every queued notification of one subscriber, oldest first.
    pub fn drain(&mut self, subscription: &Subscription) -> Vec<Notification> {
        if subscription.store != self.store {
            return Vec::new();
        }
        self.subscribers
            .get_mut(&subscription.id)
            .map(|subscriber| subscriber.queue.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn pending(&self, subscription: &Subscription) -> usize {
        self.subscribers
            .get(&subscription.id)
            .filter(|_| subscription.store == self.store)
            .map_or(0, |subscriber| subscriber.queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::{Notification, NotificationBus, NotificationFilter, NotificationKind};
    use crate::store::StoreId;
    use uuid::Uuid;

    #[test]
    fn filters_by_kind_and_record() {
        let mut bus = NotificationBus::new(StoreId::next(), 16);
        let watched = Uuid::new_v4();
        let everything = bus.subscribe(NotificationFilter::all());
        let created = bus.subscribe(NotificationFilter::kinds([NotificationKind::RecordCreated]));
        let one_record = bus.subscribe(NotificationFilter::for_record(watched));

        bus.publish(Notification::RecordCreated { record: watched });
        bus.publish(Notification::RelationshipChanged {
            record: Uuid::new_v4(),
            field: "job".to_string(),
        });

        assert_eq!(bus.drain(&everything).len(), 2);
        assert_eq!(
            bus.drain(&created),
            vec![Notification::RecordCreated { record: watched }]
        );
        assert_eq!(bus.drain(&one_record).len(), 1);
        assert!(bus.drain(&everything).is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut bus = NotificationBus::new(StoreId::next(), 2);
        let subscription = bus.subscribe(NotificationFilter::all());
        let records = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        for record in records {
            bus.publish(Notification::RecordLoaded { record });
        }

        let drained = bus.drain(&subscription);
        assert_eq!(
            drained.iter().map(Notification::record).collect::<Vec<_>>(),
            records[1..].to_vec()
        );
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mut bus = NotificationBus::new(StoreId::next(), 4);
        let subscription = bus.subscribe(NotificationFilter::all());
        assert!(bus.unsubscribe(&subscription));
        assert!(!bus.unsubscribe(&subscription));
        bus.publish(Notification::RecordLoaded {
            record: Uuid::new_v4(),
        });
        assert!(bus.drain(&subscription).is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }
}
