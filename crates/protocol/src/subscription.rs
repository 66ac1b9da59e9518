//! The subscription registry: `(connection, subId) -> {filters, cancel}`.
//! Readers (the notifier's fan-out) and writers (CLOSE, teardown) share a
//! `tokio::sync::RwLock` so a notify pass never blocks behind a slow
//! concurrent CLOSE, and vice versa.

use std::collections::HashMap;

use relay_events::{Event, Filter};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::connection::ConnId;

pub struct SubEntry {
    pub filters: Vec<Filter>,
    pub cancel: CancellationToken,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<(ConnId, String), SubEntry>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription, returning the cancellation token the
    /// connection's handler loop should watch (cancelled on teardown).
    pub async fn insert(&self, conn: ConnId, sub_id: String, filters: Vec<Filter>) -> CancellationToken {
        let cancel = CancellationToken::new();
        let mut entries = self.entries.write().await;
        entries.insert((conn, sub_id), SubEntry { filters, cancel: cancel.clone() });
        cancel
    }

    pub async fn remove(&self, conn: ConnId, sub_id: &str) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.remove(&(conn, sub_id.to_string())) {
            entry.cancel.cancel();
        }
    }

    /// Remove every subscription belonging to `conn` (connection teardown),
    /// cancelling each one's in-flight handler work.
    pub async fn remove_connection(&self, conn: ConnId) {
        let mut entries = self.entries.write().await;
        entries.retain(|(c, _), entry| {
            if *c == conn {
                entry.cancel.cancel();
                false
            } else {
                true
            }
        });
    }

    /// `(conn, subId)` pairs whose stored filters match `event` — any one
    /// of a subscription's filters matching is enough (OR semantics across
    /// the filters of a single REQ, same as `query_events`).
    pub async fn matching(&self, event: &Event) -> Vec<(ConnId, String)> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, entry)| entry.filters.iter().any(|f| f.matches(event)))
            .map(|((conn, sub_id), _)| (*conn, sub_id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: u64) -> Event {
        Event {
            id: "id1".into(),
            pubkey: "pk1".into(),
            created_at: 100,
            kind,
            tags: vec![],
            content: String::new(),
            sig: "sig".into(),
        }
    }

    #[tokio::test]
    async fn a_subscription_matches_on_its_filter() {
        let registry = SubscriptionRegistry::new();
        registry.insert(1, "sub1".into(), vec![Filter { kinds: vec![1], ..Filter::default() }]).await;

        let hits = registry.matching(&event(1)).await;
        assert_eq!(hits, vec![(1, "sub1".to_string())]);

        let hits = registry.matching(&event(2)).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn close_removes_only_the_named_subscription() {
        let registry = SubscriptionRegistry::new();
        registry.insert(1, "sub1".into(), vec![Filter::default()]).await;
        registry.insert(1, "sub2".into(), vec![Filter::default()]).await;

        registry.remove(1, "sub1").await;

        let hits = registry.matching(&event(1)).await;
        assert_eq!(hits, vec![(1, "sub2".to_string())]);
    }

    #[tokio::test]
    async fn teardown_removes_every_subscription_for_that_connection() {
        let registry = SubscriptionRegistry::new();
        registry.insert(1, "sub1".into(), vec![Filter::default()]).await;
        registry.insert(2, "sub2".into(), vec![Filter::default()]).await;

        registry.remove_connection(1).await;

        let hits = registry.matching(&event(1)).await;
        assert_eq!(hits, vec![(2, "sub2".to_string())]);
    }
}
