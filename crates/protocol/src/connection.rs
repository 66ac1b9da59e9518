//! Per-connection outbound routing. Connections are identified by a plain
//! integer id rather than a reference back to the socket — the
//! subscription registry and notifier key off this id, never a live
//! handle, so neither side can form a reference cycle (SPEC_FULL §9).

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use relay_codec::ServerEnvelope;
use tokio::sync::mpsc;

pub type ConnId = u64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// A fresh, process-unique connection id.
#[must_use]
pub fn next_conn_id() -> ConnId {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Maps a live connection's id to the channel its write task drains.
/// Shared mutable state; `DashMap` gives fine-grained per-shard locking so
/// the notifier's fan-out doesn't serialize behind a single mutex.
#[derive(Default)]
pub struct ConnectionRegistry {
    senders: DashMap<ConnId, mpsc::UnboundedSender<ServerEnvelope>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ConnId, sender: mpsc::UnboundedSender<ServerEnvelope>) {
        self.senders.insert(id, sender);
    }

    pub fn remove(&self, id: ConnId) {
        self.senders.remove(&id);
    }

    /// Best-effort delivery: `false` means the connection is gone or its
    /// channel is closed, and the caller should drop it from any other
    /// registry (e.g. subscriptions) it's tracked in.
    pub fn send(&self, id: ConnId, envelope: ServerEnvelope) -> bool {
        match self.senders.get(&id) {
            Some(sender) => sender.send(envelope).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_conn_id_is_monotonically_increasing() {
        let a = next_conn_id();
        let b = next_conn_id();
        assert!(b > a);
    }

    #[test]
    fn send_to_an_unregistered_connection_reports_failure() {
        let registry = ConnectionRegistry::new();
        let sent = registry.send(999, ServerEnvelope::Eose { sub_id: "s".into() });
        assert!(!sent);
    }

    #[test]
    fn send_to_a_registered_connection_delivers_the_envelope() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(1, tx);

        assert!(registry.send(1, ServerEnvelope::Eose { sub_id: "s".into() }));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn removing_a_connection_makes_further_sends_fail() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(1, tx);
        registry.remove(1);

        assert!(!registry.send(1, ServerEnvelope::Eose { sub_id: "s".into() }));
    }
}
