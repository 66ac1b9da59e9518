//! The core per-connection state machine: routes a parsed
//! [`ClientEnvelope`] to the right behavior and produces the
//! [`ServerEnvelope`] responses to send back, updating storage and the
//! subscription/connection registries as a side effect.
//!
//! A `Dispatcher` is transport-agnostic — it knows nothing about
//! websockets or TCP, only about envelopes, storage, and the registries.
//! [`crate::http`] is the thin layer that feeds it bytes from a real
//! connection.

use std::sync::Arc;

use relay_codec::ServerEnvelope;
use relay_config::Mode;
use relay_events::{Event, Filter};
use relay_store::Engine;

use crate::connection::{ConnId, ConnectionRegistry};
use crate::handlers::{self, HandlerRegistry, KindHandler};
use crate::subscription::SubscriptionRegistry;

pub struct Dispatcher {
    engine: Arc<dyn Engine>,
    mode: Mode,
    handlers: HandlerRegistry,
    event_freshness_secs: i64,
    pub connections: ConnectionRegistry,
    pub subscriptions: SubscriptionRegistry,
}

impl Dispatcher {
    #[must_use]
    pub fn new(engine: Arc<dyn Engine>, mode: Mode, handlers: HandlerRegistry, event_freshness_secs: i64) -> Self {
        Self {
            engine,
            mode,
            handlers,
            event_freshness_secs,
            connections: ConnectionRegistry::new(),
            subscriptions: SubscriptionRegistry::new(),
        }
    }

    fn resolve_handler(&self, kind: u64) -> Option<KindHandler> {
        match self.mode {
            Mode::Unlimited => Some(handlers::universal),
            Mode::Smart => self.handlers.get(kind),
        }
    }

    /// Validate, run the kind policy, and store `event`; on success, fan
    /// it out to matching subscriptions. Returns the `OK` response.
    ///
    /// The policy check and the commit both run on the blocking pool
    /// (`spawn_blocking`), since the `rocksdb` crate's API is synchronous
    /// and a commit must never stall the async runtime's worker threads.
    pub async fn handle_event(&self, event: Event, now: i64) -> ServerEnvelope {
        if let Err(e) = event.verify_integrity() {
            return reject(&event.id, e.to_string());
        }
        if let Err(e) = relay_events::check_freshness(event.created_at, now, self.event_freshness_secs) {
            return reject(&event.id, format!("invalid: {e}"));
        }

        let Some(handler) = self.resolve_handler(event.kind) else {
            return reject(&event.id, "kind not accepted".to_string());
        };

        let engine = self.engine.clone();
        let task_event = event.clone();
        let outcome = tokio::task::spawn_blocking(move || -> Result<(), String> {
            handler(engine.as_ref(), &task_event).map_err(|e| e.to_string())?;
            relay_events::store_event(engine.as_ref(), &task_event).map_err(|_| "error storing event".to_string())
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                crate::notifier::notify(&self.subscriptions, &self.connections, &event).await;
                ServerEnvelope::Ok { event_id: event.id, accepted: true, message: String::new() }
            }
            Ok(Err(message)) => {
                tracing::warn!(event_id = %event.id, reason = %message, "event rejected");
                reject(&event.id, message)
            }
            Err(e) => {
                tracing::error!(event_id = %event.id, error = %e, "storage task panicked");
                reject(&event.id, "internal error".to_string())
            }
        }
    }

    /// Validate an AUTH event against the connection's issued challenge.
    /// Returns whether the connection should be marked authenticated, and
    /// the `OK` response to send.
    #[must_use]
    pub fn handle_auth(&self, event: Event, challenge: &str, now: i64, auth_freshness_secs: i64) -> (bool, ServerEnvelope) {
        match crate::auth::validate(&event, challenge, now, auth_freshness_secs) {
            Ok(()) => (true, ServerEnvelope::Ok { event_id: event.id, accepted: true, message: String::new() }),
            Err(e) => (false, reject(&event.id, e.to_string())),
        }
    }

    /// Flush every currently-matching stored event for `filters`, then
    /// register the subscription. Flush-before-register means only events
    /// stored strictly after this call's `EOSE` reach the client via the
    /// notifier — the mechanism SPEC_FULL §4.7 chooses to avoid duplicates.
    pub async fn handle_req(&self, conn: ConnId, sub_id: String, filters: Vec<Filter>) -> Vec<ServerEnvelope> {
        let engine = self.engine.clone();
        let query_filters = filters.clone();
        let flushed = tokio::task::spawn_blocking(move || {
            let mut events = Vec::new();
            for filter in &query_filters {
                if let Ok(found) = relay_events::query_events(engine.as_ref(), filter) {
                    events.extend(found);
                }
            }
            events
        })
        .await
        .unwrap_or_default();

        let mut out: Vec<ServerEnvelope> =
            flushed.into_iter().map(|event| ServerEnvelope::Event { sub_id: sub_id.clone(), event }).collect();
        self.subscriptions.insert(conn, sub_id.clone(), filters).await;
        out.push(ServerEnvelope::Eose { sub_id });
        out
    }

    pub async fn handle_close(&self, conn: ConnId, sub_id: String) -> ServerEnvelope {
        self.subscriptions.remove(conn, &sub_id).await;
        ServerEnvelope::Closed { sub_id, reason: String::new() }
    }

    /// Same query as `handle_req`, but reports a count instead of flushing
    /// events, and does not register a subscription.
    pub async fn handle_count(&self, sub_id: String, filters: Vec<Filter>) -> ServerEnvelope {
        let engine = self.engine.clone();
        let count = tokio::task::spawn_blocking(move || {
            filters.iter().filter_map(|filter| relay_events::query_events(engine.as_ref(), filter).ok()).map(|events| events.len()).sum()
        })
        .await
        .unwrap_or(0usize);
        ServerEnvelope::Count { sub_id, count }
    }

    pub async fn teardown(&self, conn: ConnId) {
        self.subscriptions.remove_connection(conn).await;
        self.connections.remove(conn);
    }
}

fn reject(event_id: &str, message: String) -> ServerEnvelope {
    ServerEnvelope::Ok { event_id: event_id.to_string(), accepted: false, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::memory::InMemoryEngine;
    use secp256k1::{Keypair, Secp256k1};

    fn signed_event(created_at: i64, kind: u64) -> Event {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let keypair = Keypair::new(&secp, &mut rng);
        let (xonly, _) = keypair.x_only_public_key();
        let pubkey = hex::encode(xonly.serialize());

        let mut event =
            Event { id: String::new(), pubkey, created_at, kind, tags: vec![], content: "hello".into(), sig: String::new() };
        event.id = event.canonical_id();
        let id_bytes: [u8; 32] = hex::decode(&event.id).unwrap().try_into().unwrap();
        let sig = secp.sign_schnorr(&id_bytes, &keypair);
        event.sig = hex::encode(sig.as_ref());
        event
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(InMemoryEngine::new()), Mode::Unlimited, HandlerRegistry::new(), 300)
    }

    #[tokio::test]
    async fn accepts_and_stores_a_fresh_event() {
        let dispatcher = dispatcher();
        let event = signed_event(1000, 1);
        let response = dispatcher.handle_event(event.clone(), 1000).await;
        assert_eq!(response, ServerEnvelope::Ok { event_id: event.id.clone(), accepted: true, message: String::new() });

        let responses = dispatcher.handle_req(1, "sub1".into(), vec![Filter { kinds: vec![1], ..Filter::default() }]).await;
        assert!(responses.iter().any(|r| matches!(r, ServerEnvelope::Event { event: e, .. } if e.id == event.id)));
    }

    #[tokio::test]
    async fn rejects_a_stale_event() {
        let dispatcher = dispatcher();
        let event = signed_event(1000, 1);
        let response = dispatcher.handle_event(event.clone(), 1000 + 10_000).await;
        assert!(matches!(response, ServerEnvelope::Ok { accepted: false, .. }));
    }

    #[tokio::test]
    async fn smart_mode_rejects_unregistered_kinds() {
        let dispatcher =
            Dispatcher::new(Arc::new(InMemoryEngine::new()), Mode::Smart, HandlerRegistry::new(), 300);
        let event = signed_event(1000, 42);
        let response = dispatcher.handle_event(event.clone(), 1000).await;
        assert_eq!(
            response,
            ServerEnvelope::Ok { event_id: event.id, accepted: false, message: "kind not accepted".to_string() }
        );
    }

    #[tokio::test]
    async fn req_flushes_then_registers_the_subscription() {
        let dispatcher = dispatcher();
        let event = signed_event(1000, 1);
        dispatcher.handle_event(event.clone(), 1000).await;

        let responses =
            dispatcher.handle_req(1, "sub1".into(), vec![Filter { kinds: vec![1], ..Filter::default() }]).await;
        assert_eq!(responses.len(), 2); // one EVENT, one EOSE
        assert!(matches!(responses.last(), Some(ServerEnvelope::Eose { .. })));
    }

    #[tokio::test]
    async fn count_reports_matches_without_registering_a_subscription() {
        let dispatcher = dispatcher();
        dispatcher.handle_event(signed_event(1000, 1), 1000).await;
        dispatcher.handle_event(signed_event(1000, 1), 1000).await;

        let response = dispatcher.handle_count("sub1".into(), vec![Filter { kinds: vec![1], ..Filter::default() }]).await;
        assert_eq!(response, ServerEnvelope::Count { sub_id: "sub1".into(), count: 2 });

        let hits = dispatcher.subscriptions.matching(&signed_event(1000, 1)).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn close_deregisters_the_subscription() {
        let dispatcher = dispatcher();
        dispatcher.handle_req(1, "sub1".into(), vec![Filter::default()]).await;
        let response = dispatcher.handle_close(1, "sub1".into()).await;
        assert_eq!(response, ServerEnvelope::Closed { sub_id: "sub1".into(), reason: String::new() });
    }
}
