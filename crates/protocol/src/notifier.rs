//! Fans a freshly stored event out to every subscription whose filters
//! match it (§4.6). Delivery is best-effort per subscriber: a dead or
//! backed-up connection is dropped from both registries, but nothing else
//! is affected.

use relay_codec::ServerEnvelope;
use relay_events::Event;

use crate::connection::ConnectionRegistry;
use crate::subscription::SubscriptionRegistry;

pub async fn notify(subscriptions: &SubscriptionRegistry, connections: &ConnectionRegistry, event: &Event) {
    for (conn_id, sub_id) in subscriptions.matching(event).await {
        let envelope = ServerEnvelope::Event { sub_id: sub_id.clone(), event: event.clone() };
        if !connections.send(conn_id, envelope) {
            tracing::debug!(conn_id, sub_id, "dropping subscriber: send failed");
            subscriptions.remove(conn_id, &sub_id).await;
            connections.remove(conn_id);
        }
    }
}
