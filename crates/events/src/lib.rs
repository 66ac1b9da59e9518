//! Canonical event encoding (NIP-01 style), freshness checks, and the
//! kind-partitioned storage that backs `query_events`.

mod filter;

use std::collections::HashSet;

use relay_store::{Engine, WriteBatch};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use filter::Filter;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventError {
    #[error("query requires at least one kind")]
    MissingKinds,
    #[error("event id does not match its canonical hash")]
    IdMismatch,
    #[error("signature does not verify against pubkey")]
    BadSignature,
    #[error("event creation date is too far off from the current time ({0})")]
    NotFresh(String),
    #[error("event encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] relay_store::StoreError),
}

pub type EventResult<T> = Result<T, EventError>;

/// A tag is an ordered sequence of strings; its first element is the tag name.
pub type Tag = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: u64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// SHA-256 of the NIP-01 canonical JSON array
    /// `[0, pubkey, created_at, kind, tags, content]`.
    #[must_use]
    pub fn canonical_id(&self) -> String {
        let canonical = serde_json::json!([0, self.pubkey, self.created_at, self.kind, self.tags, self.content]);
        let bytes = serde_json::to_vec(&canonical).expect("json arrays of strings never fail to serialize");
        hex::encode(relay_crypto::sha256(&bytes))
    }

    /// The id matches its canonical hash and the signature verifies
    /// against the declared pubkey.
    pub fn verify_integrity(&self) -> EventResult<()> {
        if self.canonical_id() != self.id {
            return Err(EventError::IdMismatch);
        }
        let pubkey = relay_crypto::PublicKey::from_hex(&self.pubkey).map_err(|_| EventError::BadSignature)?;
        let sig = relay_crypto::Signature::from_hex(&self.sig).map_err(|_| EventError::BadSignature)?;
        let id_bytes: [u8; 32] = hex::decode(&self.id)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or(EventError::BadSignature)?;
        if relay_crypto::verify(pubkey, &id_bytes, sig) {
            Ok(())
        } else {
            Err(EventError::BadSignature)
        }
    }

    fn tree(&self) -> String {
        format!("kind:{}", self.kind)
    }
}

/// Checks `created_at` is within `window_secs` of `now` (seconds since
/// epoch), inclusive at the boundary.
pub fn check_freshness(created_at: i64, now: i64, window_secs: i64) -> EventResult<()> {
    let delta = (now - created_at).abs();
    if delta > window_secs {
        return Err(EventError::NotFresh(format!("{delta}s outside a {window_secs}s window")));
    }
    Ok(())
}

/// Persist `event` under its kind tree. Idempotent: storing the same id
/// twice writes the same bytes again.
pub fn store_event(engine: &dyn Engine, event: &Event) -> EventResult<()> {
    let bytes = serde_json::to_vec(event)?;
    let mut batch = WriteBatch::new();
    batch.put(event.tree(), event.id.clone().into_bytes(), bytes);
    engine.commit(batch)?;
    tracing::debug!(id = %event.id, kind = event.kind, "event stored");
    Ok(())
}

/// Remove an event by id from its kind tree. The caller must know the
/// kind — there is no secondary id→kind index.
pub fn delete_event(engine: &dyn Engine, event_id: &str, kind: u64) -> EventResult<()> {
    let mut batch = WriteBatch::new();
    batch.delete(format!("kind:{kind}"), event_id.as_bytes());
    engine.commit(batch)?;
    tracing::debug!(id = event_id, kind, "event deleted");
    Ok(())
}

/// Evaluate `filter` against every event in the listed kind trees,
/// sorted by `created_at` descending (ties broken by id ascending) and
/// truncated to `filter.limit` when it is non-zero.
pub fn query_events(engine: &dyn Engine, filter: &Filter) -> EventResult<Vec<Event>> {
    if filter.kinds.is_empty() {
        return Err(EventError::MissingKinds);
    }

    let mut matches = Vec::new();
    for kind in &filter.kinds {
        let tree = format!("kind:{kind}");
        for (_, value) in engine.collect(&tree)? {
            let Ok(event) = serde_json::from_slice::<Event>(&value) else {
                continue;
            };
            if filter.matches(&event) {
                matches.push(event);
            }
        }
    }

    matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    if filter.limit > 0 && matches.len() > filter.limit {
        matches.truncate(filter.limit);
    }

    Ok(matches)
}

#[must_use]
pub(crate) fn tags_contain_any(tags: &[Tag], name: char, values: &HashSet<String>) -> bool {
    tags.iter()
        .any(|tag| tag.first().is_some_and(|n| n.len() == 1 && n.starts_with(name)) && tag[1..].iter().any(|v| values.contains(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_store::memory::InMemoryEngine;
    use secp256k1::{Keypair, Secp256k1};

    fn signed_event(created_at: i64, kind: u64, content: &str) -> Event {
        let secp = Secp256k1::new();
        let mut rng = rand::thread_rng();
        let keypair = Keypair::new(&secp, &mut rng);
        let (xonly, _) = keypair.x_only_public_key();
        let pubkey = hex::encode(xonly.serialize());

        let mut event = Event {
            id: String::new(),
            pubkey,
            created_at,
            kind,
            tags: vec![],
            content: content.to_string(),
            sig: String::new(),
        };
        event.id = event.canonical_id();
        let id_bytes: [u8; 32] = hex::decode(&event.id).unwrap().try_into().unwrap();
        let sig = secp.sign_schnorr(&id_bytes, &keypair);
        event.sig = hex::encode(sig.as_ref());
        event
    }

    #[test]
    fn store_then_query_round_trips_a_kind_one_event() {
        let engine = InMemoryEngine::new();
        let event = signed_event(1_700_000_000, 1, "hello");
        store_event(&engine, &event).unwrap();

        let filter = Filter { kinds: vec![1], ids: vec![event.id.clone()], ..Filter::default() };
        let results = query_events(&engine, &filter).unwrap();
        assert_eq!(results, vec![event]);
    }

    #[test]
    fn verify_integrity_accepts_a_genuine_signature() {
        let event = signed_event(1_700_000_000, 1, "hello");
        assert!(event.verify_integrity().is_ok());
    }

    #[test]
    fn verify_integrity_rejects_a_tampered_content() {
        let mut event = signed_event(1_700_000_000, 1, "hello");
        event.content = "tampered".to_string();
        assert!(matches!(event.verify_integrity(), Err(EventError::IdMismatch)));
    }

    #[test]
    fn freshness_boundary_is_inclusive() {
        assert!(check_freshness(1000, 1300, 300).is_ok());
        assert!(check_freshness(1000, 1301, 300).is_err());
    }

    #[test]
    fn empty_kinds_is_rejected() {
        let engine = InMemoryEngine::new();
        let filter = Filter::default();
        assert!(matches!(query_events(&engine, &filter), Err(EventError::MissingKinds)));
    }

    #[test]
    fn query_sorts_descending_and_truncates_to_limit() {
        let engine = InMemoryEngine::new();
        let older = signed_event(100, 1, "older");
        let newer = signed_event(200, 1, "newer");
        store_event(&engine, &older).unwrap();
        store_event(&engine, &newer).unwrap();

        let filter = Filter { kinds: vec![1], limit: 1, ..Filter::default() };
        let results = query_events(&engine, &filter).unwrap();
        assert_eq!(results, vec![newer]);
    }

    #[test]
    fn delete_then_query_no_longer_returns_the_event() {
        let engine = InMemoryEngine::new();
        let event = signed_event(100, 1, "gone soon");
        store_event(&engine, &event).unwrap();
        delete_event(&engine, &event.id, 1).unwrap();

        let filter = Filter { kinds: vec![1], ids: vec![event.id.clone()], ..Filter::default() };
        assert!(query_events(&engine, &filter).unwrap().is_empty());
    }

    #[test]
    fn storing_the_same_id_twice_is_idempotent() {
        let engine = InMemoryEngine::new();
        let event = signed_event(100, 1, "same");
        store_event(&engine, &event).unwrap();
        store_event(&engine, &event).unwrap();

        let filter = Filter { kinds: vec![1], ids: vec![event.id.clone()], ..Filter::default() };
        assert_eq!(query_events(&engine, &filter).unwrap().len(), 1);
    }
}
