//! Kind-specific policy handlers and the registry that looks them up by
//! kind in `Smart` mode (§4.5). A handler's job is the policy check only —
//! storing the event is always `relay_events::store_event`, invoked once
//! by the dispatcher after the handler accepts.
//!
//! An explicit `HandlerRegistry`, built at startup and owned by the
//! dispatcher, replaces the process-wide handler map the distilled spec's
//! source used (SPEC_FULL §9) — this keeps it free of global mutable state
//! and lets each test build its own registry.

use std::collections::HashMap;

use relay_events::{Event, Filter};
use relay_store::Engine;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("kind not accepted")]
    WrongKind,
}

pub type KindHandler = fn(&dyn Engine, &Event) -> Result<(), PolicyError>;

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u64, KindHandler>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: u64, handler: KindHandler) -> &mut Self {
        self.handlers.insert(kind, handler);
        self
    }

    #[must_use]
    pub fn get(&self, kind: u64) -> Option<KindHandler> {
        self.handlers.get(&kind).copied()
    }

    /// A registry preloaded with the handlers this crate ships: kind 3
    /// (contact lists) and kind 5 (deletions). Callers in `Smart` mode
    /// typically start from this and layer their own registrations on top.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(3, kind3_contact_list);
        registry.register(5, kind5_deletion);
        registry
    }
}

/// Accepts unconditionally. Used for every kind in `Unlimited` mode, and as
/// the fallback for any kind a `Smart`-mode registry doesn't recognize
/// would otherwise be routed to — except unrecognized kinds are rejected
/// outright in `Smart` mode (SPEC_FULL §4.5), so this is only ever reached
/// via the `Unlimited` path.
pub fn universal(_engine: &dyn Engine, _event: &Event) -> Result<(), PolicyError> {
    Ok(())
}

/// Kind-3 contact lists: accepted additively. Last-write-wins for a reader
/// is left entirely to `query_events`'s descending `created_at` ordering —
/// no prior kind-3 event from the same pubkey is touched here.
pub fn kind3_contact_list(_engine: &dyn Engine, _event: &Event) -> Result<(), PolicyError> {
    Ok(())
}

/// Kind-5 deletions: for every `e`-tagged id paired with a `k`-tagged kind
/// on the same event, delete that id from that kind's tree — but only if
/// the stored event's author matches the deletion event's author. A
/// deletion naming an id with no matching `k` tag is a no-op: without
/// knowing the kind there is no tree to look the id up in, and scanning
/// every kind tree to find it would make deletion cost proportional to the
/// whole store.
pub fn kind5_deletion(engine: &dyn Engine, event: &Event) -> Result<(), PolicyError> {
    let targets: Vec<&str> = event
        .tags
        .iter()
        .filter(|t| t.first().is_some_and(|n| n == "e"))
        .filter_map(|t| t.get(1))
        .map(String::as_str)
        .collect();
    let kinds: Vec<u64> = event
        .tags
        .iter()
        .filter(|t| t.first().is_some_and(|n| n == "k"))
        .filter_map(|t| t.get(1))
        .filter_map(|v| v.parse().ok())
        .collect();

    for &target_id in &targets {
        for &kind in &kinds {
            let filter = Filter { kinds: vec![kind], ids: vec![target_id.to_string()], ..Filter::default() };
            let Ok(matches) = relay_events::query_events(engine, &filter) else {
                continue;
            };
            if let Some(target) = matches.into_iter().next() {
                if target.pubkey == event.pubkey {
                    let _ = relay_events::delete_event(engine, target_id, kind);
                }
            }
        }
    }

    Ok(())
}
