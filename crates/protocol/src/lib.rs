//! The per-connection protocol state machine: AUTH handshake, envelope
//! routing by tag (and, in `Smart` mode, by event kind), the subscription
//! registry, and the notifier that fans stored events out to matching
//! subscriptions.
//!
//! This crate owns the `axum` websocket transport and the NIP-11-style
//! relay-info HTTP endpoint — the only part of the core that talks
//! directly to a network socket. Everything it does on top of a frame is
//! delegated to `relay-codec` (parsing) and `relay-events`/`relay-dag`
//! (storage).

mod auth;
mod binary;
mod connection;
mod dispatcher;
mod handlers;
mod http;
mod notifier;
mod subscription;

pub use auth::AuthError;
pub use binary::{serve as serve_dag_transport, TransportError};
pub use connection::{next_conn_id, ConnId, ConnectionRegistry};
pub use dispatcher::Dispatcher;
pub use handlers::{HandlerRegistry, KindHandler, PolicyError};
pub use http::{bind_with_probe, router, serve};
pub use subscription::SubscriptionRegistry;
