//! The `axum` transport: a single route (`/`) that is either a NIP-11
//! relay-info document (content-negotiated on `Accept`) or a websocket
//! upgrade into the per-connection frame loop — mirroring the original
//! reference's middleware-based dispatch (SPEC_FULL §4.8).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use relay_codec::{ClientEnvelope, ServerEnvelope};
use relay_config::{ConfigFile, RelayInfo};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::connection::next_conn_id;
use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<ConfigFile>,
}

#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), relay_info_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Short-circuits to the NIP-11 document when the client asks for
/// `Accept: application/nostr+json`; otherwise passes through to the
/// websocket route.
async fn relay_info_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let wants_relay_info = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/nostr+json"));

    if wants_relay_info {
        let info = RelayInfo::from(state.config.as_ref());
        return Json(info).into_response();
    }

    next.run(request).await
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = next_conn_id();
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEnvelope>();
    state.dispatcher.connections.register(conn_id, outbound_tx.clone());

    let write_task = tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            if sink.send(Message::Text(envelope.to_text())).await.is_err() {
                break;
            }
        }
    });

    let challenge = crate::auth::generate_challenge();
    if outbound_tx.send(ServerEnvelope::Auth { challenge: challenge.clone() }).is_err() {
        write_task.abort();
        return;
    }

    let mut authenticated = false;
    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(raw) = message else {
            if matches!(message, Message::Close(_)) {
                break;
            }
            continue;
        };

        let now = now_secs();
        match ClientEnvelope::parse(&raw) {
            Ok(ClientEnvelope::Event(event)) => {
                let response = state.dispatcher.handle_event(event, now).await;
                let _ = outbound_tx.send(response);
            }
            Ok(ClientEnvelope::Auth(event)) => {
                let (ok, response) =
                    state.dispatcher.handle_auth(event, &challenge, now, state.config.auth_freshness_secs);
                authenticated = ok;
                let _ = outbound_tx.send(response);
            }
            Ok(ClientEnvelope::Req { sub_id, filters }) => {
                for response in state.dispatcher.handle_req(conn_id, sub_id, filters).await {
                    let _ = outbound_tx.send(response);
                }
            }
            Ok(ClientEnvelope::Close { sub_id }) => {
                let response = state.dispatcher.handle_close(conn_id, sub_id).await;
                let _ = outbound_tx.send(response);
            }
            Ok(ClientEnvelope::Count { sub_id, filters }) => {
                if !authenticated {
                    let _ = outbound_tx.send(ServerEnvelope::Closed {
                        sub_id,
                        reason: "auth-required: COUNT requires authentication".to_string(),
                    });
                    continue;
                }
                let response = state.dispatcher.handle_count(sub_id, filters).await;
                let _ = outbound_tx.send(response);
            }
            Err(e) => {
                tracing::debug!(conn_id, error = %e, "malformed frame");
                let _ = outbound_tx.send(ServerEnvelope::Notice { message: e.to_string() });
            }
        }
    }

    state.dispatcher.teardown(conn_id).await;
    write_task.abort();
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// Bind, probing subsequent ports on conflict when `config.probe_port` is
/// set (SPEC_FULL §9: off by default, since the reference's
/// always-probe behavior is surprising in production).
pub async fn bind_with_probe(config: &ConfigFile) -> std::io::Result<TcpListener> {
    if !config.probe_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        return TcpListener::bind(addr).await;
    }

    let mut port = config.port;
    loop {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && port < u16::MAX => {
                tracing::warn!(port, "port in use, probing next port");
                port += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub async fn serve(config: Arc<ConfigFile>, dispatcher: Arc<Dispatcher>) -> eyre::Result<()> {
    let state = AppState { dispatcher, config: config.clone() };
    let app = router(state);
    let listener = bind_with_probe(&config).await?;
    tracing::info!(addr = %listener.local_addr()?, "relay listening");
    axum::serve(listener, app).await?;
    Ok(())
}
