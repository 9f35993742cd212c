//! HTTP and WebSocket endpoints.
//!
//! - `GET /stream` upgrades to a WebSocket subscriber: a full-tree sync on
//!   connect, then every broadcast as it flows out of the debouncer.
//! - `POST /event` and `POST /document` are the host-glue edge; both just
//!   enqueue onto the single-writer intake queue.
//! - `GET /tree` and `GET /health` are read-only snapshots for debugging.

use crate::intake::Intake;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use trellis::SessionDocument;
use wallproto::{Broadcast, SessionEvent};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(serve_root))
        .route("/health", get(health))
        .route("/tree", get(current_tree))
        .route("/event", post(ingest_event))
        .route("/document", post(ingest_document))
        .route("/stream", get(stream_ws))
        .with_state(state)
}

/// Serve root discovery endpoint
async fn serve_root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Wallflower",
        "version": env!("CARGO_PKG_VERSION"),
        "links": {
            "stream": "/stream",
            "tree": "/tree",
            "health": "/health",
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(serde_json::json!({
        "status": "ok",
        "loaded": session.is_loaded(),
        "stale": session.is_stale(),
        "root_hash": session.root_hash().map(|h| h.to_string()),
        "subscribers": state.outbound_tx.receiver_count(),
    }))
}

/// Current full tree, for debugging and non-streaming consumers.
async fn current_tree(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    match session.serialize() {
        Some(tree) => Json(serde_json::json!({
            "tree": tree,
            "source_path": session.source_path(),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no document loaded" })),
        )
            .into_response(),
    }
}

async fn ingest_event(
    State(state): State<AppState>,
    Json(event): Json<SessionEvent>,
) -> impl IntoResponse {
    enqueue(&state, Intake::Event(event)).await
}

async fn ingest_document(
    State(state): State<AppState>,
    Json(doc): Json<SessionDocument>,
) -> impl IntoResponse {
    enqueue(&state, Intake::Document(doc)).await
}

async fn enqueue(state: &AppState, intake: Intake) -> impl IntoResponse {
    match state.intake_tx.send(intake).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(serde_json::json!({ "queued": true }))),
        Err(_) => {
            warn!("intake queue closed, rejecting submission");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "queued": false })),
            )
        }
    }
}

/// WebSocket subscriber endpoint.
async fn stream_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscriber(socket, state))
}

/// One task per subscriber: a send failure here terminates this
/// subscriber alone, never the fan-out.
async fn handle_subscriber(socket: WebSocket, state: AppState) {
    info!("subscriber connected");
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing published in between is lost;
    // the worst case is a redundant diff after the full tree.
    let mut rx = state.outbound_tx.subscribe();

    let full_tree = {
        let session = state.session.lock().await;
        session.serialize().map(|tree| Broadcast::FullTree {
            tree,
            source_path: session.source_path().to_string(),
        })
    };
    if let Some(msg) = full_tree {
        if sender.send(Message::Text(msg.to_json().into())).await.is_err() {
            debug!("subscriber went away during initial sync");
            return;
        }
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Ok(msg) => {
                    if sender.send(Message::Text(msg.to_json().into())).await.is_err() {
                        debug!("subscriber send failed, closing this stream");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // This subscriber fell too far behind for diffs to be
                    // trustworthy; resync it with a fresh full tree.
                    warn!(skipped, "subscriber lagged, resyncing with full tree");
                    let full_tree = {
                        let session = state.session.lock().await;
                        session.serialize().map(|tree| Broadcast::FullTree {
                            tree,
                            source_path: session.source_path().to_string(),
                        })
                    };
                    match full_tree {
                        Some(msg) => {
                            if sender.send(Message::Text(msg.to_json().into())).await.is_err() {
                                break;
                            }
                        }
                        None => continue,
                    }
                }
                Err(RecvError::Closed) => break,
            },
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("subscriber closed the stream");
                    break;
                }
                Some(Err(err)) => {
                    debug!(error = %err, "subscriber socket error");
                    break;
                }
                // Subscribers have nothing to say; pings are handled by axum.
                Some(Ok(_)) => {}
            },
        }
    }
    info!("subscriber disconnected");
}
