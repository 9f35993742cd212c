//! The single-writer intake loop.
//!
//! Events and document reloads flow through one mpsc queue with one
//! consumer, so a reload can never interleave with an in-flight event and
//! each mutation completes (mutate + rehash + diff) before anything else
//! touches the tree. Broadcast-worthy outcomes go to the debouncer.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use trellis::{LiveSession, SessionDocument};
use wallproto::{Broadcast, EventResult, SessionEvent};

/// One unit of write work.
#[derive(Debug)]
pub enum Intake {
    /// Incremental mutation notification from the host observer.
    Event(SessionEvent),
    /// Freshly parsed export, posted by the host glue on save.
    Document(SessionDocument),
}

pub async fn run_intake(
    mut rx: mpsc::Receiver<Intake>,
    session: Arc<Mutex<LiveSession>>,
    out: mpsc::Sender<Broadcast>,
) {
    while let Some(intake) = rx.recv().await {
        match intake {
            Intake::Document(doc) => handle_document(&session, &out, doc).await,
            Intake::Event(event) => handle_event(&session, &out, event).await,
        }
    }
    debug!("intake channel closed, writer loop ending");
}

async fn handle_document(
    session: &Arc<Mutex<LiveSession>>,
    out: &mpsc::Sender<Broadcast>,
    doc: SessionDocument,
) {
    let mut session = session.lock().await;
    match session.load(doc) {
        Ok(outcome) => match outcome.diff {
            // Reload: reconcile subscribers with a structural diff.
            Some(diff) => {
                if !diff.is_empty() {
                    send(out, Broadcast::DiffUpdate {
                        changes: diff.to_changes(),
                    })
                    .await;
                }
            }
            // First load: nothing to diff against, sync everyone.
            None => send_full_tree(&session, out).await,
        },
        // Fail fast, keep the previous tree, tell nobody downstream.
        Err(err) => warn!(error = %err, "malformed session document rejected"),
    }
}

async fn handle_event(
    session: &Arc<Mutex<LiveSession>>,
    out: &mpsc::Sender<Broadcast>,
    event: SessionEvent,
) {
    let mut session = session.lock().await;
    match session.process_event(&event) {
        EventResult::AppliedStructural { changes } => {
            send(out, Broadcast::DiffUpdate { changes }).await;
        }
        EventResult::AppliedState { state } => {
            send(out, Broadcast::state_event(state)).await;
        }
        EventResult::Skipped { reason } => {
            debug!(path = %event.path, seq = event.seq, %reason, "event skipped");
        }
        EventResult::Ignored => {
            debug!(path = %event.path, "event ignored");
        }
        EventResult::Stale { gap } => {
            // Too many lost events to trust increments: tell subscribers,
            // rebuild from the last saved export, then resync everyone.
            send(out, Broadcast::Error {
                error: "sequence_gap".to_string(),
                details: serde_json::json!({ "gap": gap, "seq": event.seq }),
            })
            .await;
            match session.reload_fallback() {
                Ok(diff) => {
                    info!(gap, "fallback reload after sequence gap");
                    if !diff.is_empty() {
                        send(out, Broadcast::DiffUpdate {
                            changes: diff.to_changes(),
                        })
                        .await;
                    }
                    send_full_tree(&session, out).await;
                }
                Err(err) => warn!(error = %err, "fallback reload failed"),
            }
        }
    }
}

async fn send_full_tree(session: &LiveSession, out: &mpsc::Sender<Broadcast>) {
    if let Some(tree) = session.serialize() {
        send(out, Broadcast::FullTree {
            tree,
            source_path: session.source_path().to_string(),
        })
        .await;
    }
}

async fn send(out: &mpsc::Sender<Broadcast>, broadcast: Broadcast) {
    if out.send(broadcast).await.is_err() {
        debug!("broadcast pipeline closed, dropping message");
    }
}
