//! Shared server state and pipeline wiring.

use crate::debounce::Debouncer;
use crate::intake::{run_intake, Intake};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use trellis::LiveSession;
use wallconf::WallConfig;
use wallproto::Broadcast;

/// Queue depth for inbound events/documents. The intake loop is the single
/// writer, so this is just burst absorption.
const INTAKE_QUEUE: usize = 1024;

/// Fan-out channel capacity; slow subscribers lag past this and resync.
const OUTBOUND_QUEUE: usize = 256;

/// Shared handles for web handlers.
#[derive(Clone)]
pub struct AppState {
    /// The live tree behind its single writer lock. Handlers take it only
    /// for read snapshots; all writes go through the intake queue.
    pub session: Arc<Mutex<LiveSession>>,
    /// Producer side of the single-writer intake queue.
    pub intake_tx: mpsc::Sender<Intake>,
    /// Fan-out channel subscribers attach to.
    pub outbound_tx: broadcast::Sender<Broadcast>,
}

/// Build the processing pipeline: intake loop -> debouncer -> fan-out.
/// Returns the shared state; the two worker tasks run until their input
/// channels close.
pub fn spawn_pipeline(config: &WallConfig) -> AppState {
    let session = Arc::new(Mutex::new(LiveSession::new(
        config.engine.gap_threshold,
        config.engine.cache_capacity,
    )));
    let (intake_tx, intake_rx) = mpsc::channel(INTAKE_QUEUE);
    let (raw_tx, raw_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let (outbound_tx, _) = broadcast::channel(OUTBOUND_QUEUE);

    tokio::spawn(run_intake(intake_rx, Arc::clone(&session), raw_tx));
    tokio::spawn(
        Debouncer::new(
            raw_rx,
            outbound_tx.clone(),
            Duration::from_millis(config.engine.debounce_ms),
        )
        .run(),
    );

    AppState {
        session,
        intake_tx,
        outbound_tx,
    }
}
