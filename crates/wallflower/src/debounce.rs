//! Broadcaster-side coalescing of high-frequency state events.
//!
//! Fader drags and parameter sweeps arrive far faster than subscribers
//! need them. State events accumulate for a short window and coalesce
//! last-value-wins per key; structural messages (diffs, full trees,
//! errors) are never held and never dropped - they flush whatever is
//! pending first so subscribers always see state in order.
//!
//! Only delivery is throttled. The tree itself already holds the latest
//! value, so a subscriber connecting mid-drag gets the current position
//! from its full-tree sync rather than a stale debounced one.

use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::debug;
use wallproto::Broadcast;

pub struct Debouncer {
    rx: mpsc::Receiver<Broadcast>,
    tx: broadcast::Sender<Broadcast>,
    window: Duration,
}

impl Debouncer {
    pub fn new(
        rx: mpsc::Receiver<Broadcast>,
        tx: broadcast::Sender<Broadcast>,
        window: Duration,
    ) -> Self {
        Self { rx, tx, window }
    }

    pub async fn run(mut self) {
        // Pending state events in arrival order, newest value per key.
        let mut pending: Vec<(String, Broadcast)> = Vec::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let sleep_until = deadline.unwrap_or_else(far_future);
            tokio::select! {
                message = self.rx.recv() => {
                    match message {
                        Some(msg @ Broadcast::StateEvent { .. }) => {
                            if self.window.is_zero() {
                                self.forward(msg);
                                continue;
                            }
                            let key = state_key(&msg);
                            match pending.iter_mut().find(|(k, _)| *k == key) {
                                Some((_, slot)) => *slot = msg,
                                None => pending.push((key, msg)),
                            }
                            if deadline.is_none() {
                                deadline = Some(Instant::now() + self.window);
                            }
                        }
                        Some(msg) => {
                            // Structural: drain pending state first so the
                            // outbound stream stays ordered, then pass through.
                            self.flush(&mut pending);
                            deadline = None;
                            self.forward(msg);
                        }
                        None => {
                            self.flush(&mut pending);
                            debug!("debouncer input closed");
                            return;
                        }
                    }
                }
                _ = tokio::time::sleep_until(sleep_until), if deadline.is_some() => {
                    self.flush(&mut pending);
                    deadline = None;
                }
            }
        }
    }

    fn flush(&self, pending: &mut Vec<(String, Broadcast)>) {
        for (_, msg) in pending.drain(..) {
            self.forward(msg);
        }
    }

    fn forward(&self, msg: Broadcast) {
        // Err means no subscribers right now; that is fine.
        if self.tx.send(msg).is_err() {
            debug!("no subscribers connected, message not fanned out");
        }
    }
}

/// Coalescing key: event path plus every argument except the trailing
/// value, so volume moves on different tracks never swallow each other.
fn state_key(msg: &Broadcast) -> String {
    match msg {
        Broadcast::StateEvent { event_path, args, .. } => {
            let prefix_len = args.len().saturating_sub(1);
            let mut key = event_path.clone();
            for arg in &args[..prefix_len] {
                key.push('|');
                key.push_str(&arg.to_string());
            }
            key
        }
        _ => String::new(),
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wallproto::{ArgValue, StateChange};

    fn volume_event(track: i64, value: f64, seq: u64) -> Broadcast {
        Broadcast::state_event(StateChange {
            event_path: "track-volume-changed".to_string(),
            args: vec![ArgValue::Int(track), ArgValue::Float(value)],
            seq_num: seq,
            timestamp: 0.0,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_state_coalesces_last_value_wins() {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = broadcast::channel(64);
        tokio::spawn(Debouncer::new(in_rx, out_tx, Duration::from_millis(50)).run());

        for (i, value) in [0.1, 0.2, 0.3].iter().enumerate() {
            in_tx.send(volume_event(0, *value, i as u64 + 1)).await.unwrap();
        }
        // A different track's fader in the same window survives separately.
        in_tx.send(volume_event(1, 0.9, 4)).await.unwrap();

        let first = out_rx.recv().await.unwrap();
        let second = out_rx.recv().await.unwrap();
        let values: Vec<(i64, f64)> = [first, second]
            .iter()
            .map(|msg| match msg {
                Broadcast::StateEvent { args, .. } => (
                    args[0].as_index().unwrap() as i64,
                    args[1].as_f64().unwrap(),
                ),
                other => panic!("unexpected message {:?}", other),
            })
            .collect();
        assert!(values.contains(&(0, 0.3)), "latest value won: {:?}", values);
        assert!(values.contains(&(1, 0.9)));
        assert_eq!(values.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn structural_flushes_pending_and_passes_through() {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = broadcast::channel(64);
        tokio::spawn(Debouncer::new(in_rx, out_tx, Duration::from_millis(50)).run());

        in_tx.send(volume_event(0, 0.5, 1)).await.unwrap();
        in_tx
            .send(Broadcast::DiffUpdate { changes: vec![] })
            .await
            .unwrap();

        // Pending state lands before the structural message.
        let first = out_rx.recv().await.unwrap();
        assert!(matches!(first, Broadcast::StateEvent { .. }));
        let second = out_rx.recv().await.unwrap();
        assert!(matches!(second, Broadcast::DiffUpdate { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_window_disables_coalescing() {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = broadcast::channel(64);
        tokio::spawn(Debouncer::new(in_rx, out_tx, Duration::ZERO).run());

        in_tx.send(volume_event(0, 0.1, 1)).await.unwrap();
        in_tx.send(volume_event(0, 0.2, 2)).await.unwrap();

        assert!(matches!(out_rx.recv().await.unwrap(), Broadcast::StateEvent { .. }));
        assert!(matches!(out_rx.recv().await.unwrap(), Broadcast::StateEvent { .. }));
    }
}
