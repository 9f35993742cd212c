//! End-to-end pipeline tests: intake queue -> live session -> debouncer ->
//! fan-out, without the HTTP layer in the way.

use wallconf::WallConfig;
use wallflower::{spawn_pipeline, Intake};
use wallproto::{ArgValue, Broadcast, ChangeKind, SessionEvent};

use trellis::{SceneData, SessionDocument, TrackData};

fn demo_doc() -> SessionDocument {
    SessionDocument {
        source_path: "/sets/pipeline.als".to_string(),
        tracks: vec![
            TrackData {
                name: "Bass".to_string(),
                ..Default::default()
            },
            TrackData {
                name: "Drums".to_string(),
                ..Default::default()
            },
        ],
        scenes: vec![SceneData::default(), SceneData::default()],
        ..Default::default()
    }
}

fn ev(path: &str, args: Vec<ArgValue>, seq: u64) -> Intake {
    Intake::Event(SessionEvent::new(path, args, seq, 0.0))
}

#[tokio::test(start_paused = true)]
async fn first_load_broadcasts_full_tree() {
    let state = spawn_pipeline(&WallConfig::default());
    let mut rx = state.outbound_tx.subscribe();

    state
        .intake_tx
        .send(Intake::Document(demo_doc()))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        Broadcast::FullTree { tree, source_path } => {
            assert_eq!(source_path, "/sets/pipeline.als");
            assert_eq!(tree.id, "project");
            assert_eq!(tree.children.len(), 4); // 2 scenes + 2 tracks
        }
        other => panic!("expected FULL_TREE, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn structural_event_broadcasts_diff() {
    let state = spawn_pipeline(&WallConfig::default());
    let mut rx = state.outbound_tx.subscribe();

    state
        .intake_tx
        .send(Intake::Document(demo_doc()))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await.unwrap(), Broadcast::FullTree { .. }));

    state
        .intake_tx
        .send(ev(
            "track-renamed",
            vec![ArgValue::Int(0), ArgValue::from("Sub")],
            1,
        ))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        Broadcast::DiffUpdate { changes } => {
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].change, ChangeKind::Modified);
            assert_eq!(changes[0].node_id, "track_0");
        }
        other => panic!("expected DIFF_UPDATE, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn rapid_state_events_coalesce() {
    let state = spawn_pipeline(&WallConfig::default());
    let mut rx = state.outbound_tx.subscribe();

    state
        .intake_tx
        .send(Intake::Document(demo_doc()))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await.unwrap(), Broadcast::FullTree { .. }));

    for (seq, value) in [(1u64, 0.2), (2, 0.4), (3, 0.6)] {
        state
            .intake_tx
            .send(ev(
                "track-volume-changed",
                vec![ArgValue::Int(0), ArgValue::Float(value)],
                seq,
            ))
            .await
            .unwrap();
    }

    // One coalesced STATE_EVENT with the final fader position.
    match rx.recv().await.unwrap() {
        Broadcast::StateEvent { event_path, args, .. } => {
            assert_eq!(event_path, "track-volume-changed");
            assert_eq!(args[1].as_f64(), Some(0.6));
        }
        other => panic!("expected STATE_EVENT, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn sequence_gap_reports_error_then_resyncs() {
    let state = spawn_pipeline(&WallConfig::default());
    let mut rx = state.outbound_tx.subscribe();

    state
        .intake_tx
        .send(Intake::Document(demo_doc()))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await.unwrap(), Broadcast::FullTree { .. }));

    state
        .intake_tx
        .send(ev(
            "track-renamed",
            vec![ArgValue::Int(0), ArgValue::from("Renamed")],
            1,
        ))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await.unwrap(), Broadcast::DiffUpdate { .. }));

    // Forty-odd lost events: staleness error, reconciliation diff (the
    // reload reverts the rename), then a fresh full tree.
    state
        .intake_tx
        .send(ev(
            "track-renamed",
            vec![ArgValue::Int(0), ArgValue::from("Lost")],
            99,
        ))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        Broadcast::Error { error, details } => {
            assert_eq!(error, "sequence_gap");
            assert_eq!(details["gap"], 97);
        }
        other => panic!("expected ERROR, got {:?}", other),
    }
    match rx.recv().await.unwrap() {
        Broadcast::DiffUpdate { changes } => {
            assert!(changes.iter().any(|c| c.node_id == "track_0"));
        }
        other => panic!("expected DIFF_UPDATE, got {:?}", other),
    }
    assert!(matches!(rx.recv().await.unwrap(), Broadcast::FullTree { .. }));

    // The session is usable again.
    let session = state.session.lock().await;
    assert!(!session.is_stale());
    assert!(session.is_loaded());
}

#[tokio::test(start_paused = true)]
async fn malformed_document_keeps_previous_tree() {
    let state = spawn_pipeline(&WallConfig::default());
    let mut rx = state.outbound_tx.subscribe();

    state
        .intake_tx
        .send(Intake::Document(demo_doc()))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await.unwrap(), Broadcast::FullTree { .. }));
    let hash_before = state.session.lock().await.root_hash().cloned();

    let mut bad = demo_doc();
    bad.tracks[0].clip_slots.push(trellis::SlotData {
        scene_index: -3,
        ..Default::default()
    });
    state.intake_tx.send(Intake::Document(bad)).await.unwrap();

    // Rejected without a broadcast; a later good event still flows.
    state
        .intake_tx
        .send(ev(
            "scene-added",
            vec![ArgValue::Int(0)],
            1,
        ))
        .await
        .unwrap();
    assert!(matches!(rx.recv().await.unwrap(), Broadcast::DiffUpdate { .. }));
    assert_ne!(state.session.lock().await.root_hash().cloned(), hash_before);
}
