//! End-to-end flows through the LiveSession facade: load, mutate via
//! events, reconcile via reload, and replay diffs.

use trellis::{
    apply, diff, ClipData, ClipType, DeviceData, LiveSession, ParamData, SceneData,
    SessionDocument, SlotData, TrackData,
};
use wallproto::{ArgValue, ChangeKind, EventResult, SessionEvent};

fn demo_doc() -> SessionDocument {
    SessionDocument {
        source_path: "/sets/liveset.als".to_string(),
        tempo: 124.0,
        is_playing: false,
        tracks: vec![
            TrackData {
                name: "Bass".to_string(),
                devices: vec![DeviceData {
                    name: "Operator".to_string(),
                    parameters: vec![ParamData {
                        name: "Filter Freq".to_string(),
                        value: 0.6,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                clip_slots: vec![SlotData {
                    scene_index: 0,
                    has_clip: true,
                    clip: Some(ClipData {
                        name: "Bassline".to_string(),
                        clip_type: ClipType::Midi,
                        end_time: 8.0,
                        is_looped: true,
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            },
            TrackData {
                name: "Drums".to_string(),
                ..Default::default()
            },
            TrackData {
                name: "Keys".to_string(),
                ..Default::default()
            },
        ],
        scenes: vec![
            SceneData {
                name: "Intro".to_string(),
                ..Default::default()
            },
            SceneData {
                name: "Drop".to_string(),
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

fn ev(path: &str, args: Vec<ArgValue>, seq: u64) -> SessionEvent {
    SessionEvent::new(path, args, seq, 1722945600.0)
}

#[test]
fn event_stream_then_reload_reconciles() {
    let mut session = LiveSession::default();
    session.load(demo_doc()).unwrap();
    let initial_hash = session.root_hash().cloned().unwrap();

    // A burst of ordinary edits.
    let results = [
        session.process_event(&ev(
            "track-renamed",
            vec![ArgValue::Int(2), ArgValue::from("Pads")],
            1,
        )),
        session.process_event(&ev(
            "track-volume-changed",
            vec![ArgValue::Int(0), ArgValue::Float(0.5)],
            2,
        )),
        session.process_event(&ev("scene-added", vec![ArgValue::Int(1)], 3)),
        session.process_event(&ev(
            "clip-slot-changed",
            vec![ArgValue::Int(1), ArgValue::Int(1), ArgValue::Bool(true)],
            4,
        )),
    ];
    assert!(matches!(results[0], EventResult::AppliedStructural { .. }));
    assert!(matches!(results[1], EventResult::AppliedState { .. }));
    assert!(matches!(results[2], EventResult::AppliedStructural { .. }));
    assert!(matches!(results[3], EventResult::AppliedStructural { .. }));

    assert_ne!(session.root_hash().cloned().unwrap(), initial_hash);

    // The host saves; the new export reflects some of the edits.
    let mut saved = demo_doc();
    saved.tracks[2].name = "Pads".to_string();
    saved.scenes.insert(1, SceneData::default());
    let outcome = session.load(saved).unwrap();
    let reload_diff = outcome.diff.unwrap();

    // Reload renormalizes incremental ids to positional ones; the diff
    // carries whatever moved, and the tree ends consistent.
    assert!(!reload_diff.is_empty());
    let wire = session.serialize().unwrap();
    assert_eq!(
        wire.children
            .iter()
            .filter(|c| c.node_type == wallproto::NodeKind::Scene)
            .count(),
        3
    );
}

#[test]
fn full_reload_diff_replays_onto_old_tree() {
    let old = trellis::build(&demo_doc()).unwrap();

    let mut changed = demo_doc();
    changed.tracks[0].name = "Sub Bass".to_string();
    changed.tracks.remove(2);
    changed.scenes.push(SceneData {
        name: "Outro".to_string(),
        ..Default::default()
    });
    let new = trellis::build(&changed).unwrap();

    let d = diff(&old, &new);
    let replayed = apply(&old, &d).unwrap();
    assert_eq!(replayed.root().hash, new.root().hash);
}

#[test]
fn structural_changes_flow_to_wire_entries() {
    let mut session = LiveSession::default();
    session.load(demo_doc()).unwrap();

    let result = session.process_event(&ev(
        "device-added",
        vec![ArgValue::Int(1), ArgValue::Int(0), ArgValue::from("Reverb")],
        1,
    ));
    let EventResult::AppliedStructural { changes } = result else {
        panic!("expected structural result");
    };
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change, ChangeKind::Added);
    assert_eq!(changes[0].node_kind, wallproto::NodeKind::Device);
    assert!(changes[0].path.starts_with("project/track_1/"));
    assert_eq!(
        changes[0].new_value.as_ref().unwrap()["name"],
        ArgValue::from("Reverb")
    );
}

#[test]
fn duplicate_events_do_not_reapply() {
    let mut session = LiveSession::default();
    session.load(demo_doc()).unwrap();

    let add = ev("scene-added", vec![ArgValue::Int(0)], 1);
    assert!(matches!(
        session.process_event(&add),
        EventResult::AppliedStructural { .. }
    ));
    // The transport redelivers the same notification.
    assert!(matches!(
        session.process_event(&add),
        EventResult::Skipped { .. }
    ));

    let wire = session.serialize().unwrap();
    let scene_count = wire
        .children
        .iter()
        .filter(|c| c.node_type == wallproto::NodeKind::Scene)
        .count();
    assert_eq!(scene_count, 3);
}

#[test]
fn stale_session_recovers_through_fallback() {
    let mut session = LiveSession::default();
    session.load(demo_doc()).unwrap();

    session.process_event(&ev("transport-play-changed", vec![ArgValue::Bool(true)], 1));
    let result = session.process_event(&ev(
        "track-renamed",
        vec![ArgValue::Int(0), ArgValue::from("Lost")],
        50,
    ));
    assert!(matches!(result, EventResult::Stale { gap: 48 }));
    assert!(session.is_stale());

    session.reload_fallback().unwrap();
    assert!(!session.is_stale());
    // Processing resumes against the fresh tree.
    let result = session.process_event(&ev(
        "track-renamed",
        vec![ArgValue::Int(0), ArgValue::from("Bass 2")],
        51,
    ));
    assert!(matches!(result, EventResult::AppliedStructural { .. }));
}
