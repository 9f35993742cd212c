//! Event-driven incremental updates to the live tree.
//!
//! One event at a time, already serialized and gap-checked by the caller.
//! Every handler follows the same pattern: locate the target by index
//! (never by name - scene names may be empty or duplicate), mutate in
//! place, then either re-stamp hashes along the path to the root and emit
//! a structural diff, or skip hashing entirely and emit a lightweight
//! state change. A target that no longer (or does not yet) exist is stale
//! host noise: log, skip, move on.
//!
//! Scene add/remove own the index-shifting protocol for the ordered
//! scene/clip-slot collections. Shifted collections are maintained by
//! correct-position insertion only; nothing here ever re-sorts children
//! after the fact, and scene reorder notifications are deliberately
//! ignored (no stable scene identity exists to process them safely).

use crate::cache::{CacheKey, NodeCache};
use crate::diff::{snapshot_subtree, AttrChange, TreeDiff};
use crate::hash::{hash_tree, rehash_upward};
use crate::node::{ids, Node, Tree};
use tracing::debug;
use wallproto::{ArgError, AttrValue, EventResult, NodeKind, SessionEvent, StateChange};

/// The closed set of handled mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    TrackRenamed,
    TrackColorChanged,
    /// Boolean mixer state: mute, arm, solo.
    MixerFlag(&'static str),
    /// Continuous mixer state: volume, pan.
    MixerLevel(&'static str),
    DeviceAdded,
    DeviceRemoved,
    DeviceParamChanged,
    SceneAdded,
    SceneRemoved,
    SceneRenamed,
    SceneReordered,
    ClipSlotChanged,
    ClipSlotPlayingChanged,
    TransportTempoChanged,
    TransportPlayChanged,
}

/// Dispatch table: symbolic event path -> handler kind. Adding an event
/// kind means adding a row here and a handler arm below.
const DISPATCH: &[(&str, EventKind)] = &[
    ("track-renamed", EventKind::TrackRenamed),
    ("track-color-changed", EventKind::TrackColorChanged),
    ("track-mute-changed", EventKind::MixerFlag("is_muted")),
    ("track-arm-changed", EventKind::MixerFlag("is_armed")),
    ("track-solo-changed", EventKind::MixerFlag("is_soloed")),
    ("track-volume-changed", EventKind::MixerLevel("volume")),
    ("track-pan-changed", EventKind::MixerLevel("pan")),
    ("device-added", EventKind::DeviceAdded),
    ("device-removed", EventKind::DeviceRemoved),
    ("device-param-changed", EventKind::DeviceParamChanged),
    ("scene-added", EventKind::SceneAdded),
    ("scene-removed", EventKind::SceneRemoved),
    ("scene-renamed", EventKind::SceneRenamed),
    ("scene-reordered", EventKind::SceneReordered),
    ("clip-slot-changed", EventKind::ClipSlotChanged),
    ("clip-slot-playing-changed", EventKind::ClipSlotPlayingChanged),
    ("transport-tempo-changed", EventKind::TransportTempoChanged),
    ("transport-play-changed", EventKind::TransportPlayChanged),
];

/// True if `path` is a known event path (handled or deliberately ignored).
pub fn is_known_path(path: &str) -> bool {
    DISPATCH.iter().any(|(p, _)| *p == path)
}

fn lookup(path: &str) -> Option<EventKind> {
    DISPATCH
        .iter()
        .find(|(p, _)| *p == path)
        .map(|(_, kind)| *kind)
}

/// Apply one event to the live tree. Never fails: malformed or stale
/// events degrade to `Skipped`, unknown paths to `Ignored`.
pub fn apply_event(tree: &mut Tree, cache: &mut NodeCache, event: &SessionEvent) -> EventResult {
    let Some(kind) = lookup(&event.path) else {
        debug!(path = %event.path, "unhandled event path, ignoring");
        return EventResult::Ignored;
    };

    let outcome = match kind {
        EventKind::SceneReordered => {
            // Scenes have no identity apart from their index; reorder
            // notifications can arrive before the add/remove events of the
            // same host operation and double-shift the grid. Add/remove
            // already do all necessary shifting.
            debug!("scene reorder notification ignored");
            Ok(EventResult::Ignored)
        }
        EventKind::TrackRenamed => track_attr_changed(tree, cache, event, "name"),
        EventKind::TrackColorChanged => track_attr_changed(tree, cache, event, "color"),
        EventKind::MixerFlag(attr) => mixer_changed(tree, cache, event, attr, true),
        EventKind::MixerLevel(attr) => mixer_changed(tree, cache, event, attr, false),
        EventKind::DeviceAdded => device_added(tree, cache, event),
        EventKind::DeviceRemoved => device_removed(tree, cache, event),
        EventKind::DeviceParamChanged => device_param_changed(tree, cache, event),
        EventKind::SceneAdded => scene_added(tree, event),
        EventKind::SceneRemoved => scene_removed(tree, event),
        EventKind::SceneRenamed => scene_renamed(tree, cache, event),
        EventKind::ClipSlotChanged => clip_slot_changed(tree, cache, event),
        EventKind::ClipSlotPlayingChanged => clip_slot_playing_changed(tree, cache, event),
        EventKind::TransportTempoChanged => transport_changed(tree, event, "tempo"),
        EventKind::TransportPlayChanged => transport_changed(tree, event, "is_playing"),
    };

    match outcome {
        Ok(result) => result,
        Err(err) => {
            debug!(path = %event.path, error = %err, "malformed event arguments, skipping");
            EventResult::Skipped {
                reason: err.to_string(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Lookups (index-based, cache-assisted)
// ---------------------------------------------------------------------------

fn find_track(tree: &Tree, cache: &mut NodeCache, index: usize) -> Option<String> {
    let version = tree.root().hash.clone();
    if let Some(id) = cache.get(&CacheKey::Track(index), &version) {
        if node_has_index(tree, &id, "index", index) {
            return Some(id);
        }
    }
    let id = tree
        .children_of_kind(tree.root_id(), NodeKind::Track)
        .find(|n| n.index_attr("index") == Some(index))
        .map(|n| n.id.clone())?;
    cache.insert(CacheKey::Track(index), id.clone(), &version);
    Some(id)
}

fn find_scene(tree: &Tree, cache: &mut NodeCache, index: usize) -> Option<String> {
    let version = tree.root().hash.clone();
    if let Some(id) = cache.get(&CacheKey::Scene(index), &version) {
        if node_has_index(tree, &id, "index", index) {
            return Some(id);
        }
    }
    let id = tree
        .children_of_kind(tree.root_id(), NodeKind::Scene)
        .find(|n| n.index_attr("index") == Some(index))
        .map(|n| n.id.clone())?;
    cache.insert(CacheKey::Scene(index), id.clone(), &version);
    Some(id)
}

fn find_slot(
    tree: &Tree,
    cache: &mut NodeCache,
    track: usize,
    scene: usize,
) -> Option<String> {
    let version = tree.root().hash.clone();
    if let Some(id) = cache.get(&CacheKey::Slot(track, scene), &version) {
        if node_has_index(tree, &id, "scene_index", scene) {
            return Some(id);
        }
    }
    let track_id = find_track(tree, cache, track)?;
    let id = tree
        .children_of_kind(&track_id, NodeKind::ClipSlot)
        .find(|n| n.index_attr("scene_index") == Some(scene))
        .map(|n| n.id.clone())?;
    cache.insert(CacheKey::Slot(track, scene), id.clone(), &version);
    Some(id)
}

/// Devices are located positionally: the d-th Device child of the track.
fn find_device(tree: &Tree, cache: &mut NodeCache, track: usize, device: usize) -> Option<String> {
    let version = tree.root().hash.clone();
    if let Some(id) = cache.get(&CacheKey::Device(track, device), &version) {
        if tree.contains(&id) {
            return Some(id);
        }
    }
    let track_id = find_track(tree, cache, track)?;
    let id = tree
        .children_of_kind(&track_id, NodeKind::Device)
        .nth(device)
        .map(|n| n.id.clone())?;
    cache.insert(CacheKey::Device(track, device), id.clone(), &version);
    Some(id)
}

fn node_has_index(tree: &Tree, id: &str, key: &str, expected: usize) -> bool {
    tree.get(id)
        .map(|n| n.index_attr(key) == Some(expected))
        .unwrap_or(false)
}

fn scene_count(tree: &Tree) -> usize {
    tree.children_of_kind(tree.root_id(), NodeKind::Scene).count()
}

// ---------------------------------------------------------------------------
// Shared result plumbing
// ---------------------------------------------------------------------------

fn skipped(reason: impl Into<String>) -> Result<EventResult, ArgError> {
    let reason = reason.into();
    debug!(%reason, "event target not found, skipping");
    Ok(EventResult::Skipped { reason })
}

fn state_result(event: &SessionEvent) -> Result<EventResult, ArgError> {
    Ok(EventResult::AppliedState {
        state: StateChange {
            event_path: event.path.clone(),
            args: event.args.clone(),
            seq_num: event.seq,
            timestamp: event.timestamp,
        },
    })
}

fn structural(diff: TreeDiff) -> Result<EventResult, ArgError> {
    Ok(EventResult::AppliedStructural {
        changes: diff.to_changes(),
    })
}

/// Set attributes on one node, rehash its path to the root, and report a
/// single `modified` entry with full before/after snapshots.
fn modify_structural(
    tree: &mut Tree,
    id: &str,
    updates: &[(&str, AttrValue)],
) -> Result<EventResult, ArgError> {
    let Some(node) = tree.get(id) else {
        return skipped(format!("node {} vanished mid-update", id));
    };
    let kind = node.kind;
    let old_attrs = node.attrs.clone();
    if let Some(node) = tree.get_mut(id) {
        for (key, value) in updates {
            node.attrs.insert(key.to_string(), value.clone());
        }
    }
    rehash_upward(tree, id);

    let new_attrs = tree.get(id).map(|n| n.attrs.clone()).unwrap_or_default();
    structural(TreeDiff {
        modified: vec![AttrChange {
            id: id.to_string(),
            kind,
            path: tree.id_path(id),
            old_attrs,
            new_attrs,
        }],
        ..Default::default()
    })
}

/// Set attributes without touching hashes (state mutation).
fn set_attrs(tree: &mut Tree, id: &str, updates: &[(&str, AttrValue)]) {
    if let Some(node) = tree.get_mut(id) {
        for (key, value) in updates {
            node.attrs.insert(key.to_string(), value.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Track and mixer
// ---------------------------------------------------------------------------

fn track_attr_changed(
    tree: &mut Tree,
    cache: &mut NodeCache,
    event: &SessionEvent,
    key: &str,
) -> Result<EventResult, ArgError> {
    let index = event.index_arg(0)?;
    let value = event.str_arg(1)?.to_string();
    let Some(track_id) = find_track(tree, cache, index) else {
        return skipped(format!("track {} not found", index));
    };
    modify_structural(tree, &track_id, &[(key, AttrValue::from(value))])
}

fn mixer_changed(
    tree: &mut Tree,
    cache: &mut NodeCache,
    event: &SessionEvent,
    attr: &str,
    boolean: bool,
) -> Result<EventResult, ArgError> {
    let index = event.index_arg(0)?;
    let value = if boolean {
        AttrValue::Bool(event.bool_arg(1)?)
    } else {
        AttrValue::Float(event.f64_arg(1)?)
    };
    let Some(track_id) = find_track(tree, cache, index) else {
        return skipped(format!("track {} not found", index));
    };
    let Some(mixer_id) = tree
        .child_of_kind(&track_id, NodeKind::Mixer)
        .map(|n| n.id.clone())
    else {
        return skipped(format!("track {} has no mixer", index));
    };
    set_attrs(tree, &mixer_id, &[(attr, value)]);
    state_result(event)
}

// ---------------------------------------------------------------------------
// Devices and parameters
// ---------------------------------------------------------------------------

fn device_added(
    tree: &mut Tree,
    cache: &mut NodeCache,
    event: &SessionEvent,
) -> Result<EventResult, ArgError> {
    let track = event.index_arg(0)?;
    let device = event.index_arg(1)?;
    let name = event.str_arg(2)?.to_string();
    let class_name = event.args.get(3).and_then(|v| v.as_str()).map(str::to_string);

    let Some(track_id) = find_track(tree, cache, track) else {
        return skipped(format!("track {} not found", track));
    };

    // Insert at the requested ordinal within the device run; past-the-end
    // ordinals land after the last device (before the clip-slot run).
    let device_positions: Vec<usize> = tree
        .children_of(&track_id)
        .iter()
        .enumerate()
        .filter(|(_, id)| tree.get(id).map(|n| n.kind == NodeKind::Device).unwrap_or(false))
        .map(|(pos, _)| pos)
        .collect();
    let position = device_positions.get(device).copied().unwrap_or_else(|| {
        device_positions.last().map(|p| p + 1).unwrap_or_else(|| {
            tree.children_of(&track_id)
                .iter()
                .position(|id| {
                    tree.get(id)
                        .map(|n| n.kind == NodeKind::ClipSlot)
                        .unwrap_or(false)
                })
                .unwrap_or_else(|| tree.children_of(&track_id).len())
        })
    });

    let device_id = tree.alloc_id(|n| ids::device(track, n), device);
    let mut attrs = wallproto::AttrMap::new();
    attrs.insert("name".to_string(), AttrValue::from(name));
    attrs.insert("is_active".to_string(), AttrValue::Bool(true));
    if let Some(class_name) = class_name {
        attrs.insert("class_name".to_string(), AttrValue::from(class_name));
    }
    if let Err(err) = tree.insert_child(
        &track_id,
        Node::new(NodeKind::Device, device_id.clone(), attrs),
        position,
    ) {
        return skipped(format!("device insert failed: {}", err));
    }
    rehash_upward(tree, &device_id);

    let mut diff = TreeDiff::default();
    snapshot_subtree(tree, &device_id, &mut diff.added);
    structural(diff)
}

fn device_removed(
    tree: &mut Tree,
    cache: &mut NodeCache,
    event: &SessionEvent,
) -> Result<EventResult, ArgError> {
    let track = event.index_arg(0)?;
    let device = event.index_arg(1)?;
    let Some(device_id) = find_device(tree, cache, track, device) else {
        return skipped(format!("device {} on track {} not found", device, track));
    };
    let parent = tree
        .get(&device_id)
        .and_then(|n| n.parent.clone())
        .unwrap_or_else(|| tree.root_id().to_string());

    let mut diff = TreeDiff::default();
    snapshot_subtree(tree, &device_id, &mut diff.removed);
    tree.remove_subtree(&device_id);
    rehash_upward(tree, &parent);
    structural(diff)
}

fn device_param_changed(
    tree: &mut Tree,
    cache: &mut NodeCache,
    event: &SessionEvent,
) -> Result<EventResult, ArgError> {
    let track = event.index_arg(0)?;
    let device = event.index_arg(1)?;
    let param = event.index_arg(2)?;
    let value = event.f64_arg(3)?;

    let Some(device_id) = find_device(tree, cache, track, device) else {
        return skipped(format!("device {} on track {} not found", device, track));
    };
    let Some(param_id) = tree
        .children_of_kind(&device_id, NodeKind::Parameter)
        .nth(param)
        .map(|n| n.id.clone())
    else {
        return skipped(format!(
            "parameter {} on device {} track {} not found",
            param, device, track
        ));
    };
    // Too frequent to rehash; the tree still always holds the latest value
    // so a full-tree sync never serves a stale one.
    set_attrs(tree, &param_id, &[("value", AttrValue::Float(value))]);
    state_result(event)
}

// ---------------------------------------------------------------------------
// Scenes: the index-shifting protocol
// ---------------------------------------------------------------------------

/// Shift the `index`/`scene_index` attributes of every scene and slot at or
/// past `from` by `delta`, recording modified entries. Shared by add and
/// remove, which are exact inverses of each other.
fn shift_scene_indices(tree: &mut Tree, from: usize, delta: i64, diff: &mut TreeDiff) {
    let mut shifted: Vec<(String, &'static str, usize)> = Vec::new();

    for scene in tree.children_of_kind(tree.root_id(), NodeKind::Scene) {
        if let Some(index) = scene.index_attr("index") {
            if index >= from {
                shifted.push((scene.id.clone(), "index", index));
            }
        }
    }
    let track_ids: Vec<String> = tree
        .children_of_kind(tree.root_id(), NodeKind::Track)
        .map(|n| n.id.clone())
        .collect();
    for track_id in &track_ids {
        for slot in tree.children_of_kind(track_id, NodeKind::ClipSlot) {
            if let Some(index) = slot.index_attr("scene_index") {
                if index >= from {
                    shifted.push((slot.id.clone(), "scene_index", index));
                }
            }
        }
    }

    for (id, key, index) in shifted {
        let Some(node) = tree.get(&id) else { continue };
        let kind = node.kind;
        let old_attrs = node.attrs.clone();
        let new_index = (index as i64 + delta).max(0) as usize;
        set_attrs(tree, &id, &[(key, AttrValue::from(new_index))]);
        diff.modified.push(AttrChange {
            id: id.clone(),
            kind,
            path: tree.id_path(&id),
            old_attrs,
            new_attrs: tree.get(&id).map(|n| n.attrs.clone()).unwrap_or_default(),
        });
    }
}

/// Ordered insert position for a slot with `scene_index` on a track: just
/// before the first existing slot with a greater scene index, or at the end
/// of the children list if none exists. Never sorted afterward.
fn slot_insert_position(tree: &Tree, track_id: &str, scene_index: usize) -> usize {
    tree.children_of(track_id)
        .iter()
        .position(|id| {
            tree.get(id)
                .map(|n| {
                    n.kind == NodeKind::ClipSlot
                        && n.index_attr("scene_index")
                            .map(|s| s > scene_index)
                            .unwrap_or(false)
                })
                .unwrap_or(false)
        })
        .unwrap_or_else(|| tree.children_of(track_id).len())
}

fn empty_slot_attrs(track: usize, scene: usize) -> wallproto::AttrMap {
    let mut attrs = wallproto::AttrMap::new();
    attrs.insert("track_index".to_string(), AttrValue::from(track));
    attrs.insert("scene_index".to_string(), AttrValue::from(scene));
    attrs.insert("has_clip".to_string(), AttrValue::Bool(false));
    attrs.insert("has_stop_button".to_string(), AttrValue::Bool(true));
    attrs.insert("is_playing".to_string(), AttrValue::Bool(false));
    attrs.insert("is_triggered".to_string(), AttrValue::Bool(false));
    attrs
}

fn scene_added(tree: &mut Tree, event: &SessionEvent) -> Result<EventResult, ArgError> {
    let k = event.index_arg(0)?;
    let name = event
        .args
        .get(1)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let count = scene_count(tree);
    if k > count {
        return skipped(format!("scene insert at {} past scene count {}", k, count));
    }

    let mut diff = TreeDiff::default();

    // 1+2. Make room: shift every scene and slot at or past k up by one.
    shift_scene_indices(tree, k, 1, &mut diff);

    // 3. The new scene. Scenes lead the root's children, so list position
    // equals scene index.
    let scene_id = tree.alloc_id(ids::scene, k);
    let root_id = tree.root_id().to_string();
    let mut attrs = wallproto::AttrMap::new();
    attrs.insert("index".to_string(), AttrValue::from(k));
    attrs.insert("name".to_string(), AttrValue::from(name));
    if let Err(err) = tree.insert_child(
        &root_id,
        Node::new(NodeKind::Scene, scene_id.clone(), attrs),
        k,
    ) {
        return skipped(format!("scene insert failed: {}", err));
    }

    // 4. One fresh empty slot per track, placed by ordered insertion.
    let tracks: Vec<(String, usize)> = tree
        .children_of_kind(tree.root_id(), NodeKind::Track)
        .filter_map(|n| n.index_attr("index").map(|i| (n.id.clone(), i)))
        .collect();
    let mut added_ids = vec![scene_id];
    for (track_id, track_index) in tracks {
        let slot_id = tree.alloc_id(|n| ids::clip_slot(track_index, n), k);
        let position = slot_insert_position(tree, &track_id, k);
        if let Err(err) = tree.insert_child(
            &track_id,
            Node::new(
                NodeKind::ClipSlot,
                slot_id.clone(),
                empty_slot_attrs(track_index, k),
            ),
            position,
        ) {
            return skipped(format!("slot insert failed: {}", err));
        }
        added_ids.push(slot_id);
    }

    // 5. A scene shift touches every track's slot row; restamp the tree.
    hash_tree(tree);

    for id in added_ids {
        snapshot_subtree(tree, &id, &mut diff.added);
    }
    structural(diff)
}

fn scene_removed(tree: &mut Tree, event: &SessionEvent) -> Result<EventResult, ArgError> {
    let k = event.index_arg(0)?;

    let Some(scene_id) = tree
        .children_of_kind(tree.root_id(), NodeKind::Scene)
        .find(|n| n.index_attr("index") == Some(k))
        .map(|n| n.id.clone())
    else {
        return skipped(format!("scene {} not found", k));
    };

    let mut diff = TreeDiff::default();

    // Remove the scene and every track's slot at k (clips go with them).
    snapshot_subtree(tree, &scene_id, &mut diff.removed);
    tree.remove_subtree(&scene_id);

    let track_ids: Vec<String> = tree
        .children_of_kind(tree.root_id(), NodeKind::Track)
        .map(|n| n.id.clone())
        .collect();
    for track_id in &track_ids {
        let slot_id = tree
            .children_of_kind(track_id, NodeKind::ClipSlot)
            .find(|n| n.index_attr("scene_index") == Some(k))
            .map(|n| n.id.clone());
        if let Some(slot_id) = slot_id {
            snapshot_subtree(tree, &slot_id, &mut diff.removed);
            tree.remove_subtree(&slot_id);
        }
    }

    // Close the gap: shift everything past k down by one.
    shift_scene_indices(tree, k + 1, -1, &mut diff);

    hash_tree(tree);
    structural(diff)
}

fn scene_renamed(
    tree: &mut Tree,
    cache: &mut NodeCache,
    event: &SessionEvent,
) -> Result<EventResult, ArgError> {
    let k = event.index_arg(0)?;
    let name = event.str_arg(1)?.to_string();
    let Some(scene_id) = find_scene(tree, cache, k) else {
        return skipped(format!("scene {} not found", k));
    };
    modify_structural(tree, &scene_id, &[("name", AttrValue::from(name))])
}

// ---------------------------------------------------------------------------
// Clip slots
// ---------------------------------------------------------------------------

fn clip_slot_changed(
    tree: &mut Tree,
    cache: &mut NodeCache,
    event: &SessionEvent,
) -> Result<EventResult, ArgError> {
    let track = event.index_arg(0)?;
    let scene = event.index_arg(1)?;
    let has_clip = event.args.get(2).and_then(|v| v.as_bool());
    let has_stop_button = event.args.get(3).and_then(|v| v.as_bool());
    let color = event.args.get(4).and_then(|v| v.as_str()).map(str::to_string);

    if scene >= scene_count(tree) {
        // A slot for a scene that does not exist would break the dense
        // matrix; treat it as stale noise until the scene-added arrives.
        return skipped(format!("slot ({}, {}) references missing scene", track, scene));
    }
    let Some(track_id) = find_track(tree, cache, track) else {
        return skipped(format!("track {} not found", track));
    };

    let mut diff = TreeDiff::default();
    let existing = find_slot(tree, cache, track, scene);
    let slot_id = match existing {
        // Dedup path: the slot for this coordinate already exists, update
        // it in place. Never create a second slot for the same pair.
        Some(slot_id) => {
            let Some(node) = tree.get(&slot_id) else {
                return skipped(format!("slot ({}, {}) vanished mid-update", track, scene));
            };
            let kind = node.kind;
            let old_attrs = node.attrs.clone();
            let mut updates: Vec<(&str, AttrValue)> = Vec::new();
            if let Some(has_clip) = has_clip {
                updates.push(("has_clip", AttrValue::Bool(has_clip)));
            }
            if let Some(has_stop_button) = has_stop_button {
                updates.push(("has_stop_button", AttrValue::Bool(has_stop_button)));
            }
            if let Some(color) = &color {
                updates.push(("color", AttrValue::from(color.clone())));
            }
            set_attrs(tree, &slot_id, &updates);
            diff.modified.push(AttrChange {
                id: slot_id.clone(),
                kind,
                path: tree.id_path(&slot_id),
                old_attrs,
                new_attrs: tree.get(&slot_id).map(|n| n.attrs.clone()).unwrap_or_default(),
            });
            slot_id
        }
        None => {
            let slot_id = tree.alloc_id(|n| ids::clip_slot(track, n), scene);
            let mut attrs = empty_slot_attrs(track, scene);
            if let Some(has_clip) = has_clip {
                attrs.insert("has_clip".to_string(), AttrValue::Bool(has_clip));
            }
            if let Some(has_stop_button) = has_stop_button {
                attrs.insert("has_stop_button".to_string(), AttrValue::Bool(has_stop_button));
            }
            if let Some(color) = &color {
                attrs.insert("color".to_string(), AttrValue::from(color.clone()));
            }
            let position = slot_insert_position(tree, &track_id, scene);
            if let Err(err) = tree.insert_child(
                &track_id,
                Node::new(NodeKind::ClipSlot, slot_id.clone(), attrs),
                position,
            ) {
                return skipped(format!("slot insert failed: {}", err));
            }
            snapshot_subtree(tree, &slot_id, &mut diff.added);
            slot_id
        }
    };

    // Keep the at-most-one-clip invariant in sync with has_clip. Rehash
    // from the deepest touched node so a fresh clip gets stamped too.
    let mut rehash_from = slot_id.clone();
    let clip_child = tree.child_of_kind(&slot_id, NodeKind::Clip).map(|n| n.id.clone());
    match (has_clip, clip_child) {
        (Some(true), None) => {
            let clip_id = tree.alloc_id(|n| ids::clip(track, n), scene);
            let mut attrs = wallproto::AttrMap::new();
            attrs.insert("name".to_string(), AttrValue::from(""));
            attrs.insert("clip_type".to_string(), AttrValue::from("midi"));
            if let Err(err) = tree.insert_child(
                &slot_id,
                Node::new(NodeKind::Clip, clip_id.clone(), attrs),
                0,
            ) {
                return skipped(format!("clip insert failed: {}", err));
            }
            snapshot_subtree(tree, &clip_id, &mut diff.added);
            rehash_from = clip_id;
        }
        (Some(false), Some(clip_id)) => {
            snapshot_subtree(tree, &clip_id, &mut diff.removed);
            tree.remove_subtree(&clip_id);
        }
        _ => {}
    }

    rehash_upward(tree, &rehash_from);
    structural(diff)
}

fn clip_slot_playing_changed(
    tree: &mut Tree,
    cache: &mut NodeCache,
    event: &SessionEvent,
) -> Result<EventResult, ArgError> {
    let track = event.index_arg(0)?;
    let scene = event.index_arg(1)?;
    let is_playing = event.bool_arg(2)?;
    let is_triggered = event.args.get(3).and_then(|v| v.as_bool());

    let Some(slot_id) = find_slot(tree, cache, track, scene) else {
        return skipped(format!("slot ({}, {}) not found", track, scene));
    };
    let mut updates = vec![("is_playing", AttrValue::Bool(is_playing))];
    if let Some(is_triggered) = is_triggered {
        updates.push(("is_triggered", AttrValue::Bool(is_triggered)));
    }
    set_attrs(tree, &slot_id, &updates);
    state_result(event)
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

fn transport_changed(
    tree: &mut Tree,
    event: &SessionEvent,
    attr: &str,
) -> Result<EventResult, ArgError> {
    let value = if attr == "is_playing" {
        AttrValue::Bool(event.bool_arg(0)?)
    } else {
        AttrValue::Float(event.f64_arg(0)?)
    };
    let root_id = tree.root_id().to_string();
    set_attrs(tree, &root_id, &[(attr, value)]);
    state_result(event)
}
