//! Build a typed tree from the flat session export.
//!
//! The host glue decompresses and parses the project file, then posts a
//! flat extraction: tracks enriched with device/slot/clip data, a scene
//! list, and file references. Parsing the native markup is its job; turning
//! the extraction into a consistent tree is ours.
//!
//! The builder fails fast on malformed input - a tree is either complete
//! and hashed or not constructed at all.

use crate::hash::hash_tree;
use crate::node::{ids, Node, Tree, TreeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wallproto::{AttrMap, AttrValue, NodeKind};

/// Flat parsed export of one saved session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(default)]
    pub source_path: String,
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub tracks: Vec<TrackData>,
    #[serde(default)]
    pub scenes: Vec<SceneData>,
    #[serde(default)]
    pub file_refs: Vec<FileRefData>,
}

fn default_tempo() -> f64 {
    120.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackData {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub devices: Vec<DeviceData>,
    #[serde(default)]
    pub clip_slots: Vec<SlotData>,
    #[serde(default)]
    pub mixer: MixerData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixerData {
    #[serde(default = "MixerData::default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub pan: f64,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_armed: bool,
    #[serde(default)]
    pub is_soloed: bool,
}

impl MixerData {
    fn default_volume() -> f64 {
        0.85
    }
}

impl Default for MixerData {
    fn default() -> Self {
        Self {
            volume: Self::default_volume(),
            pan: 0.0,
            is_muted: false,
            is_armed: false,
            is_soloed: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
    pub name: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub parameters: Vec<ParamData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamData {
    pub name: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_param_max")]
    pub max: f64,
}

fn default_param_max() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotData {
    /// Signed on purpose: negative indices in the export are malformed
    /// input and must be rejected, not silently wrapped.
    pub scene_index: i64,
    #[serde(default)]
    pub has_clip: bool,
    #[serde(default = "default_true")]
    pub has_stop_button: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub clip: Option<ClipData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub clip_type: ClipType,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: f64,
    #[serde(default)]
    pub loop_start: f64,
    #[serde(default)]
    pub loop_end: f64,
    #[serde(default)]
    pub is_looped: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipType {
    #[default]
    Midi,
    Audio,
}

impl ClipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipType::Midi => "midi",
            ClipType::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub tempo: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRefData {
    pub path: String,
    #[serde(default)]
    pub name: String,
}

/// Construction failures. No partial tree ever escapes these.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("track {track}: negative scene_index {value}")]
    NegativeSceneIndex { track: usize, value: i64 },

    #[error("track {track}: slot references scene {scene_index} but only {scene_count} scenes exist")]
    SlotOutOfRange {
        track: usize,
        scene_index: usize,
        scene_count: usize,
    },

    #[error("track {track}: duplicate slot entry for scene {scene_index}")]
    DuplicateSlot { track: usize, scene_index: usize },

    #[error("structural inconsistency while building: {0}")]
    Tree(#[from] TreeError),
}

/// Build the typed tree from a parsed export and stamp initial hashes.
pub fn build(doc: &SessionDocument) -> Result<Tree, BuildError> {
    validate(doc)?;

    let mut root_attrs = AttrMap::new();
    root_attrs.insert("tempo".to_string(), AttrValue::Float(doc.tempo));
    root_attrs.insert("is_playing".to_string(), AttrValue::Bool(doc.is_playing));
    root_attrs.insert(
        "source_path".to_string(),
        AttrValue::from(doc.source_path.clone()),
    );
    let mut tree = Tree::new(Node::new(NodeKind::Project, ids::PROJECT, root_attrs));

    // Project children order: scenes, then tracks, then file references.
    // Scene insertion by the update engine relies on scenes forming the
    // leading run of the root's children.
    for (i, scene) in doc.scenes.iter().enumerate() {
        let mut attrs = AttrMap::new();
        attrs.insert("index".to_string(), AttrValue::from(i));
        attrs.insert("name".to_string(), AttrValue::from(scene.name.clone()));
        if let Some(color) = &scene.color {
            attrs.insert("color".to_string(), AttrValue::from(color.clone()));
        }
        if let Some(tempo) = scene.tempo {
            attrs.insert("tempo".to_string(), AttrValue::Float(tempo));
        }
        tree.insert_child(ids::PROJECT, Node::new(NodeKind::Scene, ids::scene(i), attrs), i)?;
    }

    for (t, track) in doc.tracks.iter().enumerate() {
        let position = tree.children_of(ids::PROJECT).len();
        let mut attrs = AttrMap::new();
        attrs.insert("index".to_string(), AttrValue::from(t));
        attrs.insert("name".to_string(), AttrValue::from(track.name.clone()));
        if let Some(color) = &track.color {
            attrs.insert("color".to_string(), AttrValue::from(color.clone()));
        }
        tree.insert_child(
            ids::PROJECT,
            Node::new(NodeKind::Track, ids::track(t), attrs),
            position,
        )?;
        build_track(&mut tree, t, track, doc.scenes.len())?;
    }

    for (i, file_ref) in doc.file_refs.iter().enumerate() {
        let position = tree.children_of(ids::PROJECT).len();
        let mut attrs = AttrMap::new();
        attrs.insert("index".to_string(), AttrValue::from(i));
        attrs.insert("path".to_string(), AttrValue::from(file_ref.path.clone()));
        attrs.insert("name".to_string(), AttrValue::from(file_ref.name.clone()));
        tree.insert_child(
            ids::PROJECT,
            Node::new(NodeKind::FileReference, ids::file_ref(i), attrs),
            position,
        )?;
    }

    hash_tree(&mut tree);
    Ok(tree)
}

/// Track children order: mixer, then devices, then clip slots. Slots form
/// the tail run so ordered insertion can append when no greater scene index
/// exists yet.
fn build_track(
    tree: &mut Tree,
    t: usize,
    track: &TrackData,
    scene_count: usize,
) -> Result<(), BuildError> {
    let track_id = ids::track(t);

    let mut mixer_attrs = AttrMap::new();
    mixer_attrs.insert("volume".to_string(), AttrValue::Float(track.mixer.volume));
    mixer_attrs.insert("pan".to_string(), AttrValue::Float(track.mixer.pan));
    mixer_attrs.insert("is_muted".to_string(), AttrValue::Bool(track.mixer.is_muted));
    mixer_attrs.insert("is_armed".to_string(), AttrValue::Bool(track.mixer.is_armed));
    mixer_attrs.insert(
        "is_soloed".to_string(),
        AttrValue::Bool(track.mixer.is_soloed),
    );
    tree.insert_child(&track_id, Node::new(NodeKind::Mixer, ids::mixer(t), mixer_attrs), 0)?;

    for (d, device) in track.devices.iter().enumerate() {
        let position = tree.children_of(&track_id).len();
        let mut attrs = AttrMap::new();
        attrs.insert("name".to_string(), AttrValue::from(device.name.clone()));
        if let Some(class_name) = &device.class_name {
            attrs.insert("class_name".to_string(), AttrValue::from(class_name.clone()));
        }
        attrs.insert("is_active".to_string(), AttrValue::Bool(device.is_active));
        let device_id = ids::device(t, d);
        tree.insert_child(
            &track_id,
            Node::new(NodeKind::Device, device_id.clone(), attrs),
            position,
        )?;

        for (p, param) in device.parameters.iter().enumerate() {
            let mut attrs = AttrMap::new();
            attrs.insert("name".to_string(), AttrValue::from(param.name.clone()));
            attrs.insert("value".to_string(), AttrValue::Float(param.value));
            attrs.insert("min".to_string(), AttrValue::Float(param.min));
            attrs.insert("max".to_string(), AttrValue::Float(param.max));
            tree.insert_child(
                &device_id,
                Node::new(NodeKind::Parameter, ids::param(t, d, p), attrs),
                p,
            )?;
        }
    }

    // Dense clip-slot matrix: exactly one slot per scene index, padding
    // where the export has no entry for this track.
    for s in 0..scene_count {
        let source = track
            .clip_slots
            .iter()
            .find(|slot| slot.scene_index == s as i64);
        let position = tree.children_of(&track_id).len();
        let mut attrs = AttrMap::new();
        attrs.insert("track_index".to_string(), AttrValue::from(t));
        attrs.insert("scene_index".to_string(), AttrValue::from(s));
        let has_clip = source.map(|slot| slot.has_clip || slot.clip.is_some()).unwrap_or(false);
        attrs.insert("has_clip".to_string(), AttrValue::Bool(has_clip));
        attrs.insert(
            "has_stop_button".to_string(),
            AttrValue::Bool(source.map(|slot| slot.has_stop_button).unwrap_or(true)),
        );
        attrs.insert("is_playing".to_string(), AttrValue::Bool(false));
        attrs.insert("is_triggered".to_string(), AttrValue::Bool(false));
        if let Some(color) = source.and_then(|slot| slot.color.clone()) {
            attrs.insert("color".to_string(), AttrValue::from(color));
        }
        let slot_id = ids::clip_slot(t, s);
        tree.insert_child(
            &track_id,
            Node::new(NodeKind::ClipSlot, slot_id.clone(), attrs),
            position,
        )?;

        if has_clip {
            let clip = source.and_then(|slot| slot.clip.clone()).unwrap_or_default();
            let mut attrs = AttrMap::new();
            attrs.insert("name".to_string(), AttrValue::from(clip.name));
            attrs.insert("clip_type".to_string(), AttrValue::from(clip.clip_type.as_str()));
            attrs.insert("start_time".to_string(), AttrValue::Float(clip.start_time));
            attrs.insert("end_time".to_string(), AttrValue::Float(clip.end_time));
            attrs.insert("loop_start".to_string(), AttrValue::Float(clip.loop_start));
            attrs.insert("loop_end".to_string(), AttrValue::Float(clip.loop_end));
            attrs.insert("is_looped".to_string(), AttrValue::Bool(clip.is_looped));
            tree.insert_child(&slot_id, Node::new(NodeKind::Clip, ids::clip(t, s), attrs), 0)?;
        }
    }

    Ok(())
}

fn validate(doc: &SessionDocument) -> Result<(), BuildError> {
    let scene_count = doc.scenes.len();
    for (t, track) in doc.tracks.iter().enumerate() {
        let mut seen = std::collections::HashSet::new();
        for slot in &track.clip_slots {
            if slot.scene_index < 0 {
                return Err(BuildError::NegativeSceneIndex {
                    track: t,
                    value: slot.scene_index,
                });
            }
            let scene_index = slot.scene_index as usize;
            if scene_index >= scene_count {
                return Err(BuildError::SlotOutOfRange {
                    track: t,
                    scene_index,
                    scene_count,
                });
            }
            if !seen.insert(scene_index) {
                return Err(BuildError::DuplicateSlot {
                    track: t,
                    scene_index,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn two_track_doc() -> SessionDocument {
        SessionDocument {
            source_path: "/sets/demo.als".to_string(),
            tempo: 128.0,
            is_playing: false,
            tracks: vec![
                TrackData {
                    name: "Audio 1".to_string(),
                    devices: vec![DeviceData {
                        name: "EQ Eight".to_string(),
                        parameters: vec![ParamData {
                            name: "Gain".to_string(),
                            value: 0.5,
                            ..Default::default()
                        }],
                        ..Default::default()
                    }],
                    clip_slots: vec![SlotData {
                        scene_index: 1,
                        has_clip: true,
                        clip: Some(ClipData {
                            name: "Verse".to_string(),
                            clip_type: ClipType::Audio,
                            end_time: 16.0,
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
            ],
            scenes: vec![
                SceneData {
                    name: "Intro".to_string(),
                    ..Default::default()
                },
                SceneData::default(),
            ],
            file_refs: vec![FileRefData {
                path: "samples/kick.wav".to_string(),
                name: "kick".to_string(),
            }],
        }
    }

    #[test]
    fn builds_dense_slot_matrix() {
        let tree = build(&two_track_doc()).unwrap();
        for t in 0..2 {
            let slots: Vec<usize> = tree
                .children_of_kind(&ids::track(t), NodeKind::ClipSlot)
                .filter_map(|n| n.index_attr("scene_index"))
                .collect();
            assert_eq!(slots, vec![0, 1], "track {} slot row", t);
        }
        // Padded slot is empty, sourced slot carries its clip.
        let padded = tree.get("clip_slot_1_0").unwrap();
        assert_eq!(padded.attrs["has_clip"], AttrValue::Bool(false));
        assert_eq!(padded.attrs["has_stop_button"], AttrValue::Bool(true));
        let filled = tree.get("clip_slot_0_1").unwrap();
        assert_eq!(filled.attrs["has_clip"], AttrValue::Bool(true));
        assert_eq!(tree.children_of(&ids::clip_slot(0, 1)), ["clip_0_1"]);
    }

    #[test]
    fn deterministic_ids_and_hashes() {
        let a = build(&two_track_doc()).unwrap();
        let b = build(&two_track_doc()).unwrap();
        assert_eq!(a.root().hash, b.root().hash);
        assert!(a.contains("param_0_0_0"));
        assert!(a.contains("mixer_1"));
        assert!(a.contains("file_ref_0"));
        assert!(a.contains("scene_1"));
    }

    #[test]
    fn scenes_lead_the_root_children() {
        let tree = build(&two_track_doc()).unwrap();
        let children = tree.children_of(ids::PROJECT);
        assert_eq!(&children[..2], ["scene_0", "scene_1"]);
        assert_eq!(&children[2..4], ["track_0", "track_1"]);
    }

    #[test]
    fn negative_scene_index_fails_fast() {
        let mut doc = two_track_doc();
        doc.tracks[0].clip_slots[0].scene_index = -2;
        assert!(matches!(
            build(&doc),
            Err(BuildError::NegativeSceneIndex { track: 0, value: -2 })
        ));
    }

    #[test]
    fn slot_past_scene_count_fails_fast() {
        let mut doc = two_track_doc();
        doc.tracks[0].clip_slots[0].scene_index = 5;
        assert!(matches!(
            build(&doc),
            Err(BuildError::SlotOutOfRange {
                track: 0,
                scene_index: 5,
                scene_count: 2
            })
        ));
    }

    #[test]
    fn duplicate_slot_entry_fails_fast() {
        let mut doc = two_track_doc();
        doc.tracks[0].clip_slots.push(SlotData {
            scene_index: 1,
            ..Default::default()
        });
        assert!(matches!(
            build(&doc),
            Err(BuildError::DuplicateSlot {
                track: 0,
                scene_index: 1
            })
        ));
    }

    #[test]
    fn document_parses_from_json() {
        let json = r#"{
            "source_path": "/sets/a.als",
            "tracks": [{"name": "Bass", "clip_slots": [{"scene_index": 0}]}],
            "scenes": [{"name": ""}]
        }"#;
        let doc: SessionDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.tempo, 120.0);
        let tree = build(&doc).unwrap();
        assert!(tree.contains("clip_slot_0_0"));
    }
}
