//! Node kinds and the serialized tree shape sent to subscribers.

use crate::value::ArgValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute map for one node. BTreeMap so serialization order is stable,
/// which the content-hash scheme in `trellis` relies on.
pub type AttrMap = BTreeMap<String, ArgValue>;

/// The closed set of node kinds in the session document tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Project,
    Track,
    Device,
    ClipSlot,
    Clip,
    FileReference,
    Scene,
    Mixer,
    Parameter,
}

impl NodeKind {
    /// Wire name, also the prefix used for deterministic node ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Project => "project",
            NodeKind::Track => "track",
            NodeKind::Device => "device",
            NodeKind::ClipSlot => "clip_slot",
            NodeKind::Clip => "clip",
            NodeKind::FileReference => "file_ref",
            NodeKind::Scene => "scene",
            NodeKind::Mixer => "mixer",
            NodeKind::Parameter => "param",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node of the tree as it appears on the wire, children nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNode {
    pub node_type: NodeKind,
    pub id: String,
    pub hash: String,
    pub attributes: AttrMap,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SerializedNode>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_wire_names_are_snake_case() {
        let json = serde_json::to_string(&NodeKind::ClipSlot).unwrap();
        assert_eq!(json, r#""clip_slot""#);
        let back: NodeKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeKind::ClipSlot);
    }

    #[test]
    fn leaf_omits_children_field() {
        let node = SerializedNode {
            node_type: NodeKind::Scene,
            id: "scene_0".to_string(),
            hash: "00".repeat(16),
            attributes: AttrMap::new(),
            children: Vec::new(),
        };
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("children").is_none());
    }
}
