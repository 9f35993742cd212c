//! Outbound messages fanned out to subscribers.
//!
//! Four message types, externally tagged as `{type, payload}` so thin
//! clients can switch on `type` without a full schema.

use crate::event::StateChange;
use crate::node::{AttrMap, NodeKind, SerializedNode};
use serde::{Deserialize, Serialize};

/// What happened to a node in a structural diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One entry of a DIFF_UPDATE message.
///
/// `old_value`/`new_value` are full attribute snapshots, not just the
/// changed keys - consumers diff keys themselves when they need finer
/// granularity. `path` is the slash-joined id path from the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    #[serde(rename = "type")]
    pub change: ChangeKind,
    pub node_id: String,
    pub node_kind: NodeKind,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<AttrMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<AttrMap>,
}

/// Messages pushed to every connected subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Broadcast {
    /// Full tree sync: sent on subscriber connect and after a fallback
    /// reload so late joiners never depend on diff history.
    FullTree {
        tree: SerializedNode,
        source_path: String,
    },

    /// Structural diff against the previously broadcast tree.
    DiffUpdate { changes: Vec<ChangeEntry> },

    /// Lightweight state change; consumers apply directly, no hashes move.
    StateEvent {
        event_path: String,
        args: Vec<crate::value::ArgValue>,
        seq_num: u64,
        timestamp: f64,
    },

    /// Staleness notification on sequence-gap threshold breach.
    Error {
        error: String,
        details: serde_json::Value,
    },
}

impl Broadcast {
    pub fn state_event(state: StateChange) -> Self {
        Broadcast::StateEvent {
            event_path: state.event_path,
            args: state.args,
            seq_num: state.seq_num,
            timestamp: state.timestamp,
        }
    }

    /// Serialize for the wire. Serialization of these types cannot fail in
    /// practice; the fallback keeps a delivery path even if it somehow does.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"ERROR","payload":{{"error":"serialization_failed","details":"{}"}}}}"#,
                e
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArgValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn broadcast_wire_tags_are_screaming_snake() {
        let msg = Broadcast::DiffUpdate { changes: vec![] };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "DIFF_UPDATE");
        assert!(json["payload"]["changes"].as_array().unwrap().is_empty());
    }

    #[test]
    fn state_event_payload_shape() {
        let msg = Broadcast::state_event(StateChange {
            event_path: "track-volume-changed".to_string(),
            args: vec![ArgValue::Int(2), ArgValue::Float(0.7)],
            seq_num: 41,
            timestamp: 12.5,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "STATE_EVENT");
        assert_eq!(json["payload"]["event_path"], "track-volume-changed");
        assert_eq!(json["payload"]["seq_num"], 41);
    }

    #[test]
    fn change_entry_omits_absent_snapshots() {
        let entry = ChangeEntry {
            change: ChangeKind::Removed,
            node_id: "device_0_1".to_string(),
            node_kind: NodeKind::Device,
            path: "project/track_0/device_0_1".to_string(),
            old_value: Some(AttrMap::new()),
            new_value: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "removed");
        assert!(json.get("new_value").is_none());
        assert!(json.get("old_value").is_some());
    }

    #[test]
    fn error_broadcast_roundtrip() {
        let msg = Broadcast::Error {
            error: "sequence_gap".to_string(),
            details: serde_json::json!({"gap": 7, "threshold": 5}),
        };
        let back: Broadcast = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(back, msg);
    }
}
