//! Wire serialization of the live tree.

use crate::node::Tree;
use wallproto::SerializedNode;

/// Render the whole tree as nested wire nodes, children in list order.
pub fn to_wire(tree: &Tree) -> SerializedNode {
    serialize_node(tree, tree.root_id())
}

fn serialize_node(tree: &Tree, id: &str) -> SerializedNode {
    let node = match tree.get(id) {
        Some(node) => node,
        // Unreachable for a consistent tree; an empty placeholder beats
        // poisoning a broadcast mid-serialization.
        None => {
            return SerializedNode {
                node_type: wallproto::NodeKind::Project,
                id: id.to_string(),
                hash: String::new(),
                attributes: wallproto::AttrMap::new(),
                children: Vec::new(),
            }
        }
    };
    SerializedNode {
        node_type: node.kind,
        id: node.id.clone(),
        hash: node.hash.as_str().to_string(),
        attributes: node.attrs.clone(),
        children: node
            .children
            .iter()
            .map(|child| serialize_node(tree, child))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::builder::tests::two_track_doc;
    use pretty_assertions::assert_eq;
    use wallproto::NodeKind;

    #[test]
    fn wire_tree_mirrors_structure() {
        let tree = build(&two_track_doc()).unwrap();
        let wire = to_wire(&tree);
        assert_eq!(wire.node_type, NodeKind::Project);
        assert_eq!(wire.id, "project");
        assert_eq!(wire.hash, tree.root().hash.as_str());
        // scenes, tracks, file ref
        assert_eq!(wire.children.len(), 5);
        let track = wire
            .children
            .iter()
            .find(|c| c.id == "track_0")
            .unwrap();
        // mixer + device + 2 slots
        assert_eq!(track.children.len(), 4);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["node_type"], "project");
    }
}
