//! The typed document tree: nodes keyed by stable id.
//!
//! Ownership flows one direction: a parent's `children` list is the single
//! owner of a node's place in the tree. The `parent` field is a non-owning
//! back-pointer (an id, not a reference) used only for upward traversal
//! during partial rehashing, so there is nothing cyclic to leak.
//!
//! Ids are assigned deterministically from kind + position at build time
//! (`track_3`, `clip_slot_3_7`), so a node recreated at the same position
//! after a reload resolves to the same id and reload diffs stay small.

use crate::hash::ContentHash;
use std::collections::HashMap;
use thiserror::Error;
use wallproto::{AttrMap, AttrValue, NodeKind};

/// Structural mutation errors. These indicate engine bugs or malformed
/// diffs, not host noise - host noise is handled by skipping upstream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node id already present: {0}")]
    DuplicateId(String),

    #[error("no such node: {0}")]
    NoSuchNode(String),

    #[error("insert position {position} out of bounds for {parent} ({len} children)")]
    BadPosition {
        parent: String,
        position: usize,
        len: usize,
    },
}

/// One element of the session document.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub id: String,
    pub attrs: AttrMap,
    pub hash: ContentHash,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

impl Node {
    pub fn new(kind: NodeKind, id: impl Into<String>, attrs: AttrMap) -> Self {
        Self {
            kind,
            id: id.into(),
            attrs,
            hash: ContentHash::zeroed(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Attribute accessor for index-valued attributes.
    pub fn index_attr(&self, key: &str) -> Option<usize> {
        self.attrs.get(key).and_then(AttrValue::as_index)
    }
}

/// The session document tree. Exactly one Project node is the root.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: HashMap<String, Node>,
    root: String,
}

impl Tree {
    /// Create a tree from its root node. The root keeps no parent.
    pub fn new(root: Node) -> Self {
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            nodes,
            root: root_id,
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn root(&self) -> &Node {
        // The root is inserted at construction and never removed.
        &self.nodes[&self.root]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Insert `node` as a child of `parent` at `position` in its children
    /// list. Position must be <= the current child count; collections stay
    /// ordered by correct-position insertion, never by sorting afterward.
    pub fn insert_child(
        &mut self,
        parent: &str,
        mut node: Node,
        position: usize,
    ) -> Result<(), TreeError> {
        if self.nodes.contains_key(&node.id) {
            return Err(TreeError::DuplicateId(node.id));
        }
        let parent_node = self
            .nodes
            .get_mut(parent)
            .ok_or_else(|| TreeError::NoSuchNode(parent.to_string()))?;
        if position > parent_node.children.len() {
            return Err(TreeError::BadPosition {
                parent: parent.to_string(),
                position,
                len: parent_node.children.len(),
            });
        }
        parent_node.children.insert(position, node.id.clone());
        node.parent = Some(parent.to_string());
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Remove a node and its entire subtree. Returns the number of nodes
    /// removed, zero if `id` was absent. Removing the root is refused.
    pub fn remove_subtree(&mut self, id: &str) -> usize {
        if id == self.root || !self.nodes.contains_key(id) {
            return 0;
        }
        // Detach from the owner first.
        if let Some(parent_id) = self.nodes[id].parent.clone() {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|c| c != id);
            }
        }
        let mut removed = 0;
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                removed += 1;
                stack.extend(node.children);
            }
        }
        removed
    }

    /// Child ids of `id`, empty if the node is absent.
    pub fn children_of(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// First child of `parent` with the given kind.
    pub fn child_of_kind(&self, parent: &str, kind: NodeKind) -> Option<&Node> {
        self.children_of(parent)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .find(|n| n.kind == kind)
    }

    /// Children of `parent` with the given kind, in list order.
    pub fn children_of_kind<'a>(
        &'a self,
        parent: &str,
        kind: NodeKind,
    ) -> impl Iterator<Item = &'a Node> + 'a {
        self.children_of(parent)
            .iter()
            .filter_map(move |id| self.nodes.get(id))
            .filter(move |n| n.kind == kind)
    }

    /// Slash-joined id path from the root, used on the wire.
    pub fn id_path(&self, id: &str) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id.to_string());
        while let Some(cur) = current {
            segments.push(cur.clone());
            current = self.nodes.get(&cur).and_then(|n| n.parent.clone());
        }
        segments.reverse();
        segments.join("/")
    }

    /// Allocate the first free ordinal for a positional id. Tries the
    /// preferred ordinal first, then scans upward, so an incremental insert
    /// between existing siblings still gets a unique stable id (the next
    /// full reload renormalizes ids to positions).
    pub fn alloc_id(&self, make: impl Fn(usize) -> String, preferred: usize) -> String {
        let candidate = make(preferred);
        if !self.contains(&candidate) {
            return candidate;
        }
        let mut n = preferred + 1;
        loop {
            let candidate = make(n);
            if !self.contains(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Id constructors, shared by the builder and the update engine.
pub mod ids {
    pub const PROJECT: &str = "project";

    pub fn track(i: usize) -> String {
        format!("track_{}", i)
    }

    pub fn scene(i: usize) -> String {
        format!("scene_{}", i)
    }

    pub fn clip_slot(track: usize, scene: usize) -> String {
        format!("clip_slot_{}_{}", track, scene)
    }

    pub fn clip(track: usize, scene: usize) -> String {
        format!("clip_{}_{}", track, scene)
    }

    pub fn device(track: usize, device: usize) -> String {
        format!("device_{}_{}", track, device)
    }

    pub fn mixer(track: usize) -> String {
        format!("mixer_{}", track)
    }

    pub fn param(track: usize, device: usize, param: usize) -> String {
        format!("param_{}_{}_{}", track, device, param)
    }

    pub fn file_ref(i: usize) -> String {
        format!("file_ref_{}", i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn empty_project() -> Tree {
        Tree::new(Node::new(NodeKind::Project, ids::PROJECT, AttrMap::new()))
    }

    #[test]
    fn insert_and_path() {
        let mut tree = empty_project();
        tree.insert_child(
            ids::PROJECT,
            Node::new(NodeKind::Track, ids::track(0), AttrMap::new()),
            0,
        )
        .unwrap();
        tree.insert_child(
            &ids::track(0),
            Node::new(NodeKind::Mixer, ids::mixer(0), AttrMap::new()),
            0,
        )
        .unwrap();
        assert_eq!(tree.id_path("mixer_0"), "project/track_0/mixer_0");
        assert_eq!(tree.get("mixer_0").unwrap().parent.as_deref(), Some("track_0"));
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut tree = empty_project();
        tree.insert_child(
            ids::PROJECT,
            Node::new(NodeKind::Track, ids::track(0), AttrMap::new()),
            0,
        )
        .unwrap();
        let err = tree
            .insert_child(
                ids::PROJECT,
                Node::new(NodeKind::Track, ids::track(0), AttrMap::new()),
                1,
            )
            .unwrap_err();
        assert_eq!(err, TreeError::DuplicateId("track_0".to_string()));
    }

    #[test]
    fn remove_subtree_drops_descendants() {
        let mut tree = empty_project();
        tree.insert_child(
            ids::PROJECT,
            Node::new(NodeKind::Track, ids::track(0), AttrMap::new()),
            0,
        )
        .unwrap();
        tree.insert_child(
            &ids::track(0),
            Node::new(NodeKind::ClipSlot, ids::clip_slot(0, 0), AttrMap::new()),
            0,
        )
        .unwrap();
        tree.insert_child(
            &ids::clip_slot(0, 0),
            Node::new(NodeKind::Clip, ids::clip(0, 0), AttrMap::new()),
            0,
        )
        .unwrap();

        assert_eq!(tree.remove_subtree(&ids::track(0)), 3);
        assert!(!tree.contains("clip_0_0"));
        assert!(tree.children_of(ids::PROJECT).is_empty());
        // Root removal is refused.
        assert_eq!(tree.remove_subtree(ids::PROJECT), 0);
    }

    #[test]
    fn alloc_id_skips_taken_ordinals() {
        let mut tree = empty_project();
        for i in 0..3 {
            tree.insert_child(
                ids::PROJECT,
                Node::new(NodeKind::Scene, ids::scene(i), AttrMap::new()),
                i,
            )
            .unwrap();
        }
        // Preferred ordinal 1 is taken; 3 is the first free one.
        assert_eq!(tree.alloc_id(ids::scene, 1), "scene_3");
        assert_eq!(tree.alloc_id(ids::scene, 7), "scene_7");
    }
}
