//! Structural diffing between two trees.
//!
//! Children are paired by id, never by position: positions shift when a
//! scene is inserted even though most nodes are logically unchanged.
//! Subtrees with equal content hashes are skipped without recursion, which
//! is the payoff of the bottom-up hash scheme.

use crate::hash::hash_tree;
use crate::node::{Node, Tree, TreeError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use wallproto::{AttrMap, ChangeEntry, ChangeKind, NodeKind};

/// A full capture of one node at diff time, with enough placement
/// information to replay the change onto another tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub kind: NodeKind,
    pub parent: Option<String>,
    /// Index in the parent's children list at capture time.
    pub position: usize,
    pub path: String,
    pub attrs: AttrMap,
}

/// Attribute-level change on a node present in both trees.
///
/// Snapshots are the full maps, not just changed keys - consumers diff
/// keys themselves when they need finer granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttrChange {
    pub id: String,
    pub kind: NodeKind,
    pub path: String,
    pub old_attrs: AttrMap,
    pub new_attrs: AttrMap,
}

/// Result of comparing two trees. Entry order within each list is
/// unspecified; consumers must not rely on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeDiff {
    pub added: Vec<NodeSnapshot>,
    pub removed: Vec<NodeSnapshot>,
    pub modified: Vec<AttrChange>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    /// Flatten to wire entries for a DIFF_UPDATE broadcast.
    pub fn to_changes(&self) -> Vec<ChangeEntry> {
        let mut changes = Vec::with_capacity(self.len());
        for snap in &self.added {
            changes.push(ChangeEntry {
                change: ChangeKind::Added,
                node_id: snap.id.clone(),
                node_kind: snap.kind,
                path: snap.path.clone(),
                old_value: None,
                new_value: Some(snap.attrs.clone()),
            });
        }
        for snap in &self.removed {
            changes.push(ChangeEntry {
                change: ChangeKind::Removed,
                node_id: snap.id.clone(),
                node_kind: snap.kind,
                path: snap.path.clone(),
                old_value: Some(snap.attrs.clone()),
                new_value: None,
            });
        }
        for change in &self.modified {
            changes.push(ChangeEntry {
                change: ChangeKind::Modified,
                node_id: change.id.clone(),
                node_kind: change.kind,
                path: change.path.clone(),
                old_value: Some(change.old_attrs.clone()),
                new_value: Some(change.new_attrs.clone()),
            });
        }
        changes
    }
}

/// Snapshot one node as it sits in `tree`.
pub fn snapshot(tree: &Tree, node: &Node) -> NodeSnapshot {
    let position = node
        .parent
        .as_ref()
        .and_then(|p| {
            tree.children_of(p)
                .iter()
                .position(|c| c == &node.id)
        })
        .unwrap_or(0);
    NodeSnapshot {
        id: node.id.clone(),
        kind: node.kind,
        parent: node.parent.clone(),
        position,
        path: tree.id_path(&node.id),
        attrs: node.attrs.clone(),
    }
}

/// Snapshot a whole subtree, parents before children, for added/removed
/// reporting.
pub fn snapshot_subtree(tree: &Tree, id: &str, out: &mut Vec<NodeSnapshot>) {
    let Some(node) = tree.get(id) else { return };
    out.push(snapshot(tree, node));
    for child in tree.children_of(id) {
        snapshot_subtree(tree, child, out);
    }
}

/// Compare two full trees. Both must have been hash-stamped.
pub fn diff(old: &Tree, new: &Tree) -> TreeDiff {
    let mut out = TreeDiff::default();
    if old.root_id() != new.root_id() {
        // Wholesale replacement; does not happen with deterministic root
        // ids, but the diff stays well-defined if it ever does.
        snapshot_subtree(old, old.root_id(), &mut out.removed);
        snapshot_subtree(new, new.root_id(), &mut out.added);
        return out;
    }
    diff_nodes(old, new, old.root_id(), &mut out);
    out
}

fn diff_nodes(old: &Tree, new: &Tree, id: &str, out: &mut TreeDiff) {
    let (Some(old_node), Some(new_node)) = (old.get(id), new.get(id)) else {
        return;
    };
    if old_node.hash == new_node.hash {
        return;
    }

    if old_node.attrs != new_node.attrs || old_node.kind != new_node.kind {
        out.modified.push(AttrChange {
            id: id.to_string(),
            kind: new_node.kind,
            path: new.id_path(id),
            old_attrs: old_node.attrs.clone(),
            new_attrs: new_node.attrs.clone(),
        });
    }

    let old_ids: HashSet<&String> = old_node.children.iter().collect();
    let new_ids: HashSet<&String> = new_node.children.iter().collect();

    for child in &new_node.children {
        if old_ids.contains(child) {
            diff_nodes(old, new, child, out);
        } else {
            snapshot_subtree(new, child, &mut out.added);
        }
    }
    for child in &old_node.children {
        if !new_ids.contains(child) {
            snapshot_subtree(old, child, &mut out.removed);
        }
    }
}

/// Errors replaying a diff onto a tree it was not produced from.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("diff references missing node {0}")]
    MissingNode(String),

    #[error("added node {0} has no parent recorded")]
    NoParent(String),

    #[error("replay produced an inconsistent tree: {0}")]
    Tree(#[from] TreeError),
}

/// Replay a diff produced by `diff(base, other)` onto a copy of `base`,
/// yielding a tree hash-equal to `other`. Removals run first, then
/// additions in their recorded parent-before-child order, then attribute
/// updates; the result is re-stamped.
pub fn apply(base: &Tree, diff: &TreeDiff) -> Result<Tree, ApplyError> {
    let mut tree = base.clone();

    for snap in &diff.removed {
        // A parent earlier in the list may have taken this node with it.
        tree.remove_subtree(&snap.id);
    }

    for snap in &diff.added {
        let parent = snap
            .parent
            .clone()
            .ok_or_else(|| ApplyError::NoParent(snap.id.clone()))?;
        let node = Node::new(snap.kind, snap.id.clone(), snap.attrs.clone());
        let position = snap.position.min(tree.children_of(&parent).len());
        tree.insert_child(&parent, node, position)?;
    }

    for change in &diff.modified {
        let node = tree
            .get_mut(&change.id)
            .ok_or_else(|| ApplyError::MissingNode(change.id.clone()))?;
        node.attrs = change.new_attrs.clone();
    }

    hash_tree(&mut tree);
    Ok(tree)
}
