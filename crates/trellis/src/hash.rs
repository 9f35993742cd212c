//! Content hashing for the document tree.
//!
//! Every node carries a BLAKE3 digest of its own kind and attributes plus
//! the ordered digests of its children, truncated to 128 bits (32 hex
//! chars). Equal hashes mean equal subtrees, so the diff engine can skip
//! whole branches; a single attribute change re-stamps only the path from
//! the mutation to the root.

use crate::node::{Node, Tree};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use wallproto::AttrValue;

/// A content hash - 128 bits (16 bytes, 32 hex chars) of BLAKE3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

/// Errors that can occur when working with content hashes.
#[derive(Debug, Error)]
pub enum HashError {
    #[error("invalid hash length: expected 32 hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in hash")]
    InvalidHex,
}

impl ContentHash {
    /// Hash raw bytes and return the content hash.
    pub fn from_data(data: &[u8]) -> Self {
        let hash_bytes = blake3::hash(data);
        Self(hex::encode(&hash_bytes.as_bytes()[..16]))
    }

    /// The all-zero hash, used as the not-yet-stamped placeholder.
    pub fn zeroed() -> Self {
        Self("0".repeat(32))
    }

    /// Create from an existing hash string (validates format).
    pub fn from_str_checked(s: &str) -> Result<Self, HashError> {
        if s.len() != 32 {
            return Err(HashError::InvalidLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex);
        }
        Ok(Self(s.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Feed one length-prefixed field so adjacent fields can never run
/// together and fake an equal digest.
fn feed(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn feed_value(hasher: &mut blake3::Hasher, value: &AttrValue) {
    match value {
        AttrValue::Bool(b) => {
            hasher.update(&[0x01, *b as u8]);
        }
        AttrValue::Int(i) => {
            hasher.update(&[0x02]);
            hasher.update(&i.to_le_bytes());
        }
        AttrValue::Float(f) => {
            hasher.update(&[0x03]);
            hasher.update(&f.to_le_bytes());
        }
        AttrValue::Str(s) => {
            hasher.update(&[0x04]);
            feed(hasher, s.as_bytes());
        }
    }
}

/// Digest of one node given its children's digests, in child order.
///
/// Attributes enter in BTreeMap (sorted-key) order, so insertion order
/// never changes the result. Children are order-sensitive.
pub fn node_digest(node: &Node, child_hashes: &[ContentHash]) -> ContentHash {
    let mut hasher = blake3::Hasher::new();
    feed(&mut hasher, node.kind.as_str().as_bytes());
    for (key, value) in &node.attrs {
        feed(&mut hasher, key.as_bytes());
        feed_value(&mut hasher, value);
    }
    for child in child_hashes {
        feed(&mut hasher, child.as_str().as_bytes());
    }
    let bytes = hasher.finalize();
    ContentHash(hex::encode(&bytes.as_bytes()[..16]))
}

fn child_hashes(tree: &Tree, id: &str) -> Vec<ContentHash> {
    tree.children_of(id)
        .iter()
        .filter_map(|c| tree.get(c))
        .map(|n| n.hash.clone())
        .collect()
}

/// Stamp every node's hash, children before parents.
pub fn hash_tree(tree: &mut Tree) {
    for id in post_order_ids(tree) {
        rehash_node(tree, &id);
    }
}

/// Recompute one node's hash from its stored child hashes, then walk the
/// parent chain to the root. O(depth): sibling subtrees are never visited.
pub fn rehash_upward(tree: &mut Tree, start: &str) {
    let mut current = Some(start.to_string());
    while let Some(id) = current {
        rehash_node(tree, &id);
        current = tree.get(&id).and_then(|n| n.parent.clone());
    }
}

fn rehash_node(tree: &mut Tree, id: &str) {
    let children = child_hashes(tree, id);
    if let Some(node) = tree.get(id) {
        let digest = node_digest(node, &children);
        if let Some(node) = tree.get_mut(id) {
            node.hash = digest;
        }
    }
}

fn post_order_ids(tree: &Tree) -> Vec<String> {
    let mut order = Vec::with_capacity(tree.len());
    let mut stack = vec![(tree.root_id().to_string(), false)];
    while let Some((id, visited)) = stack.pop() {
        if visited {
            order.push(id);
            continue;
        }
        stack.push((id.clone(), true));
        for child in tree.children_of(&id).iter().rev() {
            stack.push((child.clone(), false));
        }
    }
    order
}
