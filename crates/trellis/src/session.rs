//! The live session: one owned handle over the tree and its update state.
//!
//! Explicitly not a global - the server constructs one `LiveSession` and
//! routes every write through it, which keeps the engine testable without
//! a running host. The caller owns mutual exclusion: hold one writer lock
//! (or equivalent single-consumer queue) across each call, so a reload can
//! never interleave with an in-flight incremental mutation and readers
//! never observe a torn tree.

use crate::builder::{build, BuildError, SessionDocument};
use crate::cache::NodeCache;
use crate::diff::{diff, TreeDiff};
use crate::hash::ContentHash;
use crate::node::Tree;
use crate::sequence::{SeqVerdict, SequenceTracker};
use crate::serialize::to_wire;
use crate::update::apply_event;
use thiserror::Error;
use tracing::{debug, info};
use wallproto::{EventResult, SerializedNode, SessionEvent};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no document loaded yet")]
    NoDocument,

    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Outcome of (re)loading a document.
pub struct LoadOutcome {
    /// Diff against the previous tree; `None` on the very first load.
    pub diff: Option<TreeDiff>,
}

pub struct LiveSession {
    tree: Option<Tree>,
    tracker: SequenceTracker,
    cache: NodeCache,
    /// Latest parsed export, kept as the fallback-reload source.
    document: Option<SessionDocument>,
}

impl LiveSession {
    pub fn new(gap_threshold: u64, cache_capacity: usize) -> Self {
        Self {
            tree: None,
            tracker: SequenceTracker::new(gap_threshold),
            cache: NodeCache::new(cache_capacity),
            document: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.tree.is_some()
    }

    pub fn is_stale(&self) -> bool {
        self.tracker.is_stale()
    }

    pub fn root_hash(&self) -> Option<&ContentHash> {
        self.tree.as_ref().map(|t| &t.root().hash)
    }

    pub fn source_path(&self) -> &str {
        self.document
            .as_ref()
            .map(|d| d.source_path.as_str())
            .unwrap_or("")
    }

    /// Load a freshly parsed export, replacing the live tree wholesale.
    ///
    /// Returns the diff against the previous tree so the caller can
    /// broadcast a reconciliation; the first load has nothing to diff
    /// against and the caller sends a full-tree sync instead.
    pub fn load(&mut self, document: SessionDocument) -> Result<LoadOutcome, SessionError> {
        let new_tree = build(&document)?;
        let diff_result = self.tree.as_ref().map(|old| diff(old, &new_tree));
        info!(
            source = %document.source_path,
            nodes = new_tree.len(),
            reload = diff_result.is_some(),
            "session document loaded"
        );
        self.tree = Some(new_tree);
        self.document = Some(document);
        self.tracker.clear_stale();
        Ok(LoadOutcome { diff: diff_result })
    }

    /// Rebuild from the last loaded document after a sequence gap marked
    /// the tree stale. Returns the diff to broadcast.
    pub fn reload_fallback(&mut self) -> Result<TreeDiff, SessionError> {
        let document = self.document.clone().ok_or(SessionError::NoDocument)?;
        let outcome = self.load(document)?;
        // load() always produces a diff here: a fallback implies a
        // previous tree existed.
        Ok(outcome.diff.unwrap_or_default())
    }

    /// Process one inbound event: sequence check, then dispatch.
    pub fn process_event(&mut self, event: &SessionEvent) -> EventResult {
        let Some(tree) = self.tree.as_mut() else {
            return EventResult::Skipped {
                reason: "no document loaded".to_string(),
            };
        };

        match self.tracker.observe(event.seq) {
            SeqVerdict::Duplicate => {
                debug!(seq = event.seq, path = %event.path, "duplicate or late event dropped");
                return EventResult::Skipped {
                    reason: format!("duplicate sequence {}", event.seq),
                };
            }
            SeqVerdict::GapExceeded(gap) => {
                // Not applied: the stream already lost too much to trust
                // this mutation; the fallback reload resynchronizes.
                return EventResult::Stale { gap };
            }
            SeqVerdict::First | SeqVerdict::InOrder | SeqVerdict::SmallGap(_) => {}
        }

        apply_event(tree, &mut self.cache, event)
    }

    /// Snapshot the current tree for a FULL_TREE broadcast.
    pub fn serialize(&self) -> Option<SerializedNode> {
        self.tree.as_ref().map(to_wire)
    }

    /// Build another export and diff it against the live tree without
    /// swapping anything in.
    pub fn diff_with(&self, other: &SessionDocument) -> Result<TreeDiff, SessionError> {
        let tree = self.tree.as_ref().ok_or(SessionError::NoDocument)?;
        let other_tree = build(other)?;
        Ok(diff(tree, &other_tree))
    }
}

impl Default for LiveSession {
    fn default() -> Self {
        Self::new(
            crate::sequence::DEFAULT_GAP_THRESHOLD,
            NodeCache::DEFAULT_CAPACITY,
        )
    }
}
