//! Inbound session events and the result of applying one.
//!
//! The host observer calls into us with `(path, args, seq, timestamp)`
//! tuples. Paths form a closed set ("track-renamed", "scene-added", ...);
//! the dispatch table in `trellis` owns that set. Sequence numbers are
//! monotonic per host process and drive gap detection.

use crate::broadcast::ChangeEntry;
use crate::value::ArgValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One mutation notification from the host observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Symbolic mutation kind, e.g. "track-renamed".
    pub path: String,
    /// Positional arguments; meaning depends on `path`.
    pub args: Vec<ArgValue>,
    /// Monotonic sequence number from the host stream.
    pub seq: u64,
    /// Host-side timestamp, seconds since the epoch.
    pub timestamp: f64,
}

impl SessionEvent {
    pub fn new(path: impl Into<String>, args: Vec<ArgValue>, seq: u64, timestamp: f64) -> Self {
        Self {
            path: path.into(),
            args,
            seq,
            timestamp,
        }
    }

    /// Argument at `i` as a collection index.
    pub fn index_arg(&self, i: usize) -> Result<usize, ArgError> {
        self.arg(i)?.as_index().ok_or(ArgError::WrongType {
            index: i,
            expected: "non-negative integer",
        })
    }

    /// Argument at `i` as a string slice.
    pub fn str_arg(&self, i: usize) -> Result<&str, ArgError> {
        self.arg(i)?.as_str().ok_or(ArgError::WrongType {
            index: i,
            expected: "string",
        })
    }

    /// Argument at `i` as a float (ints coerce).
    pub fn f64_arg(&self, i: usize) -> Result<f64, ArgError> {
        self.arg(i)?.as_f64().ok_or(ArgError::WrongType {
            index: i,
            expected: "number",
        })
    }

    /// Argument at `i` as a bool (0/1 ints coerce).
    pub fn bool_arg(&self, i: usize) -> Result<bool, ArgError> {
        self.arg(i)?.as_bool().ok_or(ArgError::WrongType {
            index: i,
            expected: "bool",
        })
    }

    fn arg(&self, i: usize) -> Result<&ArgValue, ArgError> {
        self.args.get(i).ok_or(ArgError::Missing(i))
    }
}

/// Argument extraction errors. These end up as skip reasons, never panics:
/// a malformed event is logged and dropped like a stale one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgError {
    #[error("missing argument at position {0}")]
    Missing(usize),

    #[error("argument {index}: expected {expected}")]
    WrongType { index: usize, expected: &'static str },
}

/// Lightweight state-change payload, forwarded to subscribers without any
/// hash implications. Mirrors the STATE_EVENT wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub event_path: String,
    pub args: Vec<ArgValue>,
    pub seq_num: u64,
    pub timestamp: f64,
}

/// Outcome of processing one inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventResult {
    /// Structure or identity changed; carries the diff entries to broadcast.
    AppliedStructural { changes: Vec<ChangeEntry> },

    /// Lightweight value change; carries the state message to broadcast.
    AppliedState { state: StateChange },

    /// Target not found or arguments malformed - stale event, no broadcast.
    Skipped { reason: String },

    /// Unhandled or deliberately-ignored path (scene reorder).
    Ignored,

    /// Sequence gap reached the threshold; the event was not applied and
    /// the caller must run a fallback reload.
    Stale { gap: u64 },
}
