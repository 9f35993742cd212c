//! wallproto - Protocol types for the Wallflower session mirror
//!
//! This crate defines the messages exchanged at both edges of the system:
//!
//! - **Inbound**: [`SessionEvent`] notifications pushed by the host observer
//!   (one per fine-grained session mutation, carrying a symbolic path, a
//!   positional argument list, and a monotonic sequence number), plus the
//!   [`SessionDocument`]-shaped full export posted on every save. The export
//!   shape itself lives in the `trellis` crate next to its builder.
//! - **Outbound**: [`Broadcast`] messages fanned out to subscribers - full
//!   trees, structural diffs, lightweight state events, and staleness errors.
//!
//! Everything here is plain serde data. Transport framing, the tree engine,
//! and fan-out policy live in other crates; keeping this crate free of I/O
//! lets the host glue, the engine, and test harnesses all speak the same
//! types without dragging a runtime along.

pub mod broadcast;
pub mod event;
pub mod node;
pub mod value;

pub use broadcast::{Broadcast, ChangeEntry, ChangeKind};
pub use event::{ArgError, EventResult, SessionEvent, StateChange};
pub use node::{AttrMap, NodeKind, SerializedNode};
pub use value::ArgValue;

/// Alias kept for readability at call sites that deal in node attributes
/// rather than event arguments. Same tagged scalar either way.
pub type AttrValue = value::ArgValue;
