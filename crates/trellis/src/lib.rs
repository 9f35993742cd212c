//! Trellis: the live session document tree.
//!
//! An in-memory, typed tree of a DAW session (tracks, devices, clips,
//! clip slots, scenes, mixer state) kept consistent under two independent
//! update channels:
//!
//! - **Full reload**: a flat parsed export of the saved project is built
//!   into a fresh tree and swapped in wholesale; a structural diff against
//!   the previous tree reconciles subscribers.
//! - **Incremental events**: a stream of small, possibly-lossy mutation
//!   notifications is applied in place, with bottom-up hash restamping
//!   along the mutation path and minimal diffs out.
//!
//! Every node carries a content hash of its attributes and children, so
//! change detection is O(changed subtree) and the root hash doubles as the
//! tree version for cache invalidation. A sequence tracker watches the
//! event stream for gaps and flips the tree stale when too much was lost,
//! at which point the owner reloads from the last saved export.
//!
//! The `LiveSession` facade ties it together behind a single writer
//! handle; everything below it is synchronous and runtime-free.

pub mod builder;
pub mod cache;
pub mod diff;
pub mod hash;
pub mod node;
pub mod sequence;
pub mod serialize;
pub mod session;
pub mod update;

pub use builder::{
    build, BuildError, ClipData, ClipType, DeviceData, FileRefData, MixerData, ParamData,
    SceneData, SessionDocument, SlotData, TrackData,
};
pub use cache::{CacheKey, NodeCache};
pub use diff::{apply, diff, AttrChange, NodeSnapshot, TreeDiff};
pub use hash::{hash_tree, node_digest, rehash_upward, ContentHash, HashError};
pub use node::{ids, Node, Tree, TreeError};
pub use sequence::{SeqVerdict, SequenceTracker, DEFAULT_GAP_THRESHOLD};
pub use serialize::to_wire;
pub use session::{LiveSession, LoadOutcome, SessionError};
pub use update::{apply_event, is_known_path};
