//! Wallflower: watches a live DAW session and mirrors it to subscribers.
//!
//! The host glue posts two kinds of input: fine-grained mutation events
//! (continuously, over a lossy stream) and a full parsed export (on every
//! save). Both funnel through one single-writer intake loop into the
//! `trellis` tree engine; structural diffs, lightweight state events, and
//! full-tree syncs fan out to WebSocket subscribers through a debouncing
//! broadcaster.
//!
//! ```text
//! POST /event ----\                                    /--> ws subscriber
//! POST /document --+--> intake loop --> debouncer --> fan-out --> ...
//!                       (LiveSession)                 \--> ws subscriber
//! ```

pub mod debounce;
pub mod intake;
pub mod state;
pub mod telemetry;
pub mod web;

pub use intake::Intake;
pub use state::{spawn_pipeline, AppState};
