//! Trace execution
//!
//! This module replays a [`Trace`](crate::trace::Trace) against live memory:
//! - [`engine`]: the [`Executor`], stepping, seeking and snapshots
//! - [`branches`]: runtime branch decisions and jump suppression
//! - [`template`]: output template resolution
//! - [`sink`]: the [`EffectSink`] interface and a recording implementation
//! - [`playback`]: timed automatic stepping

pub mod branches;
pub mod engine;
pub mod playback;
pub mod sink;
pub mod template;

pub use engine::{Executor, StateSnapshot};
pub use playback::{run_with_delay, Playback, PlaybackState};
pub use sink::{Effect, EffectSink, RecordingSink, RunStatus};
