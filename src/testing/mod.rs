//! Deterministic test doubles for the capture engine.
//!
//! Everything here runs without hardware, a terminal or a real clock:
//! a scripted driver with failure injection and call counters, a cue
//! recorder, a display that replays a fixed interaction, and wall clocks
//! pinned to known instants. Integration tests use these through the
//! public `neural_capture::testing` path.

mod doubles;
mod scripted;

pub use doubles::{CancelTrigger, FixedClock, RecordingCue, ScriptedDisplay, SteppingClock};
pub use scripted::{ScriptProbe, ScriptedConnector, ScriptedSession};
