//! Narrative Sequencer — frame-synchronized story event playback.
//!
//! Expands author-written event lists through a macro table into
//! primitive event records, then plays them back one per frame, gated on
//! the state actors report into a shared registry.

pub mod core;
pub mod schema;
