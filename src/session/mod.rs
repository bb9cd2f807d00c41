//! Recording sessions: the repaint/timer seam, frame pacing and the recorder state machine.

/// Repaint ticks to output frame indices.
pub mod pacing;
/// The [`Recorder`](recorder::Recorder) and its options.
pub mod recorder;
/// Frame and timer scheduling.
pub mod schedule;
