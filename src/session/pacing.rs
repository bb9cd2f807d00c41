use crate::foundation::core::{Fps, FrameIndex};
use std::time::Instant;

/// Maps repaint ticks onto output frame slots at a fixed frame rate.
///
/// The first tick defines time zero. A tick yields a frame index when it lands in a slot later
/// than the last emitted one; ticks that land in an already filled slot are coalesced. Slow
/// repaints leave gaps in the index sequence, which encoders fill by holding the previous frame.
#[derive(Clone, Debug)]
pub struct FramePacer {
    fps: Fps,
    origin: Option<Instant>,
    last: Option<FrameIndex>,
    emitted: u64,
    coalesced: u64,
}

impl FramePacer {
    /// Create a pacer for `fps`.
    pub fn new(fps: Fps) -> Self {
        Self {
            fps,
            origin: None,
            last: None,
            emitted: 0,
            coalesced: 0,
        }
    }

    /// Return the output frame index for a tick at `now`, if the tick fills a new slot.
    pub fn due(&mut self, now: Instant) -> Option<FrameIndex> {
        let origin = *self.origin.get_or_insert(now);
        let elapsed = now.saturating_duration_since(origin).as_secs_f64();
        let idx = FrameIndex(self.fps.secs_to_frames_floor(elapsed));
        if self.last.is_some_and(|last| idx <= last) {
            self.coalesced += 1;
            return None;
        }
        self.last = Some(idx);
        self.emitted += 1;
        Some(idx)
    }

    /// Frames emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Ticks that did not produce a frame.
    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/pacing.rs"]
mod tests;
