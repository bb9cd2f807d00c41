use crate::foundation::error::{StrataError, StrataResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Runs once on the next repaint, with the repaint timestamp.
pub type FrameCallback = Box<dyn FnOnce(Instant) + Send>;
/// Runs once after a delay.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Handle for cancelling a pending frame request or timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// The host's repaint cycle and timer facility.
///
/// Frame callbacks are one-shot: a loop re-requests from inside its callback. Callbacks
/// requested while a frame is being dispatched run on the following frame. Implementations
/// never invoke callbacks while holding their own locks, so callbacks may call back into the
/// scheduler.
pub trait FrameScheduler: Send + Sync {
    /// Current time on the scheduler's clock.
    fn now(&self) -> Instant;
    /// Run `cb` on the next repaint.
    fn request_frame(&self, cb: FrameCallback) -> CallbackId;
    /// Cancel a pending frame request. Unknown ids are ignored.
    fn cancel_frame(&self, id: CallbackId);
    /// Run `cb` once `delay` has elapsed.
    fn set_timeout(&self, delay: Duration, cb: TimerCallback) -> CallbackId;
    /// Cancel a pending timer. Unknown or already fired ids are ignored.
    fn clear_timeout(&self, id: CallbackId);
}

#[derive(Default)]
struct CallbackQueue {
    next_id: u64,
    frames: Vec<(CallbackId, FrameCallback)>,
    timers: Vec<(CallbackId, Instant, TimerCallback)>,
}

impl CallbackQueue {
    fn alloc_id(&mut self) -> CallbackId {
        self.next_id += 1;
        CallbackId(self.next_id)
    }

    fn push_frame(&mut self, cb: FrameCallback) -> CallbackId {
        let id = self.alloc_id();
        self.frames.push((id, cb));
        id
    }

    fn cancel_frame(&mut self, id: CallbackId) {
        self.frames.retain(|(fid, _)| *fid != id);
    }

    fn push_timer(&mut self, due: Instant, cb: TimerCallback) -> CallbackId {
        let id = self.alloc_id();
        self.timers.push((id, due, cb));
        id
    }

    fn clear_timer(&mut self, id: CallbackId) {
        self.timers.retain(|(tid, _, _)| *tid != id);
    }

    fn next_due(&self) -> Option<Instant> {
        self.timers.iter().map(|(_, due, _)| *due).min()
    }

    /// Remove the earliest timer due at or before `now` (ties broken by creation order).
    fn pop_due_timer(&mut self, now: Instant) -> Option<(Instant, TimerCallback)> {
        let pos = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, (_, due, _))| *due <= now)
            .min_by_key(|(_, (id, due, _))| (*due, id.0))
            .map(|(i, _)| i)?;
        let (_, due, cb) = self.timers.remove(pos);
        Some((due, cb))
    }

    fn take_frames(&mut self) -> Vec<(CallbackId, FrameCallback)> {
        std::mem::take(&mut self.frames)
    }
}

struct ManualState {
    now: Instant,
    queue: CallbackQueue,
}

/// Deterministic scheduler driven by the caller: time only moves in [`ManualScheduler::advance`]
/// and repaints only happen in [`ManualScheduler::run_frame`].
pub struct ManualScheduler {
    origin: Instant,
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    /// Create a scheduler whose clock starts now.
    pub fn new() -> Self {
        let origin = Instant::now();
        Self {
            origin,
            state: Mutex::new(ManualState {
                now: origin,
                queue: CallbackQueue::default(),
            }),
        }
    }

    /// Time advanced since creation.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().now.saturating_duration_since(self.origin)
    }

    /// Move the clock forward, firing due timers in due order at their due time.
    ///
    /// Returns the number of timers fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut fired = 0;
        loop {
            let next = {
                let mut st = self.state.lock();
                let next = st.queue.pop_due_timer(target);
                if let Some((due, _)) = next.as_ref() {
                    st.now = st.now.max(*due);
                }
                next
            };
            let Some((_, cb)) = next else {
                break;
            };
            cb();
            fired += 1;
        }
        self.state.lock().now = target;
        fired
    }

    /// Dispatch one repaint. Returns the number of frame callbacks run.
    pub fn run_frame(&self) -> usize {
        let (now, frames) = {
            let mut st = self.state.lock();
            (st.now, st.queue.take_frames())
        };
        let n = frames.len();
        for (_, cb) in frames {
            cb(now);
        }
        n
    }

    /// [`ManualScheduler::advance`] then [`ManualScheduler::run_frame`].
    pub fn step(&self, by: Duration) -> usize {
        self.advance(by);
        self.run_frame()
    }

    /// Frame callbacks waiting for the next repaint.
    pub fn pending_frames(&self) -> usize {
        self.state.lock().queue.frames.len()
    }

    /// Timers not yet fired or cleared.
    pub fn pending_timers(&self) -> usize {
        self.state.lock().queue.timers.len()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.state.lock().now
    }

    fn request_frame(&self, cb: FrameCallback) -> CallbackId {
        self.state.lock().queue.push_frame(cb)
    }

    fn cancel_frame(&self, id: CallbackId) {
        self.state.lock().queue.cancel_frame(id);
    }

    fn set_timeout(&self, delay: Duration, cb: TimerCallback) -> CallbackId {
        let mut st = self.state.lock();
        let due = st.now + delay;
        st.queue.push_timer(due, cb)
    }

    fn clear_timeout(&self, id: CallbackId) {
        self.state.lock().queue.clear_timer(id);
    }
}

struct IntervalState {
    queue: CallbackQueue,
    shutdown: bool,
}

struct IntervalShared {
    state: Mutex<IntervalState>,
    wake: Condvar,
    refresh: Duration,
}

/// Real-time scheduler: a dedicated thread emulates a display refreshing at a fixed rate and
/// fires timers on the wall clock.
pub struct IntervalScheduler {
    shared: Arc<IntervalShared>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl IntervalScheduler {
    /// Start a scheduler repainting `refresh_hz` times per second.
    pub fn new(refresh_hz: u32) -> StrataResult<Self> {
        if refresh_hz == 0 {
            return Err(StrataError::validation("refresh rate must be > 0"));
        }
        let shared = Arc::new(IntervalShared {
            state: Mutex::new(IntervalState {
                queue: CallbackQueue::default(),
                shutdown: false,
            }),
            wake: Condvar::new(),
            refresh: Duration::from_secs_f64(1.0 / f64::from(refresh_hz)),
        });
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("strata-frames".to_string())
            .spawn(move || run_interval_loop(&worker_shared))
            .map_err(|e| StrataError::Other(anyhow::anyhow!("failed to spawn frame thread: {e}")))?;
        let worker_id = worker.thread().id();
        Ok(Self {
            shared,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Repaint interval.
    pub fn refresh_interval(&self) -> Duration {
        self.shared.refresh
    }
}

fn run_interval_loop(shared: &IntervalShared) {
    let mut next_vsync = Instant::now() + shared.refresh;
    loop {
        let (now, timers, frames) = {
            let mut st = shared.state.lock();
            loop {
                if st.shutdown {
                    return;
                }
                let now = Instant::now();
                let timer_due = st.queue.next_due().is_some_and(|d| d <= now);
                if now >= next_vsync || timer_due {
                    break;
                }
                let wake_at = st
                    .queue
                    .next_due()
                    .map_or(next_vsync, |d| d.min(next_vsync));
                shared.wake.wait_until(&mut st, wake_at);
            }

            let now = Instant::now();
            let mut timers = Vec::new();
            while let Some((_, cb)) = st.queue.pop_due_timer(now) {
                timers.push(cb);
            }
            let frames = if now >= next_vsync {
                next_vsync += shared.refresh;
                if next_vsync <= now {
                    // Missed repaints are not replayed.
                    next_vsync = now + shared.refresh;
                }
                st.queue.take_frames()
            } else {
                Vec::new()
            };
            (now, timers, frames)
        };

        for cb in timers {
            cb();
        }
        for (_, cb) in frames {
            cb(now);
        }
    }
}

impl FrameScheduler for IntervalScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn request_frame(&self, cb: FrameCallback) -> CallbackId {
        self.shared.state.lock().queue.push_frame(cb)
    }

    fn cancel_frame(&self, id: CallbackId) {
        self.shared.state.lock().queue.cancel_frame(id);
    }

    fn set_timeout(&self, delay: Duration, cb: TimerCallback) -> CallbackId {
        let id = self
            .shared
            .state
            .lock()
            .queue
            .push_timer(Instant::now() + delay, cb);
        self.shared.wake.notify_one();
        id
    }

    fn clear_timeout(&self, id: CallbackId) {
        self.shared.state.lock().queue.clear_timer(id);
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wake.notify_one();
        // The last handle can be released from a callback on the frame thread itself.
        if std::thread::current().id() == self.worker_id {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/schedule.rs"]
mod tests;
