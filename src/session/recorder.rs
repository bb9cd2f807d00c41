use crate::encode::encoder::{Artifact, ChunkEncoder, EncoderFactory, open_encoder};
use crate::encode::pipeline::{EncoderPipeline, SubmitOutcome};
use crate::encode::profile::{EncodingProfile, default_preferences};
use crate::foundation::core::{Canvas, Fps, Rgba8Premul};
use crate::foundation::error::{StrataError, StrataResult};
use crate::render::composite::{CompositeReport, Compositor};
use crate::session::pacing::FramePacer;
use crate::session::schedule::{CallbackId, FrameScheduler};
use crate::surface::{PixelSurface, RenderSurface, SurfaceProvider};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak, mpsc};
use std::time::{Duration, Instant};

/// Receives the finished artifact. Runs once, on the encoder thread.
pub type CompletionCallback = Box<dyn FnOnce(Artifact) + Send>;

/// Recorder configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RecorderOpts {
    /// Output frame rate.
    pub fps: Fps,
    /// Requested bitrate for preferred profiles (a hint).
    pub bitrate_bps: u32,
    /// Composite background (RGBA8, straight alpha). Must be opaque.
    pub background_rgba: [u8; 4],
    /// Encoding profiles in preference order.
    pub profiles: Vec<EncodingProfile>,
    /// Frames buffered between the composite loop and the encoder thread.
    pub channel_capacity: usize,
    /// Warn once when a surface fails this many ticks in a row (`0` disables).
    pub failure_warn_threshold: u32,
}

impl Default for RecorderOpts {
    fn default() -> Self {
        Self {
            fps: Fps::default(),
            bitrate_bps: 5_000_000,
            background_rgba: [0, 0, 0, 255],
            profiles: default_preferences(),
            channel_capacity: 8,
            failure_warn_threshold: 30,
        }
    }
}

impl RecorderOpts {
    /// Check option invariants.
    pub fn validate(&self) -> StrataResult<()> {
        Fps::new(self.fps.num, self.fps.den)?;
        if self.background_rgba[3] != 255 {
            return Err(StrataError::validation(
                "background_rgba must be fully opaque (alpha 255)",
            ));
        }
        if self.channel_capacity == 0 {
            return Err(StrataError::validation("channel_capacity must be > 0"));
        }
        if self.bitrate_bps == 0 {
            return Err(StrataError::validation("bitrate_bps must be > 0"));
        }
        Ok(())
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_json_path(path: impl AsRef<Path>) -> StrataResult<Self> {
        use anyhow::Context as _;
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read recorder options '{}'", path.display()))?;
        let opts: Self = serde_json::from_str(&text)
            .map_err(|e| StrataError::serde(format!("{}: {e}", path.display())))?;
        opts.validate()?;
        Ok(opts)
    }

    fn background(&self) -> Rgba8Premul {
        let [r, g, b, a] = self.background_rgba;
        Rgba8Premul::from_straight_rgba(r, g, b, a)
    }
}

/// Public recorder state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecorderState {
    /// No session.
    Idle,
    /// A session is capturing or finalizing.
    Recording,
}

/// Identity of one start-to-stop recording.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Non-error outcomes of [`Recorder::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session is recording.
    Started(SessionId),
    /// A session was already active; nothing changed and the callback was dropped.
    AlreadyRecording,
}

/// Live counters of the active session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Composite ticks run.
    pub ticks: u64,
    /// Frames handed to the encoder.
    pub frames_submitted: u64,
    /// Frames dropped because the encoder fell behind.
    pub frames_dropped: u64,
    /// Surface draws that failed, summed over all ticks.
    pub draw_failures: u64,
    /// Outcome of the latest tick.
    pub last_report: CompositeReport,
    /// `true` once stop was requested and the encoder is finalizing.
    pub finalizing: bool,
}

/// One-shot receiver for a session's artifact.
pub struct CompletionHandle {
    rx: mpsc::Receiver<Artifact>,
}

impl CompletionHandle {
    /// Block until the artifact arrives.
    pub fn wait(self) -> StrataResult<Artifact> {
        self.rx
            .recv()
            .map_err(|_| StrataError::encoder("recording ended without an artifact"))
    }

    /// Block for at most `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Artifact> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Take the artifact if it already arrived.
    pub fn try_take(&self) -> Option<Artifact> {
        self.rx.try_recv().ok()
    }
}

/// Drawing state, locked separately so surface draws never hold the session lock.
struct TickState {
    surfaces: Vec<Arc<dyn RenderSurface>>,
    compositor: Compositor,
    pacer: FramePacer,
}

struct ActiveSession {
    id: SessionId,
    finalizing: bool,
    canvas: Canvas,
    tick: Arc<Mutex<TickState>>,
    pipeline: EncoderPipeline,
    profile: Option<EncodingProfile>,
    started_at: Instant,
    frame_request: Option<CallbackId>,
    auto_stop: Option<CallbackId>,
    on_complete: Option<CompletionCallback>,
    stats: SessionStats,
}

struct Shared {
    opts: RecorderOpts,
    provider: Arc<dyn SurfaceProvider>,
    encoders: Arc<dyn EncoderFactory>,
    scheduler: Arc<dyn FrameScheduler>,
    preview: Arc<PixelSurface>,
    next_session: AtomicU64,
    session: Mutex<Option<ActiveSession>>,
}

/// Composites the discovered surfaces into one video.
///
/// Lifecycle: [`Recorder::start`] snapshots the presented surfaces, sizes the composite to the
/// first one, opens an encoder and starts a frame-driven composite loop. [`Recorder::stop`], the
/// optional duration timer, and the encoder finishing on its own all converge on the same
/// cleanup, which delivers the artifact exactly once. At most one session is active per
/// recorder; clones share that session.
///
/// Dropping the last handle abandons an active session without calling its callback.
#[derive(Clone)]
pub struct Recorder {
    shared: Arc<Shared>,
}

impl Recorder {
    /// Create an idle recorder.
    pub fn new(
        opts: RecorderOpts,
        provider: Arc<dyn SurfaceProvider>,
        encoders: Arc<dyn EncoderFactory>,
        scheduler: Arc<dyn FrameScheduler>,
    ) -> StrataResult<Self> {
        opts.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                opts,
                provider,
                encoders,
                scheduler,
                preview: Arc::new(PixelSurface::new(Canvas::new(0, 0))?),
                next_session: AtomicU64::new(1),
                session: Mutex::new(None),
            }),
        })
    }

    /// Options this recorder was built with.
    pub fn opts(&self) -> &RecorderOpts {
        &self.shared.opts
    }

    /// Start recording. `Duration::ZERO` records until [`Recorder::stop`].
    ///
    /// Returns `Err(StrataError::Configuration)` when no surface is discoverable or the first one
    /// has zero size (state stays idle), and propagates encoder errors only when the
    /// default-profile fallback also fails. Discovery, encoder negotiation and the first
    /// composite tick run without holding the recorder's lock.
    #[tracing::instrument(skip(self, on_complete))]
    pub fn start(
        &self,
        duration: Duration,
        on_complete: impl FnOnce(Artifact) + Send + 'static,
    ) -> StrataResult<StartOutcome> {
        let shared = &self.shared;
        if shared.session.lock().is_some() {
            tracing::debug!("start ignored, already recording");
            return Ok(StartOutcome::AlreadyRecording);
        }

        let (tick, canvas, encoder, profile) = Shared::prepare(shared)?;

        let id = SessionId(shared.next_session.fetch_add(1, Ordering::Relaxed));
        let weak = Arc::downgrade(shared);
        let pipeline = EncoderPipeline::spawn(
            encoder,
            shared.opts.channel_capacity,
            Box::new(move |artifact| {
                if let Some(shared) = weak.upgrade() {
                    Shared::complete(&shared, id, artifact);
                }
            }),
        )?;
        let surface_count = tick.surfaces.len();
        let tick = Arc::new(Mutex::new(tick));
        let started_at = shared.scheduler.now();

        {
            let mut slot = shared.session.lock();
            if slot.is_some() {
                // Another start won while this one negotiated. The unused pipeline finishes on
                // its own and its completion matches no session.
                tracing::debug!(session = id.0, "start ignored, already recording");
                return Ok(StartOutcome::AlreadyRecording);
            }

            let auto_stop = (!duration.is_zero()).then(|| {
                let weak = Arc::downgrade(shared);
                shared.scheduler.set_timeout(
                    duration,
                    Box::new(move || {
                        if let Some(shared) = weak.upgrade() {
                            Shared::stop_session(&shared, Some(id));
                        }
                    }),
                )
            });

            let profile_label = profile.map_or_else(|| "default".to_string(), |p| p.mime_type());
            tracing::info!(
                session = id.0,
                size = %canvas,
                surfaces = surface_count,
                profile = %profile_label,
                "recording started"
            );

            *slot = Some(ActiveSession {
                id,
                finalizing: false,
                canvas,
                tick: Arc::clone(&tick),
                pipeline,
                profile,
                started_at,
                frame_request: None,
                auto_stop,
                on_complete: Some(Box::new(on_complete)),
                stats: SessionStats::default(),
            });
        }

        Shared::composite_tick(shared, id, &tick, started_at);
        Ok(StartOutcome::Started(id))
    }

    /// [`Recorder::start`] with a [`CompletionHandle`] instead of a callback.
    ///
    /// Returns `Ok(None)` when a session is already active.
    pub fn start_awaitable(&self, duration: Duration) -> StrataResult<Option<CompletionHandle>> {
        let (tx, rx) = mpsc::channel();
        let outcome = self.start(duration, move |artifact| {
            let _ = tx.send(artifact);
        })?;
        Ok(match outcome {
            StartOutcome::Started(_) => Some(CompletionHandle { rx }),
            StartOutcome::AlreadyRecording => None,
        })
    }

    /// Stop compositing and finalize the encoder. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        Shared::stop_session(&self.shared, None);
    }

    /// `true` from a successful start until the artifact has been delivered.
    pub fn is_recording(&self) -> bool {
        self.shared.session.lock().is_some()
    }

    /// Current state.
    pub fn state(&self) -> RecorderState {
        if self.is_recording() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Composite size of the active session.
    pub fn output_canvas(&self) -> Option<Canvas> {
        self.shared
            .session
            .lock()
            .as_ref()
            .map(|s| s.canvas)
    }

    /// Profile negotiated for the active session (`None` for the unconfigured default).
    pub fn active_profile(&self) -> Option<EncodingProfile> {
        self.shared.session.lock().as_ref().and_then(|s| s.profile)
    }

    /// Id of the active session.
    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.session.lock().as_ref().map(|s| s.id)
    }

    /// Counters of the active session.
    pub fn session_stats(&self) -> Option<SessionStats> {
        self.shared.session.lock().as_ref().map(|s| SessionStats {
            frames_dropped: s.pipeline.frames_dropped(),
            ..s.stats
        })
    }

    /// The recorder's own composite output, exposed as a surface for previews.
    ///
    /// It is never recorded, even when a provider discovers it.
    pub fn preview_surface(&self) -> Arc<PixelSurface> {
        Arc::clone(&self.shared.preview)
    }
}

type PreparedSession = (
    TickState,
    Canvas,
    Box<dyn ChunkEncoder>,
    Option<EncodingProfile>,
);

impl Shared {
    /// Snapshot the surfaces, size the composite and open an encoder.
    fn prepare(shared: &Arc<Self>) -> StrataResult<PreparedSession> {
        let opts = &shared.opts;
        let preview_id = shared.preview.id();
        let surfaces: Vec<Arc<dyn RenderSurface>> = shared
            .provider
            .discover()
            .into_iter()
            .filter(|s| s.id() != preview_id)
            .collect();
        let Some(first) = surfaces.first() else {
            tracing::error!("no sources found to record");
            return Err(StrataError::configuration("no sources found to record"));
        };
        let canvas = first.pixel_size();
        if canvas.is_empty() {
            tracing::error!(surface = %first.id(), "first source has zero size");
            return Err(StrataError::configuration(format!(
                "first source {} has zero size",
                first.id()
            )));
        }

        let compositor = Compositor::new(canvas, opts.background())?
            .with_failure_warn_threshold(opts.failure_warn_threshold);
        let (encoder, cfg) = open_encoder(
            shared.encoders.as_ref(),
            &opts.profiles,
            canvas,
            opts.fps,
            Some(opts.bitrate_bps),
        )?;
        let tick = TickState {
            surfaces,
            compositor,
            pacer: FramePacer::new(opts.fps),
        };
        Ok((tick, canvas, encoder, cfg.profile))
    }

    fn on_frame(shared: &Arc<Self>, id: SessionId, now: Instant) {
        let tick = {
            let slot = shared.session.lock();
            match slot.as_ref() {
                Some(s) if s.id == id && !s.finalizing => Arc::clone(&s.tick),
                _ => return,
            }
        };
        Self::composite_tick(shared, id, &tick, now);
    }

    /// Draw under the tick lock, then submit and re-request under the session lock.
    ///
    /// Lock order is tick, then session.
    fn composite_tick(shared: &Arc<Self>, id: SessionId, tick: &Mutex<TickState>, now: Instant) {
        let mut tick = tick.lock();
        let TickState {
            surfaces,
            compositor,
            pacer,
        } = &mut *tick;
        let report = compositor.composite(surfaces);
        let frame = compositor.frame();
        if let Err(err) = shared.preview.update(|p| p.clone_from(frame)) {
            tracing::debug!(error = %err, "preview surface not updated");
        }
        let due = pacer.due(now);

        let mut slot = shared.session.lock();
        let Some(session) = slot.as_mut().filter(|s| s.id == id && !s.finalizing) else {
            return;
        };
        session.stats.ticks += 1;
        session.stats.draw_failures += report.failed as u64;
        session.stats.last_report = report;

        if let Some(idx) = due {
            match session.pipeline.submit(idx, frame) {
                SubmitOutcome::Queued => session.stats.frames_submitted += 1,
                SubmitOutcome::Dropped => {}
                SubmitOutcome::Closed => {
                    tracing::debug!(session = id.0, "encoder closed, frame discarded");
                }
            }
        }

        let weak: Weak<Self> = Arc::downgrade(shared);
        session.frame_request = Some(shared.scheduler.request_frame(Box::new(move |now| {
            if let Some(shared) = weak.upgrade() {
                Self::on_frame(&shared, id, now);
            }
        })));
    }

    fn stop_session(shared: &Arc<Self>, only: Option<SessionId>) {
        let mut slot = shared.session.lock();
        let Some(session) = slot.as_mut() else {
            return;
        };
        if session.finalizing || only.is_some_and(|id| id != session.id) {
            return;
        }
        session.finalizing = true;
        session.stats.finalizing = true;
        if let Some(req) = session.frame_request.take() {
            shared.scheduler.cancel_frame(req);
        }
        if let Some(timer) = session.auto_stop.take() {
            shared.scheduler.clear_timeout(timer);
        }
        session.pipeline.finish();
        tracing::info!(
            session = session.id.0,
            elapsed_ms = shared
                .scheduler
                .now()
                .saturating_duration_since(session.started_at)
                .as_millis() as u64,
            "recording stopping, finalizing encoder"
        );
    }

    fn complete(shared: &Arc<Self>, id: SessionId, artifact: Artifact) {
        let session = {
            let mut slot = shared.session.lock();
            match slot.as_ref() {
                Some(s) if s.id == id => slot.take(),
                _ => None,
            }
        };
        let Some(mut session) = session else {
            return;
        };

        if !session.finalizing {
            tracing::warn!(
                session = id.0,
                error = artifact.error.as_deref().unwrap_or("none"),
                "encoder finished before stop was requested"
            );
        }
        if let Some(req) = session.frame_request.take() {
            shared.scheduler.cancel_frame(req);
        }
        if let Some(timer) = session.auto_stop.take() {
            shared.scheduler.clear_timeout(timer);
        }

        tracing::info!(
            session = id.0,
            bytes = artifact.len(),
            frames = artifact.frames_encoded,
            dropped = artifact.frames_dropped,
            "recording complete"
        );
        if let Some(cb) = session.on_complete.take() {
            cb(artifact);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/recorder.rs"]
mod tests;
