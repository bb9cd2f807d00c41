//! Strata composites several independently animated render surfaces into one video.
//!
//! The public API is recorder-oriented:
//!
//! - Attach surfaces to a [`SurfaceRegistry`] (or implement [`SurfaceProvider`])
//! - Create a [`Recorder`] with an [`EncoderFactory`] and a [`FrameScheduler`]
//! - [`Recorder::start`] / [`Recorder::stop`], then receive the [`Artifact`] exactly once
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Encoding profiles, encoders and the encoder thread.
pub mod encode;
/// Frame buffers and compositing.
pub mod render;
/// Recording sessions.
pub mod session;
/// Render surfaces and discovery.
pub mod surface;

pub use crate::foundation::core::{Canvas, Fps, FrameIndex, Rgba8Premul};
pub use crate::foundation::error::{StrataError, StrataResult};

pub use crate::encode::encoder::{
    Artifact, ChunkEncoder, EncoderConfig, EncoderFactory, open_encoder,
};
pub use crate::encode::ffmpeg::{FfmpegEncoderFactory, is_ffmpeg_on_path};
pub use crate::encode::memory::InMemoryEncoderFactory;
pub use crate::encode::pipeline::{EncoderPipeline, SubmitOutcome};
pub use crate::encode::profile::{
    Container, EncodingProfile, VideoCodec, default_preferences, negotiate_profile,
};
pub use crate::render::composite::{CompositeReport, Compositor, blit_stretched_over};
pub use crate::render::frame::FrameRGBA;
pub use crate::session::pacing::FramePacer;
pub use crate::session::recorder::{
    CompletionCallback, CompletionHandle, Recorder, RecorderOpts, RecorderState, SessionId,
    SessionStats, StartOutcome,
};
pub use crate::session::schedule::{
    CallbackId, FrameScheduler, IntervalScheduler, ManualScheduler,
};
pub use crate::surface::{PixelSurface, RenderSurface, SurfaceId, SurfaceProvider, SurfaceRegistry};
