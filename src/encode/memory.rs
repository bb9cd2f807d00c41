use crate::encode::encoder::{ChunkEncoder, EncoderConfig, EncoderFactory};
use crate::encode::profile::EncodingProfile;
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{StrataError, StrataResult};
use crate::render::frame::FrameRGBA;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Bytes emitted per encoded frame: index (u64 LE), width (u32 LE), height (u32 LE).
pub const RECORD_LEN: usize = 16;

/// Encoder factory that keeps every frame in memory, for tests and debugging.
///
/// Supports every profile unless restricted with [`InMemoryEncoderFactory::supporting`].
/// Failure knobs simulate runtimes that reject configured encoders or break mid-stream.
#[derive(Debug, Default)]
pub struct InMemoryEncoderFactory {
    supported: Option<Vec<EncodingProfile>>,
    reject_configured: bool,
    reject_all: bool,
    fail_after_frames: Option<u64>,
    encode_delay: Option<Duration>,

    created: Arc<Mutex<Vec<EncoderConfig>>>,
    frames: Arc<Mutex<Vec<(FrameIndex, FrameRGBA)>>>,
}

impl InMemoryEncoderFactory {
    /// Create a factory that supports everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the supported profiles.
    pub fn supporting(mut self, profiles: Vec<EncodingProfile>) -> Self {
        self.supported = Some(profiles);
        self
    }

    /// Fail construction for any config that names a profile.
    pub fn rejecting_configured(mut self) -> Self {
        self.reject_configured = true;
        self
    }

    /// Fail every construction.
    pub fn rejecting_all(mut self) -> Self {
        self.reject_all = true;
        self
    }

    /// Fail `encode` once `n` frames have been accepted.
    pub fn failing_after(mut self, n: u64) -> Self {
        self.fail_after_frames = Some(n);
        self
    }

    /// Sleep this long in every `encode` call.
    pub fn with_encode_delay(mut self, delay: Duration) -> Self {
        self.encode_delay = Some(delay);
        self
    }

    /// Configs of every encoder built so far.
    pub fn created_configs(&self) -> Vec<EncoderConfig> {
        self.created.lock().clone()
    }

    /// Frames received by all encoders built by this factory, in arrival order.
    pub fn frames(&self) -> Vec<(FrameIndex, FrameRGBA)> {
        self.frames.lock().clone()
    }

    /// Number of frames received so far.
    pub fn frame_count(&self) -> usize {
        self.frames.lock().len()
    }
}

impl EncoderFactory for InMemoryEncoderFactory {
    fn is_supported(&self, profile: &EncodingProfile) -> bool {
        self.supported
            .as_ref()
            .is_none_or(|list| list.contains(profile))
    }

    fn create(&self, cfg: &EncoderConfig) -> StrataResult<Box<dyn ChunkEncoder>> {
        if self.reject_all || (self.reject_configured && cfg.profile.is_some()) {
            return Err(StrataError::encoder(format!(
                "in-memory encoder rejected config for {}",
                cfg.profile
                    .map(|p| p.mime_type())
                    .unwrap_or_else(|| "default profile".to_string())
            )));
        }
        self.created.lock().push(cfg.clone());
        Ok(Box::new(InMemoryEncoder {
            cfg: cfg.clone(),
            accepted: 0,
            fail_after_frames: self.fail_after_frames,
            encode_delay: self.encode_delay,
            frames: Arc::clone(&self.frames),
        }))
    }
}

struct InMemoryEncoder {
    cfg: EncoderConfig,
    accepted: u64,
    fail_after_frames: Option<u64>,
    encode_delay: Option<Duration>,
    frames: Arc<Mutex<Vec<(FrameIndex, FrameRGBA)>>>,
}

impl ChunkEncoder for InMemoryEncoder {
    fn mime_type(&self) -> String {
        self.cfg
            .profile
            .map(|p| p.mime_type())
            .unwrap_or_else(|| "video/webm".to_string())
    }

    fn encode(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> StrataResult<Vec<u8>> {
        if let Some(delay) = self.encode_delay {
            std::thread::sleep(delay);
        }
        if self.fail_after_frames.is_some_and(|n| self.accepted >= n) {
            return Err(StrataError::encoder("in-memory encoder failure injected"));
        }
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(StrataError::validation(format!(
                "frame size mismatch: got {}, expected {}",
                frame.canvas(),
                self.cfg.canvas()
            )));
        }
        self.accepted += 1;
        self.frames.lock().push((idx, frame.clone()));

        let mut chunk = Vec::with_capacity(RECORD_LEN);
        chunk.extend_from_slice(&idx.0.to_le_bytes());
        chunk.extend_from_slice(&frame.width.to_le_bytes());
        chunk.extend_from_slice(&frame.height.to_le_bytes());
        Ok(chunk)
    }

    fn finish(&mut self) -> StrataResult<Vec<u8>> {
        Ok(Vec::new())
    }
}
