use crate::encode::profile::{EncodingProfile, negotiate_profile};
use crate::foundation::core::{Canvas, Fps, FrameIndex};
use crate::foundation::error::StrataResult;
use crate::render::frame::FrameRGBA;
use std::path::Path;

/// Parameters an [`EncoderFactory`] builds a stream encoder from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Output frame rate.
    pub fps: Fps,
    /// Negotiated profile. `None` asks for the encoder's own default.
    pub profile: Option<EncodingProfile>,
    /// Target bitrate hint in bits per second. Encoders may ignore it.
    pub bitrate_bps: Option<u32>,
}

impl EncoderConfig {
    /// A config that leaves profile and bitrate to the encoder.
    pub fn unconfigured(canvas: Canvas, fps: Fps) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            fps,
            profile: None,
            bitrate_bps: None,
        }
    }

    /// Frame dimensions.
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }
}

/// Streaming encoder for one recording.
///
/// Frames arrive in strictly increasing [`FrameIndex`] order; gaps mean the composite loop did
/// not produce a frame for those slots. Returned byte chunks are appended to the artifact in
/// order; empty chunks are ignored.
pub trait ChunkEncoder: Send {
    /// MIME type of the produced stream.
    fn mime_type(&self) -> String;
    /// Encode one frame and return any bytes that became available.
    fn encode(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> StrataResult<Vec<u8>>;
    /// Flush and close the stream, returning the trailing bytes.
    fn finish(&mut self) -> StrataResult<Vec<u8>>;
}

/// Capability query and construction seam for encoders.
pub trait EncoderFactory: Send + Sync {
    /// Whether this runtime can produce `profile`.
    fn is_supported(&self, profile: &EncodingProfile) -> bool;
    /// Build an encoder for `cfg`.
    fn create(&self, cfg: &EncoderConfig) -> StrataResult<Box<dyn ChunkEncoder>>;
}

/// Negotiate a profile and construct an encoder, falling back once to an unconfigured default.
///
/// Only the fallback's construction error is returned.
pub fn open_encoder(
    factory: &dyn EncoderFactory,
    preferences: &[EncodingProfile],
    canvas: Canvas,
    fps: Fps,
    bitrate_bps: Option<u32>,
) -> StrataResult<(Box<dyn ChunkEncoder>, EncoderConfig)> {
    match negotiate_profile(preferences, |p| factory.is_supported(p)) {
        Some(profile) => {
            let cfg = EncoderConfig {
                profile: Some(profile),
                bitrate_bps,
                ..EncoderConfig::unconfigured(canvas, fps)
            };
            match factory.create(&cfg) {
                Ok(encoder) => return Ok((encoder, cfg)),
                Err(err) => tracing::warn!(
                    profile = %profile,
                    error = %err,
                    "preferred encoder config failed, falling back to default"
                ),
            }
        }
        None => tracing::warn!("no preferred encoding profile is supported, using default"),
    }

    let cfg = EncoderConfig::unconfigured(canvas, fps);
    let encoder = factory.create(&cfg).inspect_err(|err| {
        tracing::error!(error = %err, "default encoder construction failed");
    })?;
    Ok((encoder, cfg))
}

/// The finished recording.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Artifact {
    /// MIME type reported by the encoder.
    pub mime_type: String,
    /// Concatenated encoded chunks.
    pub data: Vec<u8>,
    /// Number of non-empty chunks that make up `data`.
    pub chunk_count: usize,
    /// Frames the encoder accepted.
    pub frames_encoded: u64,
    /// Frames dropped because the encoder fell behind.
    pub frames_dropped: u64,
    /// Set when the stream ended early because the encoder failed.
    pub error: Option<String>,
}

impl Artifact {
    /// Size of the encoded blob in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Return `true` when no bytes were produced.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the blob to `path`, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> StrataResult<()> {
        use anyhow::Context as _;
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        std::fs::write(path, &self.data)
            .with_context(|| format!("failed to write artifact to '{}'", path.display()))?;
        Ok(())
    }
}

/// Ensure the parent directory of `path` exists.
pub(crate) fn ensure_parent_dir(path: &Path) -> StrataResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/encode/encoder.rs"]
mod tests;
