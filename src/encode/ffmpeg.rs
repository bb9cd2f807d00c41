use crate::encode::encoder::{ChunkEncoder, EncoderConfig, EncoderFactory};
use crate::encode::profile::{Container, EncodingProfile};
use crate::foundation::core::{Fps, FrameIndex};
use crate::foundation::error::{StrataError, StrataResult};
use crate::foundation::math::mul_div255_u16;
use crate::render::frame::FrameRGBA;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::OnceLock;
use std::sync::mpsc::{Receiver, channel};

/// Upper bound on repeated frames written to fill one gap in the frame sequence.
const MAX_GAP_FILL: u64 = 300;
const STDOUT_CHUNK_BYTES: usize = 64 * 1024;

/// Encoder factory that streams raw frames through the system `ffmpeg` binary.
///
/// Profile support is probed once from `ffmpeg -encoders`.
pub struct FfmpegEncoderFactory {
    program: PathBuf,
    bg_rgba: [u8; 4],
    encoders: OnceLock<Vec<String>>,
}

impl FfmpegEncoderFactory {
    /// Use `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    /// Use a specific `ffmpeg` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            bg_rgba: [0, 0, 0, 255],
            encoders: OnceLock::new(),
        }
    }

    /// Background color used to flatten alpha (RGBA8, straight alpha).
    pub fn with_background(mut self, bg_rgba: [u8; 4]) -> Self {
        self.bg_rgba = bg_rgba;
        self
    }

    fn encoders(&self) -> &[String] {
        self.encoders.get_or_init(|| {
            let output = Command::new(&self.program)
                .args(["-hide_banner", "-encoders"])
                .stdin(Stdio::null())
                .stderr(Stdio::null())
                .output();
            match output {
                Ok(out) if out.status.success() => {
                    parse_encoder_list(&String::from_utf8_lossy(&out.stdout))
                }
                Ok(out) => {
                    tracing::warn!(status = %out.status, "ffmpeg -encoders failed");
                    Vec::new()
                }
                Err(err) => {
                    tracing::warn!(error = %err, "ffmpeg is not runnable");
                    Vec::new()
                }
            }
        })
    }
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn is_supported(&self, profile: &EncodingProfile) -> bool {
        let encoders = self.encoders();
        match profile.codec {
            Some(codec) => encoders.iter().any(|e| e == codec.ffmpeg_encoder()),
            None => !encoders.is_empty(),
        }
    }

    fn create(&self, cfg: &EncoderConfig) -> StrataResult<Box<dyn ChunkEncoder>> {
        Ok(Box::new(FfmpegEncoder::spawn(
            &self.program,
            cfg,
            self.bg_rgba,
        )?))
    }
}

/// Extract encoder names from `ffmpeg -encoders` output.
fn parse_encoder_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip_while(|l| !l.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|l| l.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

fn build_command(program: &Path, cfg: &EncoderConfig) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Input: raw RGBA8 frames, alpha already flattened in `encode`.
    cmd.args([
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
        &format!("{}x{}", cfg.width, cfg.height),
    ]);
    push_input_fps(&mut cmd, cfg.fps);
    cmd.args(["-i", "pipe:0", "-an"]);

    let container = cfg.profile.map(|p| p.container).unwrap_or(Container::WebM);
    if let Some(codec) = cfg.profile.and_then(|p| p.codec) {
        cmd.args(["-c:v", codec.ffmpeg_encoder()]);
    }
    if let Some(bps) = cfg.bitrate_bps {
        cmd.args(["-b:v", &bps.to_string()]);
    }
    // yuv420p needs even dimensions; pad odd sizes by one pixel.
    cmd.args([
        "-vf",
        "pad=ceil(iw/2)*2:ceil(ih/2)*2",
        "-pix_fmt",
        "yuv420p",
    ]);
    if container == Container::Mp4 {
        // A non-seekable output needs a fragmented MP4.
        cmd.args(["-movflags", "frag_keyframe+empty_moov"]);
    }
    cmd.args(["-f", container.ffmpeg_format(), "pipe:1"]);
    cmd
}

fn push_input_fps(cmd: &mut Command, fps: Fps) {
    // For rawvideo input, `-r` before `-i` sets the input framerate.
    cmd.args(["-r", &format!("{}/{}", fps.num, fps.den)]);
}

/// Streams frames into an `ffmpeg` child; encoded bytes are read back from its stdout.
struct FfmpegEncoder {
    cfg: EncoderConfig,
    bg_rgba: [u8; 4],

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_chunks: Option<Receiver<Vec<u8>>>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegEncoder {
    fn spawn(program: &Path, cfg: &EncoderConfig, bg_rgba: [u8; 4]) -> StrataResult<Self> {
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(StrataError::validation("fps must be non-zero"));
        }
        if cfg.canvas().is_empty() {
            return Err(StrataError::validation(
                "ffmpeg encoder width/height must be non-zero",
            ));
        }

        let mut child = build_command(program, cfg).spawn().map_err(|e| {
            StrataError::encoder(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StrataError::encoder("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| StrataError::encoder("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| StrataError::encoder("failed to open ffmpeg stderr (unexpected)"))?;

        let (chunk_tx, chunk_rx) = channel();
        std::thread::spawn(move || {
            let mut buf = vec![0u8; STDOUT_CHUNK_BYTES];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if chunk_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "reading ffmpeg stdout failed");
                        break;
                    }
                }
            }
        });
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        tracing::info!(
            size = %cfg.canvas(),
            profile = %cfg.profile.map(|p| p.mime_type()).unwrap_or_else(|| "default".to_string()),
            "spawned ffmpeg encoder"
        );
        Ok(Self {
            cfg: cfg.clone(),
            bg_rgba,
            child: Some(child),
            stdin: Some(stdin),
            stdout_chunks: Some(chunk_rx),
            stderr_drain: Some(stderr_drain),
            scratch: vec![0u8; cfg.canvas().rgba_len()?],
            last_idx: None,
        })
    }

    fn write_scratch(&mut self, times: u64) -> StrataResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(StrataError::encoder("ffmpeg encoder is already finalized"));
        };
        use std::io::Write as _;
        for _ in 0..times {
            stdin.write_all(&self.scratch).map_err(|e| {
                StrataError::encoder(format!("failed to write frame to ffmpeg stdin: {e}"))
            })?;
        }
        Ok(())
    }

    fn take_available(&self) -> Vec<u8> {
        self.stdout_chunks
            .as_ref()
            .map(|rx| rx.try_iter().flatten().collect())
            .unwrap_or_default()
    }
}

impl ChunkEncoder for FfmpegEncoder {
    fn mime_type(&self) -> String {
        self.cfg
            .profile
            .map(|p| p.mime_type())
            .unwrap_or_else(|| Container::WebM.mime_type().to_string())
    }

    fn encode(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> StrataResult<Vec<u8>> {
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(StrataError::encoder(
                "ffmpeg encoder received out-of-order frame index",
            ));
        }
        if frame.width != self.cfg.width || frame.height != self.cfg.height {
            return Err(StrataError::validation(format!(
                "frame size mismatch: got {}, expected {}",
                frame.canvas(),
                self.cfg.canvas()
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(StrataError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }

        // Hold the previous frame for skipped slots so output stays constant-rate.
        if let Some(last) = self.last_idx {
            self.write_scratch(held_frames(last, idx))?;
        }
        self.last_idx = Some(idx);

        flatten_premul_over_bg_to_opaque_rgba8(&mut self.scratch, &frame.data, self.bg_rgba)?;
        self.write_scratch(1)?;
        Ok(self.take_available())
    }

    fn finish(&mut self) -> StrataResult<Vec<u8>> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| StrataError::encoder("ffmpeg encoder already finished"))?;

        // The stdout reader exits on EOF, which closes the channel.
        let tail: Vec<u8> = self
            .stdout_chunks
            .take()
            .map(|rx| rx.iter().flatten().collect())
            .unwrap_or_default();

        let status = child.wait().map_err(|e| {
            StrataError::encoder(format!("failed to wait for ffmpeg to finish: {e}"))
        })?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| StrataError::encoder("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| StrataError::encoder(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(StrataError::encoder(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(tail)
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Frames to repeat between `last` and `idx`, capped at [`MAX_GAP_FILL`].
fn held_frames(last: FrameIndex, idx: FrameIndex) -> u64 {
    let gap = idx.0.saturating_sub(last.0).saturating_sub(1);
    if gap > MAX_GAP_FILL {
        tracing::warn!(
            from = last.0,
            to = idx.0,
            gap,
            held = MAX_GAP_FILL,
            "frame gap exceeds hold limit, output will be shorter than wall-clock time"
        );
    }
    gap.min(MAX_GAP_FILL)
}

fn flatten_premul_over_bg_to_opaque_rgba8(
    dst: &mut [u8],
    src_premul: &[u8],
    bg_rgba: [u8; 4],
) -> StrataResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(StrataError::validation(
            "flatten_premul_over_bg_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }

        let inv = 255u16 - a;
        d[0] = (s[0] as u16 + mul_div255_u16(bg_r, inv)).min(255) as u8;
        d[1] = (s[1] as u16 + mul_div255_u16(bg_g, inv)).min(255) as u8;
        d[2] = (s[2] as u16 + mul_div255_u16(bg_b, inv)).min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
