use crate::foundation::error::{StrataError, StrataResult};
use std::fmt;
use std::str::FromStr;

/// Output container format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Container {
    /// WebM (Matroska subset).
    WebM,
    /// Full Matroska.
    Matroska,
    /// ISO MP4.
    Mp4,
}

impl Container {
    /// MIME type without codec parameters.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::WebM => "video/webm",
            Self::Matroska => "video/x-matroska",
            Self::Mp4 => "video/mp4",
        }
    }

    /// Muxer name understood by `ffmpeg -f`.
    pub fn ffmpeg_format(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Matroska => "matroska",
            Self::Mp4 => "mp4",
        }
    }

    /// Whether `codec` can be stored in this container.
    pub fn accepts(self, codec: VideoCodec) -> bool {
        match self {
            Self::WebM => matches!(codec, VideoCodec::Vp9 | VideoCodec::Vp8 | VideoCodec::Av1),
            Self::Matroska => true,
            Self::Mp4 => matches!(codec, VideoCodec::H264 | VideoCodec::Av1 | VideoCodec::Vp9),
        }
    }

    fn from_mime(s: &str) -> Option<Self> {
        match s {
            "video/webm" => Some(Self::WebM),
            "video/x-matroska" => Some(Self::Matroska),
            "video/mp4" => Some(Self::Mp4),
            _ => None,
        }
    }
}

/// Video codec requested inside a container.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    /// VP9.
    Vp9,
    /// VP8.
    Vp8,
    /// AV1.
    Av1,
    /// H.264 / AVC.
    H264,
}

impl VideoCodec {
    /// Codec token used in the MIME `codecs=` parameter.
    pub fn token(self) -> &'static str {
        match self {
            Self::Vp9 => "vp9",
            Self::Vp8 => "vp8",
            Self::Av1 => "av1",
            Self::H264 => "h264",
        }
    }

    /// Encoder name understood by `ffmpeg -c:v`.
    pub fn ffmpeg_encoder(self) -> &'static str {
        match self {
            Self::Vp9 => "libvpx-vp9",
            Self::Vp8 => "libvpx",
            Self::Av1 => "libaom-av1",
            Self::H264 => "libx264",
        }
    }

    fn from_token(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vp9" | "vp09" => Some(Self::Vp9),
            "vp8" => Some(Self::Vp8),
            "av1" | "av01" => Some(Self::Av1),
            "h264" | "avc1" => Some(Self::H264),
            _ => None,
        }
    }
}

/// A (container, codec) pairing tried in preference order when opening an encoder.
///
/// `codec: None` leaves the codec choice to the encoder. Profiles round-trip through their MIME
/// form, e.g. `video/webm;codecs=vp9`, which is also how they are serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncodingProfile {
    /// Output container.
    pub container: Container,
    /// Requested codec, if any.
    pub codec: Option<VideoCodec>,
}

impl EncodingProfile {
    /// Create a validated profile.
    pub fn new(container: Container, codec: Option<VideoCodec>) -> StrataResult<Self> {
        if let Some(c) = codec
            && !container.accepts(c)
        {
            return Err(StrataError::validation(format!(
                "{} cannot hold {} video",
                container.mime_type(),
                c.token()
            )));
        }
        Ok(Self { container, codec })
    }

    /// Full MIME type including the `codecs` parameter when a codec is set.
    pub fn mime_type(&self) -> String {
        match self.codec {
            Some(c) => format!("{};codecs={}", self.container.mime_type(), c.token()),
            None => self.container.mime_type().to_string(),
        }
    }
}

impl fmt::Display for EncodingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type())
    }
}

impl FromStr for EncodingProfile {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(';');
        let base = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let container = Container::from_mime(&base)
            .ok_or_else(|| StrataError::validation(format!("unknown container in '{s}'")))?;

        let mut codec = None;
        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                return Err(StrataError::validation(format!(
                    "malformed MIME parameter '{param}' in '{s}'"
                )));
            };
            if !key.trim().eq_ignore_ascii_case("codecs") {
                continue;
            }
            let value = value.trim().trim_matches('"');
            // Only the video codec matters here; an audio codec may follow a comma.
            let first = value.split(',').next().unwrap_or_default().trim();
            codec = Some(VideoCodec::from_token(first).ok_or_else(|| {
                StrataError::validation(format!("unknown codec '{first}' in '{s}'"))
            })?);
        }
        Self::new(container, codec)
    }
}

impl TryFrom<String> for EncodingProfile {
    type Error = StrataError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EncodingProfile> for String {
    fn from(p: EncodingProfile) -> Self {
        p.mime_type()
    }
}

/// Default preference order: VP9 WebM, then VP8 WebM, then WebM with any codec.
pub fn default_preferences() -> Vec<EncodingProfile> {
    vec![
        EncodingProfile {
            container: Container::WebM,
            codec: Some(VideoCodec::Vp9),
        },
        EncodingProfile {
            container: Container::WebM,
            codec: Some(VideoCodec::Vp8),
        },
        EncodingProfile {
            container: Container::WebM,
            codec: None,
        },
    ]
}

/// Return the first profile in `preferences` that `is_supported` accepts.
pub fn negotiate_profile(
    preferences: &[EncodingProfile],
    is_supported: impl Fn(&EncodingProfile) -> bool,
) -> Option<EncodingProfile> {
    preferences.iter().copied().find(|p| {
        let ok = is_supported(p);
        tracing::debug!(profile = %p, supported = ok, "probing encoding profile");
        ok
    })
}

#[cfg(test)]
#[path = "../../tests/unit/encode/profile.rs"]
mod tests;
