//! Encoding profiles, encoder seams and the asynchronous encoder pipeline.

/// Encoder traits, negotiation with fallback, and the finished [`Artifact`](encoder::Artifact).
pub mod encoder;
/// `ffmpeg`-based encoder (WebM/MP4 via system `ffmpeg`).
pub mod ffmpeg;
/// In-memory encoder for tests and debugging.
pub mod memory;
/// Bounded hand-off to the encoder thread.
pub mod pipeline;
/// Container/codec profiles and preference negotiation.
pub mod profile;
