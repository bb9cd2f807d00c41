//! Composite destination buffer and the per-tick layering routine.

/// Stretched premultiplied blits and the [`Compositor`](composite::Compositor).
pub mod composite;
/// RGBA8 frame buffer.
pub mod frame;
