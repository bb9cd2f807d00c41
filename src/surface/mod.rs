//! Render surfaces: the externally animated pixel sources the recorder composites.
//!
//! The recorder never owns or mutates a surface. It only asks each one, once per composite
//! tick, to draw its current contents into the destination frame.

mod pixel;
mod registry;

pub use pixel::PixelSurface;
pub use registry::{SurfaceProvider, SurfaceRegistry};

use crate::foundation::core::Canvas;
use crate::foundation::error::StrataResult;
use crate::render::frame::FrameRGBA;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a render surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// A continuously updated 2-D pixel source.
///
/// Implementations must tolerate being drawn from the scheduler thread while another thread
/// animates them.
pub trait RenderSurface: Send + Sync {
    /// Stable identity for the lifetime of the surface.
    fn id(&self) -> SurfaceId;

    /// Native pixel dimensions (not the on-screen display size).
    fn pixel_size(&self) -> Canvas;

    /// Whether the surface is currently shown. Hidden surfaces are neither discovered nor drawn.
    fn is_presented(&self) -> bool {
        true
    }

    /// Draw the current contents into `target`, stretched to `dst` (pixel space).
    ///
    /// Errors are transient from the recorder's point of view: the surface is skipped for the
    /// current tick only.
    fn draw_into(&self, target: &mut FrameRGBA, dst: kurbo::Rect) -> StrataResult<()>;
}
