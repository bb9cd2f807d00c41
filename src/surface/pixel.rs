use crate::foundation::core::Canvas;
use crate::foundation::error::{StrataError, StrataResult};
use crate::render::composite::blit_stretched_over;
use crate::render::frame::FrameRGBA;
use crate::surface::{RenderSurface, SurfaceId};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A render surface backed by a shared premultiplied RGBA8 buffer.
///
/// The owner animates it with [`PixelSurface::update`] or [`PixelSurface::replace`] from any
/// thread. After [`PixelSurface::release`] the backing store is gone and every draw fails, which
/// is how a detached canvas behaves.
pub struct PixelSurface {
    id: SurfaceId,
    pixels: RwLock<Option<FrameRGBA>>,
    presented: AtomicBool,
}

impl PixelSurface {
    /// Create a transparent surface of `canvas` size.
    pub fn new(canvas: Canvas) -> StrataResult<Self> {
        Ok(Self::from_frame(FrameRGBA::new(canvas)?))
    }

    /// Wrap an existing frame.
    pub fn from_frame(frame: FrameRGBA) -> Self {
        Self {
            id: SurfaceId::next(),
            pixels: RwLock::new(Some(frame)),
            presented: AtomicBool::new(true),
        }
    }

    /// Mutate the pixels in place.
    pub fn update<R>(&self, f: impl FnOnce(&mut FrameRGBA) -> R) -> StrataResult<R> {
        let mut guard = self.pixels.write();
        let frame = guard
            .as_mut()
            .ok_or_else(|| StrataError::surface(format!("{} has been released", self.id)))?;
        Ok(f(frame))
    }

    /// Swap in a new frame, possibly of a different size.
    pub fn replace(&self, frame: FrameRGBA) -> StrataResult<()> {
        frame.validate()?;
        let mut guard = self.pixels.write();
        if guard.is_none() {
            return Err(StrataError::surface(format!(
                "{} has been released",
                self.id
            )));
        }
        *guard = Some(frame);
        Ok(())
    }

    /// Show or hide the surface.
    pub fn set_presented(&self, presented: bool) {
        self.presented.store(presented, Ordering::Relaxed);
    }

    /// Drop the backing store. Subsequent draws fail.
    pub fn release(&self) {
        *self.pixels.write() = None;
    }

    /// Return `true` after [`PixelSurface::release`].
    pub fn is_released(&self) -> bool {
        self.pixels.read().is_none()
    }
}

impl RenderSurface for PixelSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn pixel_size(&self) -> Canvas {
        self.pixels
            .read()
            .as_ref()
            .map(FrameRGBA::canvas)
            .unwrap_or(Canvas::new(0, 0))
    }

    fn is_presented(&self) -> bool {
        self.presented.load(Ordering::Relaxed)
    }

    fn draw_into(&self, target: &mut FrameRGBA, dst: kurbo::Rect) -> StrataResult<()> {
        let guard = self.pixels.read();
        let src = guard
            .as_ref()
            .ok_or_else(|| StrataError::surface(format!("{} has been released", self.id)))?;
        blit_stretched_over(target, src, dst)
    }
}

impl std::fmt::Debug for PixelSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelSurface")
            .field("id", &self.id)
            .field("size", &self.pixel_size())
            .field("presented", &self.is_presented())
            .finish()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/pixel.rs"]
mod tests;
