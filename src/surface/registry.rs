use crate::surface::{RenderSurface, SurfaceId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Discovery seam between the recorder and the embedding environment.
pub trait SurfaceProvider: Send + Sync {
    /// All currently presented surfaces, lowest layer first.
    fn discover(&self) -> Vec<Arc<dyn RenderSurface>>;
}

/// Ordered set of attached surfaces. Stacking order is attachment order.
#[derive(Default)]
pub struct SurfaceRegistry {
    surfaces: RwLock<Vec<Arc<dyn RenderSurface>>>,
}

impl SurfaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `surface` on top of the current stack. Re-attaching an id is a no-op.
    pub fn attach(&self, surface: Arc<dyn RenderSurface>) -> SurfaceId {
        let id = surface.id();
        let mut surfaces = self.surfaces.write();
        if !surfaces.iter().any(|s| s.id() == id) {
            surfaces.push(surface);
        }
        id
    }

    /// Remove a surface, returning it when it was attached.
    ///
    /// Sessions that already snapshotted it keep their own handle.
    pub fn detach(&self, id: SurfaceId) -> Option<Arc<dyn RenderSurface>> {
        let mut surfaces = self.surfaces.write();
        let pos = surfaces.iter().position(|s| s.id() == id)?;
        Some(surfaces.remove(pos))
    }

    /// Number of attached surfaces, presented or not.
    pub fn len(&self) -> usize {
        self.surfaces.read().len()
    }

    /// Return `true` when nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.surfaces.read().is_empty()
    }
}

impl SurfaceProvider for SurfaceRegistry {
    fn discover(&self) -> Vec<Arc<dyn RenderSurface>> {
        self.surfaces
            .read()
            .iter()
            .filter(|s| s.is_presented())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/surface/registry.rs"]
mod tests;
