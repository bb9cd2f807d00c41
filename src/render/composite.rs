use crate::foundation::core::{Canvas, Rgba8Premul};
use crate::foundation::error::{StrataError, StrataResult, panic_message};
use crate::foundation::math::mul_div255_u16;
use crate::render::frame::FrameRGBA;
use crate::surface::{RenderSurface, SurfaceId};
use rayon::prelude::*;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Premultiplied source-over for one pixel.
pub(crate) fn over(dst: [u8; 4], src: [u8; 4]) -> [u8; 4] {
    match src[3] {
        0 => return dst,
        255 => return src,
        _ => {}
    }
    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        let v = u16::from(src[i]) + mul_div255_u16(u16::from(dst[i]), inv);
        out[i] = v.min(255) as u8;
    }
    out
}

/// Draw `src` over `dst`, stretched to `rect` with nearest-neighbor sampling.
///
/// `rect` is in destination pixel space and is clipped to the destination. Aspect ratio is not
/// preserved.
pub fn blit_stretched_over(
    dst: &mut FrameRGBA,
    src: &FrameRGBA,
    rect: kurbo::Rect,
) -> StrataResult<()> {
    dst.validate()?;
    src.validate()?;
    if src.canvas().is_empty() {
        return Err(StrataError::surface("cannot draw a zero-sized source"));
    }

    let rect = rect.abs();
    if ![rect.x0, rect.y0, rect.x1, rect.y1]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(StrataError::validation("blit rect must be finite"));
    }
    if rect.width() <= 0.0 || rect.height() <= 0.0 {
        return Ok(());
    }

    let clamp_x = |v: f64| v.round().clamp(0.0, f64::from(dst.width)) as usize;
    let clamp_y = |v: f64| v.round().clamp(0.0, f64::from(dst.height)) as usize;
    let (px0, px1) = (clamp_x(rect.x0), clamp_x(rect.x1));
    let (py0, py1) = (clamp_y(rect.y0), clamp_y(rect.y1));
    if px0 >= px1 || py0 >= py1 {
        return Ok(());
    }

    let (sw, sh) = (src.width as usize, src.height as usize);
    let sample = |d: usize, origin: f64, extent: f64, n: usize| -> usize {
        let u = ((d as f64 + 0.5) - origin) / extent * n as f64;
        (u.floor().max(0.0) as usize).min(n - 1)
    };
    let src_cols: Vec<usize> = (px0..px1)
        .map(|x| sample(x, rect.x0, rect.width(), sw))
        .collect();

    let dst_stride = dst.width as usize * 4;
    let src_stride = sw * 4;
    dst.data
        .par_chunks_exact_mut(dst_stride)
        .enumerate()
        .skip(py0)
        .take(py1 - py0)
        .for_each(|(y, row)| {
            let sy = sample(y, rect.y0, rect.height(), sh);
            let src_row = &src.data[sy * src_stride..(sy + 1) * src_stride];
            for (i, &sx) in src_cols.iter().enumerate() {
                let di = (px0 + i) * 4;
                let s = &src_row[sx * 4..sx * 4 + 4];
                let d = &mut row[di..di + 4];
                let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
                d.copy_from_slice(&out);
            }
        });
    Ok(())
}

/// Per-tick composite outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompositeReport {
    /// Surfaces drawn successfully.
    pub drawn: usize,
    /// Surfaces skipped because they are not presented.
    pub hidden: usize,
    /// Surfaces whose draw failed this tick.
    pub failed: usize,
}

/// Fixed-size destination buffer that layers surfaces once per tick.
///
/// Each tick clears to the opaque background, then draws every presented surface lowest layer
/// first, stretched to the full frame. Draw failures never abort a tick.
pub struct Compositor {
    frame: FrameRGBA,
    background: Rgba8Premul,
    warn_after: u32,
    consecutive_failures: HashMap<SurfaceId, u32>,
}

impl Compositor {
    /// Create a compositor with a fixed output size.
    pub fn new(canvas: Canvas, background: Rgba8Premul) -> StrataResult<Self> {
        if canvas.is_empty() {
            return Err(StrataError::validation(format!(
                "composite size must be non-zero, got {canvas}"
            )));
        }
        if !background.is_opaque() {
            return Err(StrataError::validation(
                "composite background must be fully opaque",
            ));
        }
        Ok(Self {
            frame: FrameRGBA::filled(canvas, background)?,
            background,
            warn_after: 0,
            consecutive_failures: HashMap::new(),
        })
    }

    /// Warn once when a surface fails `n` ticks in a row. `0` disables the warning.
    pub fn with_failure_warn_threshold(mut self, n: u32) -> Self {
        self.warn_after = n;
        self
    }

    /// Output dimensions (fixed for the compositor's lifetime).
    pub fn canvas(&self) -> Canvas {
        self.frame.canvas()
    }

    /// The most recently composited frame.
    pub fn frame(&self) -> &FrameRGBA {
        &self.frame
    }

    /// Run one composite tick over `surfaces` (lowest layer first).
    pub fn composite(&mut self, surfaces: &[Arc<dyn RenderSurface>]) -> CompositeReport {
        self.frame.fill(self.background);
        let dst = self.frame.canvas().rect();

        let mut report = CompositeReport::default();
        for surface in surfaces {
            let id = surface.id();
            if !surface.is_presented() {
                report.hidden += 1;
                continue;
            }
            let frame = &mut self.frame;
            // A panicking surface counts as a failed draw for this tick.
            let drawn =
                std::panic::catch_unwind(AssertUnwindSafe(|| surface.draw_into(frame, dst)))
                    .unwrap_or_else(|payload| {
                        Err(StrataError::surface(format!(
                            "{id} panicked while drawing: {}",
                            panic_message(payload.as_ref())
                        )))
                    });
            match drawn {
                Ok(()) => {
                    report.drawn += 1;
                    self.consecutive_failures.remove(&id);
                }
                Err(err) => {
                    report.failed += 1;
                    let count = self.consecutive_failures.entry(id).or_insert(0);
                    *count = count.saturating_add(1);
                    tracing::debug!(surface = %id, error = %err, "skipping surface this tick");
                    if self.warn_after > 0 && *count == self.warn_after {
                        tracing::warn!(
                            surface = %id,
                            failures = *count,
                            error = %err,
                            "surface keeps failing to draw"
                        );
                    }
                }
            }
        }
        report
    }

    /// Consecutive failed draws recorded for `id`.
    pub fn consecutive_failures(&self, id: SurfaceId) -> u32 {
        self.consecutive_failures.get(&id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
