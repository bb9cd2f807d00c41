use crate::foundation::core::{Canvas, Rgba8Premul};
use crate::foundation::error::{StrataError, StrataResult};

/// An RGBA8 pixel buffer, tightly packed, row-major, **premultiplied alpha**.
///
/// Used both as the compositor's destination and as the pixel store behind
/// [`PixelSurface`](crate::PixelSurface).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, `width * height * 4` long.
    pub data: Vec<u8>,
}

impl FrameRGBA {
    /// Allocate a fully transparent frame.
    pub fn new(canvas: Canvas) -> StrataResult<Self> {
        Self::filled(canvas, Rgba8Premul::transparent())
    }

    /// Allocate a frame filled with `color`.
    pub fn filled(canvas: Canvas, color: Rgba8Premul) -> StrataResult<Self> {
        let len = canvas.rgba_len()?;
        let mut data = vec![0u8; len];
        if color != Rgba8Premul::transparent() {
            let px = color.to_array();
            for d in data.chunks_exact_mut(4) {
                d.copy_from_slice(&px);
            }
        }
        Ok(Self {
            width: canvas.width,
            height: canvas.height,
            data,
        })
    }

    /// Dimensions of this frame.
    pub fn canvas(&self) -> Canvas {
        Canvas::new(self.width, self.height)
    }

    /// Check that `data` matches `width * height * 4`.
    pub fn validate(&self) -> StrataResult<()> {
        let expected = self.canvas().rgba_len()?;
        if self.data.len() != expected {
            return Err(StrataError::validation(format!(
                "frame data is {} bytes, expected {} for {}",
                self.data.len(),
                expected,
                self.canvas()
            )));
        }
        Ok(())
    }

    /// Overwrite every pixel with `color`.
    pub fn fill(&mut self, color: Rgba8Premul) {
        let px = color.to_array();
        for d in self.data.chunks_exact_mut(4) {
            d.copy_from_slice(&px);
        }
    }

    /// Read one pixel, `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize * self.width as usize) + x as usize) * 4;
        let s = self.data.get(i..i + 4)?;
        Some([s[0], s[1], s[2], s[3]])
    }

    /// Fill the pixel-aligned rectangle `[x0, x1) x [y0, y1)` (clipped) with `color`.
    pub fn fill_rect(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgba8Premul) {
        let px = color.to_array();
        let (x1, y1) = (x1.min(self.width), y1.min(self.height));
        let stride = self.width as usize * 4;
        for y in y0.min(y1)..y1 {
            let row = &mut self.data[y as usize * stride..(y as usize + 1) * stride];
            for d in row[x0.min(x1) as usize * 4..x1 as usize * 4].chunks_exact_mut(4) {
                d.copy_from_slice(&px);
            }
        }
    }

    /// Convert to a straight-alpha `image::RgbaImage` (for PNG export).
    pub fn to_straight_image(&self) -> StrataResult<image::RgbaImage> {
        self.validate()?;
        let mut out = Vec::with_capacity(self.data.len());
        for s in self.data.chunks_exact(4) {
            let a = u16::from(s[3]);
            if a == 0 {
                out.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let unpremul = |c: u8| ((u16::from(c) * 255 + a / 2) / a).min(255) as u8;
            out.extend_from_slice(&[unpremul(s[0]), unpremul(s[1]), unpremul(s[2]), s[3]]);
        }
        image::RgbaImage::from_raw(self.width, self.height, out)
            .ok_or_else(|| StrataError::validation("frame buffer does not match its dimensions"))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/frame.rs"]
mod tests;
