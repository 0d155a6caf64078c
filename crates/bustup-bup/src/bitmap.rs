//! ARGB32 raster buffers.

use std::path::Path;

use image::{Rgba, RgbaImage};

use crate::Result;

/// Reserved colour for canvas cells no chunk has written yet.
///
/// Alpha is zero, but the colour differs from `0x00000000`, which the
/// container's palettes use for real "no alpha" pixels.
pub const SENTINEL: u32 = 0x00FF_0080;

/// Pure opaque black, the transparency key of the extended variant.
pub const BLACK: u32 = 0xFF00_0000;

/// Colour used to flag black regions the repair pass could not classify.
pub const MARKER: u32 = 0xFFFF_0000;

/// Alpha channel of an ARGB32 value.
#[inline]
pub const fn alpha(argb: u32) -> u8 {
    (argb >> 24) as u8
}

/// Replace the alpha channel of an ARGB32 value.
#[inline]
pub const fn with_alpha(argb: u32, alpha: u8) -> u32 {
    (argb & 0x00FF_FFFF) | (alpha as u32) << 24
}

/// A width × height grid of ARGB32 pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl Bitmap {
    /// Allocate a bitmap filled with one colour.
    pub fn new(width: u32, height: u32, fill: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![fill; width as usize * height as usize],
        }
    }

    /// Wrap existing pixel data.
    ///
    /// `pixels` is resized to `width * height`, padding with transparent black.
    pub fn from_pixels(width: u32, height: u32, mut pixels: Vec<u32>) -> Self {
        pixels.resize(width as usize * height as usize, 0);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// An empty 0 × 0 bitmap.
    pub fn empty() -> Self {
        Self::new(0, 0, 0)
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the bitmap holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// All pixels, row-major.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Whether `(x, y)` lies inside the bitmap.
    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the bitmap.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        assert!(self.contains(x, y), "pixel ({x}, {y}) out of bounds");
        self.pixels[self.index(x, y)]
    }

    /// Pixel at `(x, y)`, or `None` outside the bitmap.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        self.contains(x, y).then(|| self.pixels[self.index(x, y)])
    }

    /// Set the pixel at `(x, y)`; writes outside the bitmap are ignored.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, argb: u32) {
        if self.contains(x, y) {
            let i = self.index(x, y);
            self.pixels[i] = argb;
        }
    }

    /// Copy of the top-left `width` × `height` region.
    pub fn crop(&self, width: u32, height: u32) -> Self {
        let width = width.min(self.width);
        let height = height.min(self.height);
        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let start = self.index(0, y);
            pixels.extend_from_slice(&self.pixels[start..start + width as usize]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Number of pixels equal to `argb`.
    pub fn count(&self, argb: u32) -> usize {
        self.pixels.iter().filter(|&&p| p == argb).count()
    }

    /// Convert to an 8-bit RGBA image.
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let [b, g, r, a] = self.pixel(x, y).to_le_bytes();
            Rgba([r, g, b, a])
        })
    }

    /// Write the bitmap as a PNG with alpha.
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_rgba_image().save(path.as_ref())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_helpers() {
        assert_eq!(alpha(SENTINEL), 0);
        assert_eq!(alpha(BLACK), 0xFF);
        assert_eq!(with_alpha(0xFF123456, 0x40), 0x40123456);
    }

    #[test]
    fn test_crop_keeps_top_left() {
        let mut bitmap = Bitmap::new(4, 3, 0);
        for y in 0..3 {
            for x in 0..4 {
                bitmap.set(x, y, y * 10 + x);
            }
        }
        let cropped = bitmap.crop(2, 2);
        assert_eq!(cropped.width(), 2);
        assert_eq!(cropped.height(), 2);
        assert_eq!(cropped.pixels(), &[0, 1, 10, 11]);

        let clamped = bitmap.crop(10, 10);
        assert_eq!(clamped, bitmap);
    }

    #[test]
    fn test_out_of_bounds_access() {
        let mut bitmap = Bitmap::new(2, 2, SENTINEL);
        bitmap.set(5, 5, BLACK);
        assert_eq!(bitmap.count(SENTINEL), 4);
        assert_eq!(bitmap.get(2, 0), None);
        assert_eq!(bitmap.get(1, 1), Some(SENTINEL));
    }

    #[test]
    fn test_to_rgba_image() {
        let bitmap = Bitmap::from_pixels(2, 1, vec![0x80FF0000, 0xFF0000FF]);
        let image = bitmap.to_rgba_image();
        assert_eq!(image.get_pixel(0, 0).0, [0xFF, 0, 0, 0x80]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0xFF, 0xFF]);
    }
}
