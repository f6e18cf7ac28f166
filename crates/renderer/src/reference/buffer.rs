use glam::{Vec2, Vec4};
use image::{Rgba, RgbaImage};

use crate::types::SurfaceSize;

/// Floating-point RGBA image used by the reference backend.
///
/// Storage is row-major with row 0 at the top (matching the exported PNG),
/// but every accessor takes bottom-left pixel coordinates like `gl_FragCoord`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    size: SurfaceSize,
    pixels: Vec<Vec4>,
}

impl PixelBuffer {
    /// Transparent black buffer.
    pub fn new(size: SurfaceSize) -> Self {
        Self::filled(size, Vec4::ZERO)
    }

    pub fn filled(size: SurfaceSize, value: Vec4) -> Self {
        Self {
            size,
            pixels: vec![value; size.pixel_count()],
        }
    }

    /// Builds a buffer by evaluating `shade(x, y)` at every pixel (bottom-left origin).
    pub fn from_fn(size: SurfaceSize, mut shade: impl FnMut(u32, u32) -> Vec4) -> Self {
        let mut buffer = Self::new(size);
        for row in 0..size.height {
            let y = size.height - 1 - row;
            for x in 0..size.width {
                let index = buffer.offset(x, row);
                buffer.pixels[index] = shade(x, y);
            }
        }
        buffer
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    /// Storage offset of column `x` in top-down `row`.
    fn offset(&self, x: u32, row: u32) -> usize {
        row as usize * self.size.width as usize + x as usize
    }

    fn index(&self, x: u32, y: u32) -> usize {
        self.offset(x, self.size.height - 1 - y)
    }

    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: Vec4) {
        let index = self.index(x, y);
        self.pixels[index] = value;
    }

    /// Texel fetch clamped to the edge.
    pub fn fetch(&self, x: i32, y: i32) -> Vec4 {
        let x = x.clamp(0, self.size.width as i32 - 1) as u32;
        let y = y.clamp(0, self.size.height as i32 - 1) as u32;
        self.get(x, y)
    }

    /// Bilinear sample at a continuous pixel position where texel centres sit
    /// at `i + 0.5`. Addresses outside the buffer clamp to the edge.
    pub fn sample(&self, position: Vec2) -> Vec4 {
        let p = position - Vec2::splat(0.5);
        let base = p.floor();
        let t = p - base;
        let (x0, y0) = (base.x as i32, base.y as i32);
        let top = self.fetch(x0, y0).lerp(self.fetch(x0 + 1, y0), t.x);
        let bottom = self.fetch(x0, y0 + 1).lerp(self.fetch(x0 + 1, y0 + 1), t.x);
        top.lerp(bottom, t.y)
    }

    /// Bilinear sample with normalised coordinates (0..1, bottom-left origin).
    pub fn sample_uv(&self, uv: Vec2) -> Vec4 {
        self.sample(uv * self.size.as_vec2())
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    /// Quantises to 8-bit RGBA, clamping every channel to `[0, 1]`.
    pub fn to_rgba8(&self) -> RgbaImage {
        let mut image = RgbaImage::new(self.size.width, self.size.height);
        for (pixel, value) in image.pixels_mut().zip(&self.pixels) {
            let quantised = (value.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
            *pixel = Rgba([
                quantised.x as u8,
                quantised.y as u8,
                quantised.z as u8,
                quantised.w as u8,
            ]);
        }
        image
    }

    pub fn from_rgba8(image: &RgbaImage) -> Option<Self> {
        let size = SurfaceSize::new(image.width(), image.height())?;
        let pixels = image
            .pixels()
            .map(|pixel| {
                Vec4::new(
                    f32::from(pixel[0]),
                    f32::from(pixel[1]),
                    f32::from(pixel[2]),
                    f32::from(pixel[3]),
                ) / 255.0
            })
            .collect();
        Some(Self { size, pixels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(width: u32, height: u32) -> SurfaceSize {
        SurfaceSize::new(width, height).expect("size")
    }

    #[test]
    fn bottom_left_origin_maps_to_last_row() {
        let mut buffer = PixelBuffer::new(size(2, 3));
        buffer.set(1, 0, Vec4::ONE);
        let image = buffer.to_rgba8();
        assert_eq!(image.get_pixel(1, 2).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn fetch_clamps_to_edge() {
        let buffer = PixelBuffer::from_fn(size(3, 2), |x, y| Vec4::new(x as f32, y as f32, 0.0, 1.0));
        assert_eq!(buffer.fetch(-5, 0), buffer.get(0, 0));
        assert_eq!(buffer.fetch(9, 9), buffer.get(2, 1));
    }

    #[test]
    fn sample_at_texel_centre_is_exact() {
        let buffer = PixelBuffer::from_fn(size(4, 4), |x, y| Vec4::splat((x + 4 * y) as f32));
        assert_eq!(buffer.sample(Vec2::new(2.5, 1.5)), buffer.get(2, 1));
        let between = buffer.sample(Vec2::new(2.0, 1.5));
        assert!((between.x - 5.5).abs() < 1e-6);
    }

    #[test]
    fn wide_rows_index_past_u32_range() {
        let buffer = PixelBuffer {
            size: size(70_000, 70_000),
            pixels: Vec::new(),
        };
        let last = buffer.index(69_999, 0);
        assert_eq!(last, 70_000usize * 70_000 - 1);
        assert!(last > u32::MAX as usize);
    }

    #[test]
    fn rgba8_conversion_quantises() {
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 128, 0, 255]));
        let buffer = PixelBuffer::from_rgba8(&image).expect("buffer");
        let back = buffer.to_rgba8();
        assert_eq!(back.as_raw(), image.as_raw());
    }
}
