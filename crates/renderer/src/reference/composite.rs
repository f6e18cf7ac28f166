use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use super::buffer::PixelBuffer;
use super::tensor::LUMA;

const BANDS: f32 = 15.0;
const SATURATION: f32 = 1.5;
const SATURATION_WEIGHTS: Vec3 = Vec3::new(0.2125, 0.7154, 0.0721);

/// ACES filmic curve, clamped to `[0, 1]`.
pub fn aces(x: Vec3) -> Vec3 {
    const A: f32 = 2.51;
    const B: f32 = 0.03;
    const C: f32 = 2.43;
    const D: f32 = 0.59;
    const E: f32 = 0.14;
    ((x * (A * x + B)) / (x * (C * x + D) + E)).clamp(Vec3::ZERO, Vec3::ONE)
}

fn saturate(rgb: Vec3, amount: f32) -> Vec3 {
    Vec3::splat(rgb.dot(SATURATION_WEIGHTS)).lerp(rgb, amount)
}

/// Posterised luminance band, clamped to `[0.2, 0.7]`.
pub fn band(luminance: f32) -> f32 {
    ((luminance * BANDS + 0.5).floor() / BANDS).clamp(0.2, 0.7)
}

/// Tone pipeline for one texel before the paper multiply. Alpha is the content mask.
pub fn tone(rgb: Vec3) -> Vec4 {
    let mask = if rgb.length() >= 0.001 { 1.0 } else { 0.0 };
    let q = band(rgb.dot(LUMA));
    let banded = if q < 0.5 {
        Vec3::splat(0.1).lerp(rgb, q * 2.0)
    } else {
        rgb.lerp(Vec3::ONE, (q - 0.5) * 2.0)
    };
    aces(saturate(banded, SATURATION)).extend(mask)
}

/// Final composition: posterise, saturate, tone-map and multiply by the paper
/// texture stretched across the whole surface.
pub fn compose(filtered: &PixelBuffer, paper: &PixelBuffer) -> PixelBuffer {
    let size = filtered.size().as_vec2();
    PixelBuffer::from_fn(filtered.size(), |x, y| {
        let uv = (Vec2::new(x as f32, y as f32) + Vec2::splat(0.5)) / size;
        tone(filtered.get(x, y).xyz()) * paper.sample_uv(uv)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SurfaceSize;

    #[test]
    fn empty_pixels_are_masked_out() {
        assert_eq!(tone(Vec3::ZERO).w, 0.0);
        assert_eq!(tone(Vec3::splat(0.0004)).w, 0.0);
        assert_eq!(tone(Vec3::new(0.01, 0.0, 0.0)).w, 1.0);
    }

    #[test]
    fn bands_are_clamped() {
        assert_eq!(band(0.0), 0.2);
        assert_eq!(band(1.0), 0.7);
        assert!((band(0.4) - 6.0 / 15.0).abs() < 1e-6);
    }

    #[test]
    fn aces_maps_into_unit_range() {
        assert_eq!(aces(Vec3::ZERO), Vec3::ZERO);
        let bright = aces(Vec3::splat(100.0));
        assert!(bright.min_element() > 0.99 && bright.max_element() <= 1.0);
        let mid = aces(Vec3::splat(0.5));
        assert!((mid.x - 0.6163).abs() < 1e-3);
    }

    #[test]
    fn white_paper_leaves_tone_unchanged() {
        let size = SurfaceSize::new(4, 4).expect("size");
        let colour = Vec4::new(0.3, 0.6, 0.2, 1.0);
        let filtered = PixelBuffer::filled(size, colour);
        let paper = PixelBuffer::filled(size, Vec4::ONE);
        let output = compose(&filtered, &paper);
        let expected = tone(colour.xyz());
        for pixel in output.pixels() {
            assert!((*pixel - expected).abs().max_element() < 1e-6);
        }
    }

    #[test]
    fn paper_darkens_output() {
        let size = SurfaceSize::new(2, 2).expect("size");
        let filtered = PixelBuffer::filled(size, Vec4::new(0.5, 0.5, 0.5, 1.0));
        let grey = PixelBuffer::filled(size, Vec4::splat(0.5));
        let white = PixelBuffer::filled(size, Vec4::ONE);
        let on_grey = compose(&filtered, &grey).get(0, 0);
        let on_white = compose(&filtered, &white).get(0, 0);
        assert!((on_grey * 2.0 - on_white).abs().max_element() < 1e-6);
        assert_eq!(on_grey.w, 0.5);
    }
}
