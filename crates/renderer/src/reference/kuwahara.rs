use std::f32::consts::{PI, TAU};

use glam::{Mat2, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::buffer::PixelBuffer;
use super::tensor::LUMA;
use crate::types::{FilterParams, KUWAHARA_SECTORS};

const ETA: f32 = 0.1;
const LAMBDA: f32 = 0.5;

/// Dominant orientation and eigenvalues `(λ1, λ2)` of a structure tensor texel.
pub fn orientation(tensor: Vec4) -> (Vec2, f32, f32) {
    let (jxx, jyy, jxy) = (tensor.x, tensor.y, tensor.z);
    let trace = jxx + jyy;
    let determinant = jxx * jyy - jxy * jxy;
    let root = (trace * trace * 0.25 - determinant).max(0.0).sqrt();
    let lambda1 = trace * 0.5 + root;
    let lambda2 = trace * 0.5 - root;

    let strength = jxy.abs() / (jxx.abs() + jyy.abs() + jxy.abs() + 1e-6);
    let direction = if strength > 0.0 {
        Vec2::new(-jxy, jxx - lambda1)
            .try_normalize()
            .unwrap_or(Vec2::Y)
    } else {
        Vec2::Y
    };
    (direction, lambda1, lambda2)
}

/// Rotation by the dominant orientation followed by the anisotropic stretch.
/// Larger `alpha` keeps the kernel closer to a circle.
pub fn anisotropy_transform(tensor: Vec4, alpha: f32) -> Mat2 {
    let (o, lambda1, lambda2) = orientation(tensor);
    let anisotropy = (lambda1 - lambda2) / (lambda1 + lambda2 + 1e-6);
    let scale_x = alpha / (anisotropy + alpha);
    let scale_y = (anisotropy + alpha) / alpha;
    Mat2::from_cols(Vec2::new(o.x, -o.y), Vec2::new(o.y, o.x))
        * Mat2::from_diagonal(Vec2::new(scale_x, scale_y))
}

fn polynomial_weight(offset: Vec2) -> f32 {
    let value = (offset.x + ETA) - LAMBDA * offset.y * offset.y;
    (value * value).max(0.0)
}

struct SectorStats {
    mean: Vec3,
    variance: f32,
}

fn sector(
    scene: &PixelBuffer,
    centre: Vec2,
    transform: Mat2,
    angle: f32,
    radius: u32,
) -> Option<SectorStats> {
    let mut sum = Vec3::ZERO;
    let mut squared = Vec3::ZERO;
    let mut total = 0.0;
    for r in 1..=radius {
        for step in -2..=2 {
            let a = angle + step as f32 * PI / 16.0;
            let offset = transform * (r as f32 * Vec2::new(a.cos(), a.sin()));
            let colour = scene.sample(centre + offset).xyz();
            let weight = polynomial_weight(offset);
            sum += colour * weight;
            squared += colour * colour * weight;
            total += weight;
        }
    }
    if total <= 0.0 {
        return None;
    }
    let mean = sum / total;
    let variance = (squared / total - mean * mean).dot(LUMA);
    Some(SectorStats { mean, variance })
}

/// Evaluates one output pixel at bottom-left coordinates `(x, y)`.
pub fn filter_pixel(
    tensor: &PixelBuffer,
    scene: &PixelBuffer,
    params: &FilterParams,
    x: u32,
    y: u32,
) -> Vec4 {
    let transform = anisotropy_transform(tensor.get(x, y), params.alpha());
    let centre = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);

    let mut best: Option<SectorStats> = None;
    for i in 0..KUWAHARA_SECTORS {
        let angle = i as f32 * TAU / KUWAHARA_SECTORS as f32;
        let Some(stats) = sector(scene, centre, transform, angle, params.radius()) else {
            continue;
        };
        if best.as_ref().map_or(true, |b| stats.variance < b.variance) {
            best = Some(stats);
        }
    }
    match best {
        Some(stats) => stats.mean.extend(1.0),
        None => scene.get(x, y).xyz().extend(1.0),
    }
}

/// Anisotropic Kuwahara filter of `scene`, steered by `tensor`.
pub fn filter(tensor: &PixelBuffer, scene: &PixelBuffer, params: &FilterParams) -> PixelBuffer {
    PixelBuffer::from_fn(scene.size(), |x, y| filter_pixel(tensor, scene, params, x, y))
}
