//! CPU evaluation of the procedural planet.
//!
//! Mirrors `SCENE_FRAGMENT` in `compile.rs` line for line so the two can be
//! compared by eye. Screen-space derivatives are replaced with the analytic
//! derivative of `length(uv / PLANET_RADIUS)`.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use super::buffer::PixelBuffer;
use crate::types::FrameInputs;

pub const SEED: f32 = 0.0;
pub const PLANET_RADIUS: f32 = 0.9;
pub const ROTATION_AXIS: Vec3 = Vec3::new(0.3, 1.0, 0.0);
pub const ROTATION_SPEED: f32 = 0.2;
const CAMERA: Vec3 = Vec3::new(0.0, 0.0, -1.0);
const LAND_COLOR: Vec3 = Vec3::new(0.2, 0.4, 0.0);
const JUNGLE_COLOR: Vec3 = Vec3::new(0.0, 0.2, 0.0);
const DESERT_COLOR: Vec3 = Vec3::new(1.0, 0.8, 0.6);
const SNOW_COLOR: Vec3 = Vec3::new(0.85, 0.85, 0.5);
const OCEAN_SIZE: f32 = 0.57;
const OCEAN_COLOR: Vec3 = Vec3::new(0.1, 0.15, 0.35);
const ATMOSPHERE_COLOR: Vec3 = Vec3::new(0.4, 0.6, 1.0);
const ATMOSPHERE_DENSITY: f32 = 0.6;
const DAWN_COLOR: Vec3 = Vec3::new(1.0, 0.7, 0.0);
const SUNSET_COLOR: Vec3 = Vec3::new(1.0, 0.1, 0.0);
const CLOUD_COLOR: Vec3 = Vec3::splat(0.8);
const AMBIENT_LIGHT: f32 = 0.2;
const LIGHT1_POS: Vec3 = Vec3::new(0.0, 0.0, -50.0);
const LIGHT1_STRENGTH: f32 = 0.9;
const LIGHT2_POS: Vec3 = Vec3::new(8.0, 12.0, 4.0);
const LIGHT2_STRENGTH: f32 = 1.0;

fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn glsl_mod(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn hash12(p: Vec2, scale: f32) -> f32 {
    let mut p = Vec2::new(glsl_mod(p.x, scale), glsl_mod(p.y, scale));
    p.y += SEED;
    fract((p.dot(Vec2::new(12.9898, 4.1414))).sin() * 43_758.547)
}

fn noise(p: Vec2, scale: f32) -> f32 {
    let p = p * scale;
    let f = Vec2::new(fract(p.x), fract(p.y));
    let p = p.floor();
    mix(
        mix(hash12(p, scale), hash12(p + Vec2::X, scale), f.x),
        mix(
            hash12(p + Vec2::Y, scale),
            hash12(p + Vec2::ONE, scale),
            f.x,
        ),
        f.y,
    )
}

fn fbm(p: Vec2, mut scale: f32, octaves: u32) -> f32 {
    let (mut sum, mut norm, mut amplitude) = (0.0, 0.0, 1.0);
    for _ in 0..octaves {
        sum += amplitude * noise(p, scale);
        norm += amplitude;
        amplitude *= 0.6;
        scale *= 2.0;
    }
    sum / norm
}

fn swirly_fbm(mut p: Vec2, mut scale: f32, octaves: u32, time: f32) -> f32 {
    p -= Vec2::splat(time * 0.004);
    let (mut sum, mut norm, mut amplitude) = (0.0, 0.0, 1.0);
    for _ in 0..octaves {
        sum += amplitude * noise(p + Vec2::splat(time * 0.004 * amplitude), scale);
        norm += amplitude;
        amplitude *= 0.6;
        scale *= 2.0;
        p += Vec2::new((sum * TAU).cos(), (sum * TAU).sin()) / scale * 0.4;
    }
    sum / norm
}

fn lookat(v: Vec3) -> Vec3 {
    let f = CAMERA.normalize();
    let s = Vec3::new(-f.z, 0.0, f.x).normalize();
    let u = s.cross(f);
    v.x * s + v.y * u + v.z * -f
}

fn rot_axis(v: Vec3, axis: Vec3, angle: f32) -> Vec3 {
    let q = axis * (angle * 0.5).sin();
    let w = (angle * 0.5).cos();
    v + 2.0 * q.cross(q.cross(v) + w * v)
}

/// Camera-space sphere normal, spun around the planet's axis.
fn planet_normal(uv: Vec2, z: f32, spin: f32) -> Vec3 {
    lookat(rot_axis(uv.extend(z), ROTATION_AXIS.normalize(), spin))
}

fn mercator(n: Vec3) -> Vec2 {
    Vec2::new(n.z.atan2(n.x) * 0.5, (-n.y).clamp(-1.0, 1.0).acos()) / PI
}

fn sphere_z(len: f32) -> f32 {
    -(0.999 - len * len).max(0.0).sqrt()
}

fn planet(uv: Vec2, fw: f32, spin: f32) -> Vec4 {
    let len = uv.length();
    if len > 1.0 - fw * 0.3 {
        return Vec4::ZERO;
    }
    let norm = planet_normal(uv, sphere_z(len), spin);
    let muv = mercator(norm);
    let smooth_edge = smoothstep(1.0, 1.0 - fw * 2.0, len);
    let f = fw * 2.0;

    let continent = fbm(muv, 4.0, 7);
    let temp = fbm(muv * 3.0 + Vec2::splat(31.33), 1.0, 4);
    let humid = fbm(muv * 3.0 - Vec2::splat(54.1), 1.0, 4);

    let land = smoothstep(f, 0.0, OCEAN_SIZE - continent);
    let mut col = LAND_COLOR;
    col = col.lerp(DESERT_COLOR, smoothstep(0.25, 0.1, humid));
    let jungle = smoothstep(0.1, 0.3, humid) * smoothstep(0.3, 0.4, temp);
    col = col.lerp(JUNGLE_COLOR, jungle);
    col = col.lerp(SNOW_COLOR, smoothstep(0.3, 0.2, temp));
    col *= continent.sqrt() * land * 1.2 * smoothstep(1.0, 0.99, norm.y.abs());

    let ocean = smoothstep(OCEAN_SIZE, OCEAN_SIZE - f, continent);
    col += (1.0 - continent) * ocean * OCEAN_COLOR;
    col *= (1.0 + 0.1 * (continent.sqrt() * 512.0).cos()).sqrt();
    col.extend(smooth_edge)
}

fn clouds(uv: Vec2, fw: f32, spin: f32, time: f32) -> Vec4 {
    let len = uv.length();
    if len > 1.0 - fw * 0.3 {
        return Vec4::ZERO;
    }
    let norm = planet_normal(uv, sphere_z(len), spin);
    let muv = mercator(norm);
    let cover = swirly_fbm(-muv, 11.0, 6, time) * smoothstep(1.0, 0.99, norm.y.abs());
    CLOUD_COLOR.extend((-cover.powi(6) * 32.0).exp())
}

fn atmosphere(uv: Vec2) -> Vec4 {
    let len = uv.length();
    let altitude = (len - PLANET_RADIUS).max(0.0);
    let norm = lookat(uv.extend(sphere_z(len)));
    let sunset_amount = smoothstep(0.5, -0.3, norm.dot(LIGHT1_POS.normalize()))
        .min(smoothstep(0.5, -0.3, norm.dot(LIGHT2_POS.normalize())));
    let density =
        (-altitude * 7.0 * (1.0 + sunset_amount)).exp() * len * len * ATMOSPHERE_DENSITY;
    let sunset = DAWN_COLOR.lerp(SUNSET_COLOR, (-altitude * 32.0).exp() * sunset_amount);
    let rim = (-altitude * 16.0).exp()
        * smoothstep(PLANET_RADIUS - 0.01, PLANET_RADIUS, len)
        * sunset_amount
        * 1.5;
    ATMOSPHERE_COLOR.lerp(sunset, rim).extend(density)
}

/// Analytic `fwidth(length(q))` where `q = uv / PLANET_RADIUS` and `uv` moves
/// by `2 / min_res` per pixel.
fn planet_fwidth(q: Vec2, min_res: f32) -> f32 {
    let step = 2.0 / min_res / PLANET_RADIUS;
    let len = q.length();
    if len <= f32::EPSILON {
        step
    } else {
        (q.x.abs() + q.y.abs()) / len * step
    }
}

/// Shades one pixel. `frag_coord` uses a bottom-left origin with pixel centres at `+0.5`.
pub fn shade(frag_coord: Vec2, inputs: &FrameInputs) -> Vec4 {
    let resolution = inputs.size.as_vec2();
    let min_res = resolution.x.min(resolution.y);
    let uv = (frag_coord * 2.0 - resolution) / min_res;
    let len = uv.length();
    if len > 1.3 {
        return Vec4::ZERO;
    }

    let time = inputs.time;
    let pointer = inputs.pointer.to_ndc(inputs.size);
    let spin = (pointer.x * 16.0 + time) * ROTATION_SPEED;
    let q = uv / PLANET_RADIUS;
    let fw = planet_fwidth(q, min_res);

    let mut planet_color = planet(q, fw, spin);
    let norm = lookat(uv.extend(sphere_z(len)));
    let light = (norm.dot(LIGHT1_POS.normalize()) * 0.8 + 0.2).max(0.0) * LIGHT1_STRENGTH
        + (norm.dot(LIGHT2_POS.normalize()) * 0.8 + 0.2).max(0.0) * LIGHT2_STRENGTH;

    let mut clouds_color = clouds(q, fw, spin, time);
    clouds_color = (clouds_color.xyz() * (light + AMBIENT_LIGHT)).extend(clouds_color.w);
    let mut atmosphere_color = atmosphere(uv);
    atmosphere_color.w *= smoothstep(1.2, 1.0, len);

    planet_color = (planet_color.xyz() * (light + AMBIENT_LIGHT)).extend(planet_color.w);
    atmosphere_color = (atmosphere_color.xyz() * light).extend(atmosphere_color.w);

    let mut color = planet_color.lerp(clouds_color, clouds_color.w);
    color = color.lerp(atmosphere_color, atmosphere_color.w);
    let color = color.clamp(Vec4::ZERO, Vec4::ONE);
    (color.xyz() * color.w).extend(color.w)
}

/// Renders the full scene buffer for one frame.
pub fn render(inputs: &FrameInputs) -> PixelBuffer {
    PixelBuffer::from_fn(inputs.size, |x, y| {
        shade(Vec2::new(x as f32 + 0.5, y as f32 + 0.5), inputs)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FilterParams, Pointer, SurfaceSize};

    fn inputs(width: u32, height: u32, time: f32) -> FrameInputs {
        FrameInputs {
            time,
            frame_index: 0,
            size: SurfaceSize::new(width, height).expect("size"),
            pointer: Pointer::default(),
            filter: FilterParams::default(),
        }
    }

    #[test]
    fn lookat_is_identity_for_default_camera() {
        let v = Vec3::new(0.25, -0.5, 0.75);
        assert!((lookat(v) - v).length() < 1e-6);
    }

    #[test]
    fn rotation_preserves_length() {
        let v = Vec3::new(0.3, 0.4, -0.5);
        let rotated = rot_axis(v, ROTATION_AXIS.normalize(), 1.234);
        assert!((rotated.length() - v.length()).abs() < 1e-5);
    }

    #[test]
    fn hash_is_deterministic_and_bounded() {
        for i in 0..64 {
            let p = Vec2::new(i as f32 * 0.37, i as f32 * 1.91);
            let value = hash12(p, 4.0);
            assert_eq!(value, hash12(p, 4.0));
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn fbm_is_normalised() {
        for i in 0..32 {
            let value = fbm(Vec2::new(i as f32 * 0.13, 0.7), 4.0, 7);
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn corners_outside_the_disc_are_transparent() {
        let frame = inputs(64, 32, 0.0);
        assert_eq!(shade(Vec2::new(0.5, 0.5), &frame), Vec4::ZERO);
        assert_eq!(shade(Vec2::new(63.5, 31.5), &frame), Vec4::ZERO);
    }

    #[test]
    fn output_is_premultiplied_and_clamped() {
        let frame = inputs(40, 40, 2.0);
        let buffer = render(&frame);
        let mut opaque = 0;
        for pixel in buffer.pixels() {
            assert!(pixel.cmpge(Vec4::ZERO).all() && pixel.cmple(Vec4::ONE).all());
            assert!(pixel.x <= pixel.w + 1e-6);
            assert!(pixel.y <= pixel.w + 1e-6);
            assert!(pixel.z <= pixel.w + 1e-6);
            if pixel.w > 0.5 {
                opaque += 1;
            }
        }
        assert!(opaque > 0, "planet disc should be visible");
    }

    #[test]
    fn scene_is_deterministic_for_a_given_time() {
        let frame = inputs(24, 24, 5.0);
        assert_eq!(render(&frame), render(&frame));
    }

    #[test]
    fn scene_animates_over_time() {
        assert_ne!(render(&inputs(24, 24, 0.0)), render(&inputs(24, 24, 10.0)));
    }
}
