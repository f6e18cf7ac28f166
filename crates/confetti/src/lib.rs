//! Celebration confetti for the donation flow.
//!
//! A [`ParticleSystem`] spawns bursts of brand-coloured particles, advances
//! them with a fixed drag and gravity, and rasterises the live ones into an
//! RGBA [`Canvas`] that a renderer can lay over its final frame. Coordinates
//! are window pixels with the origin at the top-left and `y` pointing down.

use glam::Vec2;
use rand::prelude::*;

/// Everybody's Cool brand colours, `#185CFC #457CFD #729CFD #AFC6FE #F9F9F9`.
pub const PALETTE: [[u8; 3]; 5] = [
    [0x18, 0x5c, 0xfc],
    [0x45, 0x7c, 0xfd],
    [0x72, 0x9c, 0xfd],
    [0xaf, 0xc6, 0xfe],
    [0xf9, 0xf9, 0xf9],
];

/// Particles spawned by a donation burst.
pub const DEFAULT_BURST: usize = 50;
/// Seconds from spawn until a particle disappears.
pub const LIFETIME: f32 = 0.8;
/// Diameter in pixels at full scale.
pub const PARTICLE_SIZE: f32 = 8.0;

const MIN_TRAVEL: f32 = 100.0;
const MAX_TRAVEL: f32 = 300.0;
const MAX_UPWARD_BIAS: f32 = 100.0;
/// Exponential velocity decay per second.
const DRAG: f32 = 4.0;
/// Downward acceleration in pixels per second squared.
const GRAVITY: f32 = 60.0;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CanvasError {
    #[error("canvas must have a non-zero area, got {width}x{height}")]
    ZeroArea { width: u32, height: u32 },
}

/// One piece of confetti.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    /// Rotation in radians and its rate of change.
    pub rotation: f32,
    pub spin: f32,
    pub color: [u8; 3],
    pub age: f32,
}

impl Particle {
    /// Normalised age in `0..=1`.
    pub fn progress(&self) -> f32 {
        (self.age / LIFETIME).clamp(0.0, 1.0)
    }

    /// Fades linearly from fully opaque to transparent.
    pub fn opacity(&self) -> f32 {
        1.0 - self.progress()
    }

    /// Grows from nothing to full size with an ease-out curve.
    pub fn scale(&self) -> f32 {
        let t = self.progress();
        1.0 - (1.0 - t) * (1.0 - t)
    }

    pub fn radius(&self) -> f32 {
        0.5 * PARTICLE_SIZE * self.scale()
    }

    pub fn is_alive(&self) -> bool {
        self.age < LIFETIME
    }
}

/// Initial speed so that exponential drag alone carries a particle
/// `distance` pixels by the end of its lifetime.
fn launch_speed(distance: f32) -> f32 {
    distance * DRAG / (1.0 - (-DRAG * LIFETIME).exp())
}

pub struct ParticleSystem {
    particles: Vec<Particle>,
    rng: StdRng,
}

impl ParticleSystem {
    pub fn new(seed: u64) -> Self {
        Self {
            particles: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Spawns `count` particles at `origin`.
    pub fn burst(&mut self, origin: Vec2, count: usize) {
        self.particles.reserve(count);
        for _ in 0..count {
            let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let travel = self.rng.gen_range(MIN_TRAVEL..=MAX_TRAVEL);
            let lift = self.rng.gen_range(0.0..=MAX_UPWARD_BIAS);
            let displacement = Vec2::new(angle.cos(), angle.sin()) * travel - Vec2::Y * lift;
            let speed = launch_speed(displacement.length());
            let velocity = displacement.normalize_or_zero() * speed;
            let color = PALETTE[self.rng.gen_range(0..PALETTE.len())];
            let rotation = self.rng.gen_range(0.0..std::f32::consts::TAU);
            let spin = self.rng.gen_range(-1.0..=1.0) * std::f32::consts::TAU / LIFETIME;
            self.particles.push(Particle {
                position: origin,
                velocity,
                rotation,
                spin,
                color,
                age: 0.0,
            });
        }
    }

    /// Advances every particle by `dt` seconds and drops expired ones.
    pub fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let decay = (-DRAG * dt).exp();
        for particle in &mut self.particles {
            particle.position += particle.velocity * dt;
            particle.velocity = particle.velocity * decay + Vec2::Y * GRAVITY * dt;
            particle.rotation += particle.spin * dt;
            particle.age += dt;
        }
        self.particles.retain(Particle::is_alive);
    }

    /// Clears `canvas` and draws every live particle as a filled disc.
    pub fn rasterize(&self, canvas: &mut Canvas) {
        canvas.clear();
        for particle in &self.particles {
            let alpha = particle.opacity();
            let radius = particle.radius();
            if alpha <= 0.0 || radius <= 0.0 {
                continue;
            }
            canvas.fill_disc(particle.position, radius, particle.color, alpha);
        }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// True once every particle has expired.
    pub fn is_idle(&self) -> bool {
        self.is_empty()
    }
}

/// Straight-alpha RGBA8 image, rows stored top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self, CanvasError> {
        if width == 0 || height == 0 {
            return Err(CanvasError::ZeroArea { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Reallocates to a new size. The contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), CanvasError> {
        *self = Self::new(width, height)?;
        Ok(())
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        let mut out = [0; 4];
        out.copy_from_slice(&self.pixels[offset..offset + 4]);
        Some(out)
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Source-over blends a disc. Pixels count as covered when their centre
    /// falls inside the disc.
    fn fill_disc(&mut self, centre: Vec2, radius: f32, color: [u8; 3], alpha: f32) {
        let min_x = (centre.x - radius).floor().max(0.0) as u32;
        let min_y = (centre.y - radius).floor().max(0.0) as u32;
        let max_x = (centre.x + radius).ceil().min(self.width as f32);
        let max_y = (centre.y + radius).ceil().min(self.height as f32);
        if max_x <= 0.0 || max_y <= 0.0 {
            return;
        }
        let (max_x, max_y) = (max_x as u32, max_y as u32);
        let radius_sq = radius * radius;
        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                if p.distance_squared(centre) > radius_sq {
                    continue;
                }
                let offset = self.offset(x, y);
                blend_over(&mut self.pixels[offset..offset + 4], color, alpha);
            }
        }
    }
}

fn blend_over(dst: &mut [u8], color: [u8; 3], alpha: f32) {
    let src_a = alpha.clamp(0.0, 1.0);
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for channel in 0..3 {
        let src = color[channel] as f32;
        let below = dst[channel] as f32;
        let value = (src * src_a + below * dst_a * (1.0 - src_a)) / out_a;
        dst[channel] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round() as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centre() -> Vec2 {
        Vec2::new(400.0, 300.0)
    }

    #[test]
    fn burst_spawns_requested_count_at_origin() {
        let mut system = ParticleSystem::new(7);
        system.burst(centre(), DEFAULT_BURST);
        assert_eq!(system.len(), DEFAULT_BURST);
        for particle in system.particles() {
            assert_eq!(particle.position, centre());
            assert_eq!(particle.age, 0.0);
            assert!(PALETTE.contains(&particle.color));
            assert_eq!(particle.scale(), 0.0);
            assert_eq!(particle.opacity(), 1.0);
        }
    }

    #[test]
    fn same_seed_gives_same_burst() {
        let mut a = ParticleSystem::new(42);
        let mut b = ParticleSystem::new(42);
        a.burst(centre(), 20);
        b.burst(centre(), 20);
        assert_eq!(a.particles(), b.particles());
    }

    #[test]
    fn particles_expire_after_lifetime() {
        let mut system = ParticleSystem::new(1);
        system.burst(centre(), 30);
        let dt = 1.0 / 60.0;
        let mut elapsed = 0.0;
        while elapsed < LIFETIME - 0.1 {
            system.step(dt);
            elapsed += dt;
        }
        assert_eq!(system.len(), 30);
        for _ in 0..12 {
            system.step(dt);
        }
        assert!(system.is_idle());
        for particle in system.particles() {
            assert!(particle.age < LIFETIME);
        }
    }

    #[test]
    fn particles_travel_roughly_their_sampled_distance() {
        let mut system = ParticleSystem::new(3);
        system.burst(centre(), 100);
        let dt = 1.0 / 120.0;
        for _ in 0..90 {
            system.step(dt);
        }
        assert_eq!(system.len(), 100);
        let mut total = 0.0;
        for particle in system.particles() {
            let travelled = particle.position.distance(centre());
            assert!(travelled < 450.0, "travelled {travelled}");
            total += travelled;
        }
        let mean = total / 100.0;
        assert!(mean > 100.0 && mean < 350.0, "mean {mean}");
    }

    #[test]
    fn opacity_fades_and_scale_grows() {
        let mut system = ParticleSystem::new(5);
        system.burst(centre(), 1);
        system.step(0.2);
        let early = system.particles()[0].clone();
        system.step(0.4);
        let late = system.particles()[0].clone();
        assert!(late.opacity() < early.opacity());
        assert!(late.scale() > early.scale());
        assert!(late.radius() <= PARTICLE_SIZE / 2.0);
    }

    #[test]
    fn non_positive_step_is_ignored() {
        let mut system = ParticleSystem::new(9);
        system.burst(centre(), 3);
        let before = system.particles().to_vec();
        system.step(0.0);
        system.step(-1.0);
        assert_eq!(system.particles(), before.as_slice());
    }

    #[test]
    fn canvas_rejects_zero_area() {
        assert_eq!(
            Canvas::new(0, 10),
            Err(CanvasError::ZeroArea {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn rasterize_draws_live_particles_and_clears_old_pixels() {
        let mut canvas = Canvas::new(64, 64).expect("canvas");
        let mut system = ParticleSystem::new(11);
        system.burst(Vec2::new(32.0, 32.0), 1);
        system.particles[0].velocity = Vec2::ZERO;
        system.particles[0].age = LIFETIME * 0.5;

        system.rasterize(&mut canvas);
        let [r, g, b, a] = canvas.pixel(32, 32).expect("inside");
        assert!(a > 0 && a < 255);
        assert!(PALETTE.contains(&[r, g, b]));
        assert_eq!(canvas.pixel(0, 0), Some([0, 0, 0, 0]));

        system.particles.clear();
        system.rasterize(&mut canvas);
        assert!(canvas.as_bytes().iter().all(|&byte| byte == 0));
    }

    #[test]
    fn discs_clip_at_canvas_edges() {
        let mut canvas = Canvas::new(8, 8).expect("canvas");
        canvas.fill_disc(Vec2::new(-1.0, -1.0), 3.0, PALETTE[0], 1.0);
        assert_eq!(canvas.pixel(0, 0), Some([0x18, 0x5c, 0xfc, 255]));
        assert_eq!(canvas.pixel(7, 7), Some([0, 0, 0, 0]));
        canvas.fill_disc(Vec2::new(100.0, 100.0), 3.0, PALETTE[0], 1.0);
    }

    #[test]
    fn overlapping_discs_blend_source_over() {
        let mut canvas = Canvas::new(4, 4).expect("canvas");
        canvas.fill_disc(Vec2::new(2.0, 2.0), 2.0, [255, 255, 255], 1.0);
        canvas.fill_disc(Vec2::new(2.0, 2.0), 2.0, [0, 0, 0], 0.25);
        assert_eq!(canvas.pixel(1, 1), Some([191, 191, 191, 255]));
    }

    #[test]
    fn resize_clears_contents() {
        let mut canvas = Canvas::new(4, 4).expect("canvas");
        canvas.fill_disc(Vec2::new(2.0, 2.0), 2.0, PALETTE[1], 1.0);
        canvas.resize(6, 2).expect("resize");
        assert_eq!((canvas.width(), canvas.height()), (6, 2));
        assert_eq!(canvas.as_bytes().len(), 6 * 2 * 4);
        assert!(canvas.as_bytes().iter().all(|&byte| byte == 0));
    }
}
