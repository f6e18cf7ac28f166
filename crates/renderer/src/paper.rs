//! Paper grain texture used by the composition pass.

use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const PAPER_SIZE: u32 = 512;
pub const PAPER_BASE: [u8; 3] = [0xf8, 0xf8, 0xf8];
pub const SPECKLE_COUNT: usize = 1000;
pub const SPECKLE_SIZE: u32 = 2;
pub const SPECKLE_COLOR: [u8; 3] = [200, 200, 200];
pub const SPECKLE_MAX_ALPHA: f32 = 0.3;
pub const DEFAULT_PAPER_SEED: u64 = 0x5eed_9a9e;

/// Generates the 512×512 paper texture: a flat `#f8f8f8` sheet with 2×2 grey
/// speckles blended source-over at random opacity.
pub fn generate_paper(seed: u64) -> RgbaImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let base = Rgba([PAPER_BASE[0], PAPER_BASE[1], PAPER_BASE[2], 255]);
    let mut paper = RgbaImage::from_pixel(PAPER_SIZE, PAPER_SIZE, base);

    for _ in 0..SPECKLE_COUNT {
        let alpha: f32 = rng.gen_range(0.0..SPECKLE_MAX_ALPHA);
        let x = rng.gen_range(0.0..PAPER_SIZE as f32).floor() as u32;
        let y = rng.gen_range(0.0..PAPER_SIZE as f32).floor() as u32;
        for dy in 0..SPECKLE_SIZE {
            for dx in 0..SPECKLE_SIZE {
                let (px, py) = (x + dx, y + dy);
                if px >= PAPER_SIZE || py >= PAPER_SIZE {
                    continue;
                }
                let pixel = paper.get_pixel_mut(px, py);
                for channel in 0..3 {
                    let dst = f32::from(pixel[channel]);
                    let src = f32::from(SPECKLE_COLOR[channel]);
                    pixel[channel] = (src * alpha + dst * (1.0 - alpha)).round() as u8;
                }
            }
        }
    }
    paper
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_is_deterministic_per_seed() {
        let first = generate_paper(7);
        let second = generate_paper(7);
        let other = generate_paper(8);
        assert_eq!(first.as_raw(), second.as_raw());
        assert_ne!(first.as_raw(), other.as_raw());
    }

    #[test]
    fn paper_stays_between_speckle_and_base_tones() {
        let paper = generate_paper(DEFAULT_PAPER_SEED);
        assert_eq!(paper.dimensions(), (PAPER_SIZE, PAPER_SIZE));
        let mut darkened = 0usize;
        for pixel in paper.pixels() {
            assert_eq!(pixel[3], 255);
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
            assert!(pixel[0] <= PAPER_BASE[0]);
            assert!(pixel[0] >= SPECKLE_COLOR[0]);
            if pixel[0] < PAPER_BASE[0] {
                darkened += 1;
            }
        }
        assert!(darkened > 0);
        assert!(darkened <= SPECKLE_COUNT * (SPECKLE_SIZE * SPECKLE_SIZE) as usize);
    }
}
