use glam::{Vec3, Vec4, Vec4Swizzles};

use super::buffer::PixelBuffer;

pub const LUMA: Vec3 = Vec3::new(0.299, 0.587, 0.114);

/// Structure tensor of `scene`: `(gx², gy², gx·gy, luminance)` per pixel,
/// where `gx`/`gy` are the Sobel responses of the red channel.
pub fn structure_tensor(scene: &PixelBuffer) -> PixelBuffer {
    PixelBuffer::from_fn(scene.size(), |x, y| {
        let (x, y) = (x as i32, y as i32);
        let red = |dx: i32, dy: i32| scene.fetch(x + dx, y + dy).x;

        let (tl, tm, tr) = (red(-1, -1), red(0, -1), red(1, -1));
        let (ml, mr) = (red(-1, 0), red(1, 0));
        let (bl, bm, br) = (red(-1, 1), red(0, 1), red(1, 1));

        let gx = -tl + tr - 2.0 * ml + 2.0 * mr - bl + br;
        let gy = -tl - 2.0 * tm - tr + bl + 2.0 * bm + br;
        let luminance = scene.fetch(x, y).xyz().dot(LUMA);
        Vec4::new(gx * gx, gy * gy, gx * gy, luminance)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SurfaceSize;

    #[test]
    fn flat_image_has_zero_gradient() {
        let size = SurfaceSize::new(5, 5).expect("size");
        let scene = PixelBuffer::filled(size, Vec4::new(0.4, 0.2, 0.1, 1.0));
        let tensor = structure_tensor(&scene);
        let centre = tensor.get(2, 2);
        assert!(centre.truncate().abs().max_element() < 1e-6, "{centre:?}");
        assert!((centre.w - (0.4 * 0.299 + 0.2 * 0.587 + 0.1 * 0.114)).abs() < 1e-6);
    }

    #[test]
    fn vertical_edge_only_has_horizontal_gradient() {
        let size = SurfaceSize::new(6, 6).expect("size");
        let scene = PixelBuffer::from_fn(size, |x, _| {
            if x < 3 {
                Vec4::new(0.0, 0.0, 0.0, 1.0)
            } else {
                Vec4::ONE
            }
        });
        let tensor = structure_tensor(&scene);
        let edge = tensor.get(2, 3);
        // Right column is bright: gx = 1 + 2 + 1.
        assert!((edge.x - 16.0).abs() < 1e-6);
        assert!(edge.y.abs() < 1e-6);
        assert!(edge.z.abs() < 1e-6);
        assert!(tensor.get(0, 3).x.abs() < 1e-6);
    }

    #[test]
    fn gradient_is_taken_from_red_channel() {
        let size = SurfaceSize::new(4, 4).expect("size");
        let scene = PixelBuffer::from_fn(size, |_, y| {
            Vec4::new(0.0, y as f32, y as f32, 1.0)
        });
        let tensor = structure_tensor(&scene);
        assert_eq!(tensor.get(1, 1).truncate().truncate(), glam::Vec2::ZERO);
    }
}
