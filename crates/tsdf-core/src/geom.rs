// crates/tsdf-core/src/geom.rs

//! Pinhole projection and image sampling helpers.
//!
//! Convention: `u = fx * x/z + cx`, `v = fy * y/z + cy`, with `z` along the
//! optical axis. Depth is sampled nearest-neighbor, color bilinearly; both
//! samplers assume the caller has already applied the one-pixel guard band.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics `(fx, fy, cx, cy)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProjParams {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl ProjParams {
    #[inline]
    #[must_use]
    pub const fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Project a camera-space point (with `z > 0`) to pixel coordinates.
    #[inline]
    #[must_use]
    pub fn project(&self, pt_camera: Vec3) -> Vec2 {
        Vec2::new(
            self.fx * pt_camera.x / pt_camera.z + self.cx,
            self.fy * pt_camera.y / pt_camera.z + self.cy,
        )
    }

    /// Back-project pixel `(x, y)` at measured depth `z` into camera space.
    #[inline]
    #[must_use]
    pub fn back_project(&self, x: f32, y: f32, z: f32) -> Vec3 {
        Vec3::new(z * (x - self.cx) / self.fx, z * (y - self.cy) / self.fy, z)
    }
}

/// Whether every element of a pose is finite. Non-finite poses are rejected
/// at the frame boundary so the kernels stay total.
#[inline]
#[must_use]
pub fn pose_is_finite(m: &Mat4) -> bool {
    m.is_finite()
}

/// Nearest-neighbor sample of a scalar image at `p` (pixel units).
///
/// Rounds with `+0.5` then floors; the caller's `[1, size-2]` bounds check
/// keeps the rounded index in range.
#[inline]
#[must_use]
pub fn sample_nearest_f32(data: &[f32], width: u32, p: Vec2) -> f32 {
    let x = (p.x + 0.5).floor() as usize;
    let y = (p.y + 0.5).floor() as usize;
    data[x + y * width as usize]
}

/// Bilinear sample of an RGBA image at `p` (pixel units); returns RGB in
/// `[0, 255]` per channel.
#[must_use]
pub fn sample_bilinear_rgb(data: &[[u8; 4]], width: u32, p: Vec2) -> Vec3 {
    let x0 = p.x.floor();
    let y0 = p.y.floor();
    let dx = p.x - x0;
    let dy = p.y - y0;

    let w = width as usize;
    let xi = x0 as usize;
    let yi = y0 as usize;

    let at = |x: usize, y: usize| -> Vec3 {
        let px = data[x + y * w];
        Vec3::new(f32::from(px[0]), f32::from(px[1]), f32::from(px[2]))
    };

    let top = at(xi, yi) * (1.0 - dx) + at(xi + 1, yi) * dx;
    let bot = at(xi, yi + 1) * (1.0 - dx) + at(xi + 1, yi + 1) * dx;
    top * (1.0 - dy) + bot * dy
}
