// crates/tsdf-fusion/src/fuse.rs

//! Fusion kernel: the per-voxel depth and color update.
//!
//! Depth samples nearest-neighbor, color bilinearly; both reject outside a
//! one-pixel guard band so the rounded/interpolated indices stay in range.
//! The color stage only runs close to the surface (`|eta/mu| <= 0.25`), so
//! colors do not smear across the whole truncation band.

use glam::{Mat4, Vec3};

use tsdf_core::{sdf_f32_to_value, sdf_value_to_f32, weighted_mean, BlockPos, ProjParams, Voxel};

use crate::view::{DepthImage, FrameView, RgbImage};

/// Fold one depth observation into a voxel.
///
/// Returns `None` when the voxel projects outside the usable image area or
/// onto a missing measurement; otherwise returns the signed camera-space
/// distance `eta = depth_measured - z`. A voxel behind the surface beyond
/// the band (`eta < -mu`) is left untouched, but its `eta` is still
/// reported so the caller's color gate can inspect it.
pub fn update_voxel_depth(
    voxel: &mut Voxel,
    pt_model: Vec3,
    m_d: &Mat4,
    proj_d: &ProjParams,
    mu: f32,
    max_weight: u8,
    depth: &DepthImage,
) -> Option<f32> {
    let pt_camera = m_d.transform_point3(pt_model);
    if pt_camera.z <= 0.0 {
        return None;
    }

    let pt_image = proj_d.project(pt_camera);
    let (w, h) = (depth.width as f32, depth.height as f32);
    if pt_image.x < 1.0 || pt_image.x > w - 2.0 || pt_image.y < 1.0 || pt_image.y > h - 2.0 {
        return None;
    }

    let measured = depth.sample_nearest(pt_image);
    if measured <= 0.0 {
        return None;
    }

    let eta = measured - pt_camera.z;
    if eta < -mu {
        return Some(eta);
    }

    let old_f = sdf_value_to_f32(voxel.sdf);
    let old_w = f32::from(voxel.w_depth);
    let new_f = (eta / mu).min(1.0);

    voxel.sdf = sdf_f32_to_value(weighted_mean(old_f, old_w, new_f));
    voxel.w_depth = (u16::from(voxel.w_depth) + 1).min(u16::from(max_weight)) as u8;

    Some(eta)
}

/// Fold one color observation into a voxel (bilinear sample, per-channel
/// running mean in `[0, 1]`).
pub fn update_voxel_color(
    voxel: &mut Voxel,
    pt_model: Vec3,
    m_rgb: &Mat4,
    proj_rgb: &ProjParams,
    max_weight: u8,
    rgb: &RgbImage,
) {
    let pt_camera = m_rgb.transform_point3(pt_model);
    if pt_camera.z <= 0.0 {
        return;
    }

    let pt_image = proj_rgb.project(pt_camera);
    let (w, h) = (rgb.width as f32, rgb.height as f32);
    if pt_image.x < 1.0 || pt_image.x > w - 2.0 || pt_image.y < 1.0 || pt_image.y > h - 2.0 {
        return;
    }

    let old_c = Vec3::new(
        f32::from(voxel.clr[0]),
        f32::from(voxel.clr[1]),
        f32::from(voxel.clr[2]),
    ) / 255.0;
    let old_w = f32::from(voxel.w_color);
    let measured = rgb.sample_bilinear(pt_image) / 255.0;

    let fused = (old_c * old_w + measured) / (old_w + 1.0);
    let quantized = fused * 255.0;
    voxel.clr = [quantized.x as u8, quantized.y as u8, quantized.z as u8];
    voxel.w_color = (u16::from(voxel.w_color) + 1).min(u16::from(max_weight)) as u8;
}

/// Depth update plus the near-surface-gated color update.
pub fn update_voxel(
    voxel: &mut Voxel,
    pt_model: Vec3,
    view: &FrameView,
    mu: f32,
    max_weight: u8,
    with_color: bool,
) {
    let eta = update_voxel_depth(voxel, pt_model, &view.m_d, &view.proj_d, mu, max_weight, &view.depth);

    if !with_color {
        return;
    }
    let (Some(eta), Some(rgb)) = (eta, view.rgb.as_ref()) else {
        return;
    };
    if eta > mu || (eta / mu).abs() > 0.25 {
        return;
    }
    update_voxel_color(voxel, pt_model, &view.m_rgb, &view.proj_rgb, max_weight, rgb);
}

/// Fuse one resident block: iterate its voxels in linear order, computing
/// each voxel's world-space position from the block coordinate and the
/// level's voxel size.
#[allow(clippy::too_many_arguments)]
pub fn fuse_block(
    voxels: &mut [Voxel],
    pos: BlockPos,
    level: u8,
    voxel_size: f32,
    view: &FrameView,
    mu: f32,
    max_weight: u8,
    with_color: bool,
) {
    let size = voxel_size * (1u32 << level) as f32;
    let origin = pos.origin_voxel();
    for (lin, voxel) in voxels.iter_mut().enumerate() {
        let (lx, ly, lz) = tsdf_core::voxel_local_coords(lin);
        let pt_model = Vec3::new(
            (origin.x + lx as i32) as f32,
            (origin.y + ly as i32) as f32,
            (origin.z + lz as i32) as f32,
        ) * size;
        update_voxel(voxel, pt_model, view, mu, max_weight, with_color);
    }
}
