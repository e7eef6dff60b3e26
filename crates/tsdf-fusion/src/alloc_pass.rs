// crates/tsdf-fusion/src/alloc_pass.rs

//! Allocation & visibility builder: one task per depth pixel.
//!
//! Each accepted pixel back-projects to a camera-space point and marches the
//! segment spanning the truncation band `[d - mu, d + mu]`, sampling block
//! coordinates every <= 0.5 block edges so no pierced block is skipped. For
//! every sampled coordinate the hash is consulted read-only and the outcome
//! is staged into the per-entry side arrays; nothing is materialized until
//! the resolver sweep.
//!
//! The hierarchical variant walks levels coarse → fine per sample and stops
//! at the first level that is not split at that coordinate.

use glam::{IVec3, Mat4, Vec3};

use tsdf_core::{
    BlockPos, BlockState, IndexLevel, InsertDecision, Scene, SceneIndex, BLOCK_SIDE,
    VISIBLE_EVICTED, VISIBLE_RESIDENT,
};
use tsdf_exec::Executor;

use crate::view::FrameView;

/// Stage one block coordinate against a level, as if a march step had
/// touched it: marks visibility when present, otherwise records the
/// allocation intent the resolver will materialize.
pub fn stage_block(level: &IndexLevel, pos: BlockPos) {
    match level.hash.prepare_insert(pos) {
        InsertDecision::Found { index, state } => match state {
            BlockState::Evicted => level.staging.mark_visible(index, VISIBLE_EVICTED),
            BlockState::Resident(_) => level.staging.mark_visible(index, VISIBLE_RESIDENT),
            // Split parents are handled by the hierarchical walker; Free
            // cannot be returned for an occupied match.
            BlockState::Split | BlockState::Free => {}
        },
        InsertDecision::RoomInBucket { index } => level.staging.stage_ordered(index, pos),
        InsertDecision::NeedExcess { parent } => level.staging.stage_excess(parent, pos),
    }
}

/// Walk levels coarse → fine at one voxel coordinate (finest-voxel units),
/// descending through `Split` parents, and stage at the level where the
/// descent terminates.
pub fn stage_voxel_hierarchical(index: &SceneIndex, v: IVec3) {
    for l in (0..index.n_levels()).rev() {
        let level = index.level(l);
        let pos = BlockPos::of_voxel(v, l);
        match level.hash.prepare_insert(pos) {
            InsertDecision::Found { index: i, state } => match state {
                BlockState::Split => continue, // defer to the next finer level
                BlockState::Evicted => {
                    level.staging.mark_visible(i, VISIBLE_EVICTED);
                    return;
                }
                BlockState::Resident(_) => {
                    level.staging.mark_visible(i, VISIBLE_RESIDENT);
                    return;
                }
                BlockState::Free => return,
            },
            InsertDecision::RoomInBucket { index: i } => {
                level.staging.stage_ordered(i, pos);
                return;
            }
            InsertDecision::NeedExcess { parent } => {
                level.staging.stage_excess(parent, pos);
                return;
            }
        }
    }
}

/// Rejection ladder shared by both variants. Returns the measured depth for
/// accepted pixels; pixels without a measurement (`d <= 0`) are skipped
/// silently, pixels with a measurement that fails the band/frustum/finite
/// checks are counted as rejected.
fn accept_pixel(scene: &Scene, view: &FrameView, x: u32, y: u32) -> Option<f32> {
    let d = view.depth.get(x, y);
    if d <= 0.0 {
        return None;
    }
    let cfg = &scene.config;
    if !d.is_finite() || d - cfg.mu < 0.0 || d - cfg.mu < cfg.z_min || d + cfg.mu > cfg.z_max {
        scene.counters.count_pixel_rejected();
        return None;
    }
    Some(d)
}

/// Truncation-band segment endpoints in the given unit scale.
fn band_segment(view: &FrameView, inv_m_d: &Mat4, x: u32, y: u32, d: f32, mu: f32, scale: f32) -> (Vec3, Vec3) {
    let pt_camera = view.proj_d.back_project(x as f32, y as f32, d);
    let norm = pt_camera.length();
    let p_a = inv_m_d.transform_point3(pt_camera * (1.0 - mu / norm)) * scale;
    let p_b = inv_m_d.transform_point3(pt_camera * (1.0 + mu / norm)) * scale;
    (p_a, p_b)
}

fn stage_pixel_flat(scene: &Scene, view: &FrameView, inv_m_d: &Mat4, x: u32, y: u32) {
    let Some(d) = accept_pixel(scene, view, x, y) else {
        return;
    };
    let cfg = &scene.config;
    let one_over_block = 1.0 / (cfg.voxel_size * BLOCK_SIDE as f32);
    let (p_a, p_b) = band_segment(view, inv_m_d, x, y, d, cfg.mu, one_over_block);

    let direction = p_b - p_a;
    // Step length <= 0.5 block edges: every pierced block gets sampled.
    let steps = (2.0 * direction.length()).ceil().max(1.0) as i32;
    let step = if steps > 1 {
        direction / (steps - 1) as f32
    } else {
        Vec3::ZERO
    };

    let level = scene.index.level(0);
    let mut p = p_a;
    for _ in 0..steps {
        stage_block(level, BlockPos::containing(p));
        p += step;
    }
}

fn stage_pixel_hierarchical(scene: &Scene, view: &FrameView, inv_m_d: &Mat4, x: u32, y: u32) {
    let Some(d) = accept_pixel(scene, view, x, y) else {
        return;
    };
    let cfg = &scene.config;
    // March in finest-voxel units; block snapping happens per level.
    let one_over_voxel = 1.0 / cfg.voxel_size;
    let (p_a, p_b) = band_segment(view, inv_m_d, x, y, d, cfg.mu, one_over_voxel);

    let direction = p_b - p_a;
    let steps = (2.0 * direction.length() / BLOCK_SIDE as f32).ceil().max(1.0) as i32;
    let step = if steps > 1 {
        direction / (steps - 1) as f32
    } else {
        Vec3::ZERO
    };

    let mut p = p_a;
    for _ in 0..steps {
        let v = IVec3::new(p.x.round() as i32, p.y.round() as i32, p.z.round() as i32);
        stage_voxel_hierarchical(&scene.index, v);
        p += step;
    }
}

/// Run the builder over every pixel of the frame's depth image.
pub fn build_allocation<E: Executor>(exec: &E, scene: &Scene, view: &FrameView) {
    let inv_m_d = view.m_d.inverse();
    let width = view.depth.width;
    let n = (width * view.depth.height) as usize;

    if scene.index.n_levels() == 1 {
        exec.for_each_index(n, |i| {
            let x = i as u32 % width;
            let y = i as u32 / width;
            stage_pixel_flat(scene, view, &inv_m_d, x, y);
        });
    } else {
        exec.for_each_index(n, |i| {
            let x = i as u32 % width;
            let y = i as u32 / width;
            stage_pixel_hierarchical(scene, view, &inv_m_d, x, y);
        });
    }
}
