//! End-to-end scenarios for the allocation and fusion pipeline.
//!
//! These pin concrete numbers: staged block coordinates for a known camera
//! geometry, free-list movement under saturation, excess-chain layout after
//! collisions, the weighted-mean arithmetic, the color gate, and the
//! hierarchical descent through split parents.

use glam::{Mat4, Vec3};

use tsdf_core::{
    sdf_f32_to_value, BlockPos, BlockState, InsertDecision, ProjParams, Scene, VolumeConfig, Voxel,
    ALLOC_ORDERED, VISIBLE_NONE, VISIBLE_RESIDENT,
};
use tsdf_exec::SerialExecutor;
use tsdf_fusion::{
    build_allocation, resolve_allocations, stage_block, update_voxel, update_voxel_depth,
    ActiveSet, DepthImage, FrameView, FusionEngine, RgbImage,
};

fn single_pixel_view(d: f32) -> FrameView {
    FrameView::depth_only(
        DepthImage::filled(1, 1, d),
        Mat4::IDENTITY,
        ProjParams::new(1.0, 1.0, 0.0, 0.0),
    )
    .unwrap()
}

/// S1 — single-pixel plane: the truncation band [0.96, 1.04] m at 25 blocks
/// per meter stages exactly blocks z = 24, 25, 26 on the optical axis, and
/// the resolver drains exactly that many pool slots.
#[test]
fn s1_single_pixel_plane_allocates_band_blocks() {
    let cfg = VolumeConfig {
        n_blocks: 64,
        n_buckets: 256,
        n_excess: 16,
        voxel_size: 0.005,
        mu: 0.04,
        z_min: 0.1,
        z_max: 4.0,
        ..VolumeConfig::default()
    };
    let mut scene = Scene::new(cfg).unwrap();
    let view = single_pixel_view(1.0);

    build_allocation(&SerialExecutor, &scene, &view);

    let staging = &scene.index.level(0).staging;
    let staged: Vec<BlockPos> = (0..staging.len() as u32)
        .filter(|&i| staging.alloc_type(i) == ALLOC_ORDERED)
        .map(|i| staging.staged_coords(i))
        .collect();
    let mut zs: Vec<i16> = staged.iter().map(|c| c.z).collect();
    zs.sort_unstable();
    // The band endpoints land on block boundaries, so the sampled set covers
    // the center block 25 and its neighbors, modulo float rounding of the
    // last march step.
    assert!(staged.iter().all(|c| c.x == 0 && c.y == 0), "staged off the optical axis");
    assert!(zs.contains(&24) && zs.contains(&25), "band blocks near (0, 0, 200) voxels");
    assert!(zs.iter().all(|&z| (24..=26).contains(&z)));
    assert!(zs.windows(2).all(|w| w[1] == w[0] + 1), "band blocks are contiguous");

    let top_before = scene.blocks.last_free_block_id();
    let bound = resolve_allocations(&mut scene);
    assert_eq!(bound as usize, zs.len());
    assert_eq!(scene.blocks.last_free_block_id(), top_before - bound as i32);
    for &z in &zs {
        let (_, state) = scene.index.level(0).hash.find(BlockPos::new(0, 0, z)).unwrap();
        assert!(matches!(state, BlockState::Resident(_)));
    }
}

/// S2 — allocation saturation: ten distinct coordinates against a pool of
/// four. Four bind, six are dropped and counted, the free list is empty.
#[test]
fn s2_allocation_saturation() {
    let cfg = VolumeConfig {
        n_blocks: 4,
        n_buckets: 512,
        n_excess: 16,
        ..VolumeConfig::default()
    };
    let mut scene = Scene::new(cfg).unwrap();

    // Ten coordinates in ten distinct buckets, so each stages its own slot.
    let mut coords = Vec::new();
    let mut z = 0i16;
    while coords.len() < 10 {
        let c = BlockPos::new(0, 0, z);
        let decision = scene.index.level(0).hash.prepare_insert(c);
        if let InsertDecision::RoomInBucket { index } = decision {
            if !coords.iter().any(|&(_, slot)| slot == index) {
                coords.push((c, index));
            }
        }
        z += 1;
    }
    for &(c, _) in &coords {
        stage_block(scene.index.level(0), c);
    }

    let bound = resolve_allocations(&mut scene);
    assert_eq!(bound, 4);
    let counters = scene.counters.snapshot();
    assert_eq!(counters.alloc_failures, 6);
    assert_eq!(scene.blocks.last_free_block_id(), -1);
}

/// S3 — excess chaining: three coordinates forced into one bucket, resolved
/// over consecutive frames. First lands in the ordered slot, second in
/// excess[0] (ordered offset = 1), third in excess[1] (excess[0] offset = 2),
/// and every one is findable.
#[test]
fn s3_excess_chaining_layout() {
    let cfg = VolumeConfig {
        n_blocks: 8,
        n_buckets: 1, // every coordinate collides
        entries_per_bucket: 1,
        n_excess: 4,
        ..VolumeConfig::default()
    };
    let mut scene = Scene::new(cfg).unwrap();
    let coords = [BlockPos::new(0, 0, 0), BlockPos::new(0, 0, 1), BlockPos::new(0, 0, 2)];

    for c in coords {
        scene.index.clear_staging();
        stage_block(scene.index.level(0), c);
        resolve_allocations(&mut scene);
    }

    let hash = &scene.index.level(0).hash;
    let ordered = hash.ordered_len(); // 1
    assert_eq!(hash.entry(0).pos, coords[0]);
    assert_eq!(hash.entry(0).offset, 1, "ordered slot chains to excess[0]");
    assert_eq!(hash.entry(ordered).pos, coords[1]);
    assert_eq!(hash.entry(ordered).offset, 2, "excess[0] chains to excess[1]");
    assert_eq!(hash.entry(ordered + 1).pos, coords[2]);
    assert_eq!(hash.entry(ordered + 1).offset, 0, "chain terminates");

    for c in coords {
        let (idx, state) = hash.find(c).unwrap();
        assert!(matches!(state, BlockState::Resident(_)));
        assert_eq!(hash.entry(idx).pos, c);
    }
}

/// S4 — weighted fusion: (3 * 0.2 + 1 * 0.5) / 4 = 0.275 within one LSB,
/// weight 3 -> 4.
#[test]
fn s4_weighted_fusion() {
    let mu = 0.04;
    let view = FrameView::depth_only(
        DepthImage::filled(4, 4, 1.0 + 0.5 * mu),
        Mat4::IDENTITY,
        ProjParams::new(1.0, 1.0, 1.5, 1.5),
    )
    .unwrap();

    let mut voxel = Voxel {
        sdf: sdf_f32_to_value(0.2),
        w_depth: 3,
        ..Voxel::empty()
    };
    let eta = update_voxel_depth(
        &mut voxel,
        Vec3::new(0.0, 0.0, 1.0),
        &view.m_d,
        &view.proj_d,
        mu,
        100,
        &view.depth,
    )
    .unwrap();

    assert!((eta / mu - 0.5).abs() < 1.0e-4);
    let expected = sdf_f32_to_value(0.275);
    assert!((i32::from(voxel.sdf) - i32::from(expected)).abs() <= 1, "within one LSB");
    assert_eq!(voxel.w_depth, 4);
}

/// S5 — color gating: at |eta/mu| = 0.3 the depth stage updates and the
/// color stage must not.
#[test]
fn s5_color_gating() {
    let mu = 0.1;
    let proj = ProjParams::new(1.0, 1.0, 1.5, 1.5);
    let rgb = RgbImage::new(4, 4, vec![[180, 40, 220, 255]; 16]).unwrap();
    let view = FrameView::new(
        DepthImage::filled(4, 4, 1.0 + 0.3 * mu),
        Some(rgb),
        Mat4::IDENTITY,
        Mat4::IDENTITY,
        proj,
        proj,
    )
    .unwrap();

    let mut voxel = Voxel::empty();
    update_voxel(&mut voxel, Vec3::new(0.0, 0.0, 1.0), &view, mu, 100, true);
    assert_eq!(voxel.w_depth, 1, "depth is updated");
    assert_eq!(voxel.w_color, 0, "color is gated off");
    assert_eq!(voxel.clr, [0, 0, 0]);
}

/// S6 — hierarchical descent: a split parent at level 1 defers visibility to
/// its resident child at level 0; the parent itself records nothing.
#[test]
fn s6_hierarchical_descent_records_at_fine_level() {
    let cfg = VolumeConfig {
        n_blocks: 32,
        n_buckets: 64,
        n_excess: 8,
        voxel_size: 0.01,
        mu: 0.04,
        z_min: 0.1,
        z_max: 4.0,
        levels: 2,
        ..VolumeConfig::default()
    };
    let mut scene = Scene::new(cfg).unwrap();

    // Level-1 parent spanning base blocks z = 12..13 is split; one child is
    // resident at level 0.
    let parent = BlockPos::new(0, 0, 6);
    let child = BlockPos::new(0, 0, 12);

    let InsertDecision::RoomInBucket { index: parent_idx } =
        scene.index.level(1).hash.prepare_insert(parent)
    else {
        panic!("parent bucket unexpectedly full");
    };
    scene.index.level_mut(1).hash.install(parent_idx, parent, BlockState::Split);

    let block = scene.blocks.allocate().unwrap();
    let InsertDecision::RoomInBucket { index: child_idx } =
        scene.index.level(0).hash.prepare_insert(child)
    else {
        panic!("child bucket unexpectedly full");
    };
    scene
        .index
        .level_mut(0)
        .hash
        .install(child_idx, child, BlockState::Resident(block));

    // Depth 1.0 on the optical axis: the band in voxel units is [96, 104],
    // both ends inside the parent's footprint (level-1 block 6 = voxels
    // 96..112).
    build_allocation(&SerialExecutor, &scene, &single_pixel_view(1.0));

    let fine = &scene.index.level(0).staging;
    let coarse = &scene.index.level(1).staging;
    assert_eq!(fine.visible_type(child_idx), VISIBLE_RESIDENT, "child is visible at level 0");
    assert_eq!(coarse.visible_type(parent_idx), VISIBLE_NONE, "split parent records nothing");
    assert_eq!(coarse.alloc_type(parent_idx), 0);

    // The band's far end falls into the unallocated sibling (0, 0, 13); the
    // descent stages it at the fine level, not at the parent.
    let staged_fine: Vec<BlockPos> = (0..fine.len() as u32)
        .filter(|&i| fine.alloc_type(i) == ALLOC_ORDERED)
        .map(|i| fine.staged_coords(i))
        .collect();
    assert_eq!(staged_fine, vec![BlockPos::new(0, 0, 13)]);
}

/// Fusing through the engine respects the scenario-S1 geometry end to end:
/// voxels on the measured surface move toward zero distance.
#[test]
fn surface_voxels_converge_toward_zero_sdf() {
    let cfg = VolumeConfig {
        n_blocks: 1024,
        n_buckets: 4096,
        n_excess: 256,
        voxel_size: 0.01,
        mu: 0.04,
        z_min: 0.1,
        z_max: 4.0,
        color: false,
        ..VolumeConfig::default()
    };
    let mut scene = Scene::new(cfg).unwrap();
    let mut active = ActiveSet::new(1);
    let engine = FusionEngine::new(SerialExecutor);

    let width = 16u32;
    let proj = ProjParams::new(16.0, 16.0, 7.5, 7.5);
    let view = FrameView::depth_only(DepthImage::filled(width, width, 1.0), Mat4::IDENTITY, proj)
        .unwrap();

    for _ in 0..4 {
        engine.integrate(&mut scene, &mut active, &view).unwrap();
    }

    // The voxel at (0, 0, 1.0) sits on the surface: |sdf| well below the
    // encoded truncation bound.
    let (_, state) = scene.index.level(0).hash.find(BlockPos::new(0, 0, 12)).unwrap();
    let BlockState::Resident(block) = state else {
        panic!("surface block not resident");
    };
    let voxels = scene.blocks.block_voxels(block);
    // Block origin is voxel (0, 0, 96); local (0, 0, 4) sits at world
    // (0, 0, 1.0), exactly on the measured plane.
    let lin = tsdf_core::voxel_linear_index(0, 0, 4);
    let v = voxels[lin];
    assert!(v.w_depth > 0, "surface voxel must be observed");
    assert!(
        v.sdf_f32().abs() < 0.1,
        "surface voxel sdf {} should be near zero",
        v.sdf_f32()
    );
}
