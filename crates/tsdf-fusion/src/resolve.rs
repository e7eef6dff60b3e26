// crates/tsdf-fusion/src/resolve.rs

//! Allocation resolver: one sweep over all hash entries per level,
//! materializing the intents the builder staged.
//!
//! Ordered intents install a live entry in place; excess intents take the
//! next unused overflow slot and link it from the chain tail. Either
//! resource running out drops the request for this frame — the pixel that
//! staged it re-submits next frame — and bumps the matching counter. The
//! sweep runs sequentially: it scatters writes across the entry table, which
//! data-parallel tasks could not do without aliasing, and it is a cheap
//! memory-bound pass next to the per-pixel and per-voxel ones.

use tsdf_core::{BlockState, Scene, ALLOC_EXCESS, ALLOC_ORDERED, VISIBLE_RESIDENT};

/// Materialize staged allocations. Returns the number of blocks bound.
pub fn resolve_allocations(scene: &mut Scene) -> u32 {
    let Scene {
        index,
        blocks,
        counters,
        ..
    } = scene;

    let mut bound = 0u32;
    for level in index.levels_mut() {
        for i in 0..level.hash.total_len() {
            match level.staging.alloc_type(i) {
                ALLOC_ORDERED => {
                    let pos = level.staging.staged_coords(i);
                    if let Some(block) = blocks.allocate() {
                        blocks.reset_block(block);
                        level.hash.install(i, pos, BlockState::Resident(block));
                        bound += 1;
                    } else {
                        // Pool exhausted: leave the slot vacant, degrade coverage.
                        counters.count_alloc_failure();
                    }
                    level.staging.clear_alloc(i);
                }
                ALLOC_EXCESS => {
                    let pos = level.staging.staged_coords(i);
                    if let Some(block) = blocks.allocate() {
                        if let Some(rel) = level.hash.acquire_excess_slot() {
                            let slot = level.hash.ordered_len() + rel;
                            blocks.reset_block(block);
                            level.hash.install(slot, pos, BlockState::Resident(block));
                            level.hash.link_excess(i, rel);
                            level.staging.mark_visible(slot, VISIBLE_RESIDENT);
                            bound += 1;
                        } else {
                            blocks.free(block);
                            counters.count_excess_failure();
                        }
                    } else {
                        counters.count_alloc_failure();
                    }
                    level.staging.clear_alloc(i);
                }
                _ => {}
            }
        }
    }
    bound
}
