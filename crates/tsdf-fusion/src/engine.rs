// crates/tsdf-fusion/src/engine.rs

//! Frame integration driver: clear staging → allocation/visibility pass →
//! resolver sweep → active-set rebuild → fusion pass.
//!
//! Pass boundaries are the only synchronization points; each pass is
//! dispatched through the executor the engine was built with, so the same
//! engine runs single-threaded (deterministic) or on a worker pool.

use anyhow::Result;
use tracing::debug;

use tsdf_core::{BlockState, BlockPos, CounterSnapshot, Scene, BLOCK_VOLUME};
use tsdf_exec::Executor;

use crate::active::ActiveSet;
use crate::alloc_pass::build_allocation;
use crate::fuse::fuse_block;
use crate::resolve::resolve_allocations;
use crate::view::FrameView;

/// What one frame did to the scene.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameSummary {
    /// Blocks bound from the pool this frame.
    pub blocks_bound: u32,
    /// Visible-and-resident entries across levels after the rebuild.
    pub visible_entries: usize,
    /// Visible-but-evicted entries across levels (swap-in queue length).
    pub awaiting_swap_in: usize,
    /// Scene counters after the frame.
    pub counters: CounterSnapshot,
}

/// Per-frame integration engine over an [`Executor`].
#[derive(Debug)]
pub struct FusionEngine<E> {
    exec: E,
}

impl<E: Executor> FusionEngine<E> {
    #[must_use]
    pub const fn new(exec: E) -> Self {
        Self { exec }
    }

    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.exec
    }

    /// Integrate one frame into the scene.
    ///
    /// `active` is rebuilt as a side effect and stays valid until the next
    /// call; collaborators (raycast, migration) read it from there.
    ///
    /// # Errors
    /// Currently infallible for validated frames; the `Result` is the seam
    /// where collaborator-driven failures (swap-in, tracking) surface.
    pub fn integrate(
        &self,
        scene: &mut Scene,
        active: &mut ActiveSet,
        view: &FrameView,
    ) -> Result<FrameSummary> {
        scene.index.clear_staging();

        build_allocation(&self.exec, scene, view);
        let blocks_bound = resolve_allocations(scene);
        active.rebuild(&scene.index);
        self.fuse_visible(scene, active, view);

        let summary = FrameSummary {
            blocks_bound,
            visible_entries: active.total_visible(),
            awaiting_swap_in: active.total_awaiting_swap_in(),
            counters: scene.counters.snapshot(),
        };
        debug!(
            blocks_bound = summary.blocks_bound,
            visible = summary.visible_entries,
            swap_in = summary.awaiting_swap_in,
            "frame integrated"
        );
        Ok(summary)
    }

    /// Fusion pass: one task per voxel block, blocks partitioned exclusively
    /// so no voxel is touched twice in a frame.
    fn fuse_visible(&self, scene: &mut Scene, active: &ActiveSet, view: &FrameView) {
        let with_color = scene.config.color && view.rgb.is_some();
        let mu = scene.config.mu;
        let max_weight = scene.config.max_weight;
        let voxel_size = scene.config.voxel_size;

        // Resident visible entries, keyed by their block-pool index. At most
        // one live entry references a block, so the map has no collisions.
        let mut jobs: Vec<Option<(BlockPos, u8)>> = vec![None; scene.config.n_blocks as usize];
        for (l, level_active) in active.levels().iter().enumerate() {
            let hash = &scene.index.level(l as u8).hash;
            for &id in &level_active.visible {
                let entry = hash.entry(id);
                if let BlockState::Resident(block) = entry.state {
                    jobs[block as usize] = Some((entry.pos, l as u8));
                }
            }
        }

        let voxels = scene.blocks.voxels_mut();
        self.exec.for_each_chunk(voxels, BLOCK_VOLUME, |block, chunk| {
            if let Some((pos, level)) = jobs[block] {
                fuse_block(chunk, pos, level, voxel_size, view, mu, max_weight, with_color);
            }
        });
    }
}
