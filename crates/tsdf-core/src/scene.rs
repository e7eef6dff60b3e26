// crates/tsdf-core/src/scene.rs

//! The scene: configuration, spatial index, block pool and counters in one
//! owning container. All cross-structure links are indices; nothing here is
//! reference-counted or back-pointed.

use anyhow::{Context, Result};

use crate::allocator::VoxelBlockArray;
use crate::config::VolumeConfig;
use crate::index::SceneIndex;
use crate::stats::FusionCounters;

/// A sparse TSDF volume.
#[derive(Debug)]
pub struct Scene {
    pub config: VolumeConfig,
    pub index: SceneIndex,
    pub blocks: VoxelBlockArray,
    pub counters: FusionCounters,
}

impl Scene {
    /// Build an empty scene. All storage is sized here; the per-frame passes
    /// perform no further allocation.
    ///
    /// # Errors
    /// Returns an error for invalid parameters or if the voxel slab cannot
    /// be reserved.
    pub fn new(config: VolumeConfig) -> Result<Self> {
        config.validate().context("volume configuration rejected")?;
        let index = SceneIndex::new(&config);
        let blocks = VoxelBlockArray::new(config.n_blocks).context("allocating voxel block array")?;
        Ok(Self {
            config,
            index,
            blocks,
            counters: FusionCounters::new(),
        })
    }

    /// Number of blocks currently bound to hash entries.
    #[must_use]
    pub fn allocated_blocks(&self) -> u32 {
        self.config.n_blocks - self.blocks.free_count()
    }

    pub(crate) fn from_parts(
        config: VolumeConfig,
        index: SceneIndex,
        blocks: VoxelBlockArray,
    ) -> Self {
        Self {
            config,
            index,
            blocks,
            counters: FusionCounters::new(),
        }
    }
}
