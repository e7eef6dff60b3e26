// crates/tsdf-core/src/index.rs

//! The scene index: one hash table plus staging arrays per level.
//!
//! Level 0 is the finest; the block edge doubles per level. A flat index is
//! simply a one-level instance. Every level's entries point into the single
//! shared block pool; a parent entry in `Split` state defers lookups at its
//! coordinate to the next finer level.

use crate::config::VolumeConfig;
use crate::hash::VoxelHash;
use crate::staging::AllocationStaging;

/// One index level: hash table and its per-entry side arrays.
#[derive(Debug)]
pub struct IndexLevel {
    pub hash: VoxelHash,
    pub staging: AllocationStaging,
}

impl IndexLevel {
    #[must_use]
    pub fn new(n_buckets: u32, entries_per_bucket: u32, n_excess: u32) -> Self {
        let hash = VoxelHash::new(n_buckets, entries_per_bucket, n_excess);
        let staging = AllocationStaging::new(hash.total_len() as usize);
        Self { hash, staging }
    }
}

/// All levels of the spatial index.
#[derive(Debug)]
pub struct SceneIndex {
    levels: Vec<IndexLevel>,
}

impl SceneIndex {
    /// Build `config.levels` identically-dimensioned levels.
    #[must_use]
    pub fn new(config: &VolumeConfig) -> Self {
        let levels = (0..config.levels)
            .map(|_| IndexLevel::new(config.n_buckets, config.entries_per_bucket, config.n_excess))
            .collect();
        Self { levels }
    }

    #[inline]
    #[must_use]
    pub fn n_levels(&self) -> u8 {
        self.levels.len() as u8
    }

    #[inline]
    #[must_use]
    pub fn level(&self, l: u8) -> &IndexLevel {
        &self.levels[l as usize]
    }

    #[inline]
    pub fn level_mut(&mut self, l: u8) -> &mut IndexLevel {
        &mut self.levels[l as usize]
    }

    #[inline]
    #[must_use]
    pub fn levels(&self) -> &[IndexLevel] {
        &self.levels
    }

    #[inline]
    pub fn levels_mut(&mut self) -> &mut [IndexLevel] {
        &mut self.levels
    }

    /// Reset every level's staging arrays (frame start).
    pub fn clear_staging(&self) {
        for level in &self.levels {
            level.staging.clear();
        }
    }

    pub(crate) fn from_levels(levels: Vec<IndexLevel>) -> Self {
        Self { levels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_builds_requested_levels() {
        let cfg = VolumeConfig {
            levels: 3,
            n_buckets: 8,
            n_excess: 4,
            ..VolumeConfig::default()
        };
        let index = SceneIndex::new(&cfg);
        assert_eq!(index.n_levels(), 3);
        for level in index.levels() {
            assert_eq!(level.staging.len(), level.hash.total_len() as usize);
        }
    }
}
