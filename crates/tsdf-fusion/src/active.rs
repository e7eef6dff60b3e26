// crates/tsdf-fusion/src/active.rs

//! Active-set manager: compact per-level lists of the entries visible this
//! frame.
//!
//! Resident visible entries drive the fusion kernel; visible-but-evicted
//! entries go on the swap-in list handed to the external migration layer.
//! Both lists are transient and rebuilt after every resolver sweep.

use tsdf_core::{SceneIndex, VISIBLE_EVICTED, VISIBLE_RESIDENT};

/// Visible-entry ids for one index level.
#[derive(Clone, Debug, Default)]
pub struct LevelActive {
    /// Entries visible and resident (drives fusion, raycast).
    pub visible: Vec<u32>,
    /// Entries visible but swapped out (drives the migration layer).
    pub needs_swap_in: Vec<u32>,
    /// Entries the migration layer has chosen to evict; owned and filled by
    /// that layer between frames, cleared with the rest of the set.
    pub needs_swap_out: Vec<u32>,
}

/// Compact visibility lists for every level.
#[derive(Clone, Debug, Default)]
pub struct ActiveSet {
    levels: Vec<LevelActive>,
}

impl ActiveSet {
    #[must_use]
    pub fn new(n_levels: u8) -> Self {
        Self {
            levels: (0..n_levels).map(|_| LevelActive::default()).collect(),
        }
    }

    /// Rescan the staging arrays and rebuild every list.
    pub fn rebuild(&mut self, index: &SceneIndex) {
        self.levels.resize_with(index.n_levels() as usize, LevelActive::default);
        for (l, active) in self.levels.iter_mut().enumerate() {
            active.visible.clear();
            active.needs_swap_in.clear();
            active.needs_swap_out.clear();
            let staging = &index.level(l as u8).staging;
            for i in 0..staging.len() as u32 {
                match staging.visible_type(i) {
                    VISIBLE_RESIDENT => active.visible.push(i),
                    VISIBLE_EVICTED => active.needs_swap_in.push(i),
                    _ => {}
                }
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn level(&self, l: u8) -> &LevelActive {
        &self.levels[l as usize]
    }

    #[inline]
    #[must_use]
    pub fn levels(&self) -> &[LevelActive] {
        &self.levels
    }

    /// Total visible-and-resident entries across levels.
    #[must_use]
    pub fn total_visible(&self) -> usize {
        self.levels.iter().map(|l| l.visible.len()).sum()
    }

    /// Total entries awaiting swap-in across levels.
    #[must_use]
    pub fn total_awaiting_swap_in(&self) -> usize {
        self.levels.iter().map(|l| l.needs_swap_in.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsdf_core::{Scene, VolumeConfig, VISIBLE_EVICTED, VISIBLE_RESIDENT};

    #[test]
    fn rebuild_partitions_by_visibility_kind() {
        let scene = Scene::new(VolumeConfig {
            n_blocks: 4,
            n_buckets: 8,
            n_excess: 2,
            ..VolumeConfig::default()
        })
        .unwrap();
        let staging = &scene.index.level(0).staging;
        staging.mark_visible(1, VISIBLE_RESIDENT);
        staging.mark_visible(3, VISIBLE_EVICTED);
        staging.mark_visible(5, VISIBLE_RESIDENT);

        let mut active = ActiveSet::new(1);
        active.rebuild(&scene.index);
        assert_eq!(active.level(0).visible, vec![1, 5]);
        assert_eq!(active.level(0).needs_swap_in, vec![3]);
        assert_eq!(active.total_visible(), 2);
        assert_eq!(active.total_awaiting_swap_in(), 1);

        // Rebuild after clearing drops everything.
        scene.index.clear_staging();
        active.rebuild(&scene.index);
        assert_eq!(active.total_visible(), 0);
        assert_eq!(active.total_awaiting_swap_in(), 0);
    }
}
