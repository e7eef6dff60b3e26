// crates/tsdf-core/src/allocator.rs

//! The local voxel block array: a fixed-capacity slab of voxel blocks with an
//! explicit free-index stack.
//!
//! The allocator knows nothing about the hash index; the only cross-structure
//! links are the block indices it hands out. Blocks are zeroed when bound so
//! a recycled slot never leaks stale observations.

use anyhow::{Context, Result};

use crate::block::BLOCK_VOLUME;
use crate::voxel::Voxel;

/// Slab of `n_blocks * BLOCK_VOLUME` voxels plus the free-list stack.
#[derive(Debug)]
pub struct VoxelBlockArray {
    voxels: Vec<Voxel>,
    allocation_list: Vec<i32>,
    last_free_block_id: i32,
    /// Per-block operation state consumed by the host/device migration layer.
    op_states: Vec<u8>,
    n_blocks: u32,
}

impl VoxelBlockArray {
    /// Allocate backing storage for `n_blocks` blocks, all free.
    ///
    /// # Errors
    /// Returns an error if the voxel slab cannot be reserved; this is the one
    /// fatal construction failure the core reports instead of degrading.
    pub fn new(n_blocks: u32) -> Result<Self> {
        let voxel_count = n_blocks as usize * BLOCK_VOLUME;
        let mut voxels = Vec::new();
        voxels
            .try_reserve_exact(voxel_count)
            .with_context(|| format!("reserving {voxel_count} voxels for the block array"))?;
        voxels.resize(voxel_count, Voxel::empty());

        let allocation_list: Vec<i32> = (0..n_blocks as i32).collect();

        Ok(Self {
            voxels,
            allocation_list,
            last_free_block_id: n_blocks as i32 - 1,
            op_states: vec![0; n_blocks as usize],
            n_blocks,
        })
    }

    /// Pop a free block index; `None` when the pool is exhausted.
    #[inline]
    pub fn allocate(&mut self) -> Option<u32> {
        if self.last_free_block_id < 0 {
            return None;
        }
        let idx = self.allocation_list[self.last_free_block_id as usize];
        self.last_free_block_id -= 1;
        Some(idx as u32)
    }

    /// Push a block index back onto the free list.
    ///
    /// The caller is responsible for having removed every hash-entry
    /// reference first.
    #[inline]
    pub fn free(&mut self, block: u32) {
        debug_assert!(block < self.n_blocks);
        self.last_free_block_id += 1;
        self.allocation_list[self.last_free_block_id as usize] = block as i32;
    }

    /// Zero a block's voxels and its op state; called when a popped index is
    /// bound to a hash entry.
    pub fn reset_block(&mut self, block: u32) {
        let start = block as usize * BLOCK_VOLUME;
        for v in &mut self.voxels[start..start + BLOCK_VOLUME] {
            *v = Voxel::empty();
        }
        self.op_states[block as usize] = 0;
    }

    /// Voxels of one block.
    #[inline]
    #[must_use]
    pub fn block_voxels(&self, block: u32) -> &[Voxel] {
        let start = block as usize * BLOCK_VOLUME;
        &self.voxels[start..start + BLOCK_VOLUME]
    }

    /// Number of blocks currently on the free list.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> u32 {
        (self.last_free_block_id + 1) as u32
    }

    #[inline]
    #[must_use]
    pub const fn n_blocks(&self) -> u32 {
        self.n_blocks
    }

    /// Top-of-stack index of the free list (`-1` when empty).
    #[inline]
    #[must_use]
    pub const fn last_free_block_id(&self) -> i32 {
        self.last_free_block_id
    }

    #[inline]
    #[must_use]
    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    #[inline]
    pub fn voxels_mut(&mut self) -> &mut [Voxel] {
        &mut self.voxels
    }

    #[inline]
    #[must_use]
    pub fn allocation_list(&self) -> &[i32] {
        &self.allocation_list
    }

    #[inline]
    #[must_use]
    pub fn op_states(&self) -> &[u8] {
        &self.op_states
    }

    #[inline]
    pub fn op_states_mut(&mut self) -> &mut [u8] {
        &mut self.op_states
    }

    /// Rebuild from persisted parts. Lengths must agree with `n_blocks`.
    pub(crate) fn from_parts(
        voxels: Vec<Voxel>,
        allocation_list: Vec<i32>,
        last_free_block_id: i32,
        op_states: Vec<u8>,
    ) -> Result<Self> {
        let n_blocks = allocation_list.len() as u32;
        anyhow::ensure!(
            voxels.len() == n_blocks as usize * BLOCK_VOLUME,
            "voxel slab length {} does not match {} blocks",
            voxels.len(),
            n_blocks
        );
        anyhow::ensure!(
            op_states.len() == n_blocks as usize,
            "op-state length {} does not match {} blocks",
            op_states.len(),
            n_blocks
        );
        anyhow::ensure!(
            last_free_block_id >= -1 && last_free_block_id < n_blocks as i32,
            "free-list top {last_free_block_id} out of range for {n_blocks} blocks"
        );
        Ok(Self {
            voxels,
            allocation_list,
            last_free_block_id,
            op_states,
            n_blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    #[test]
    fn allocate_until_exhaustion() {
        let mut vba = VoxelBlockArray::new(4).unwrap();
        let mut seen = BTreeSet::new();
        for _ in 0..4 {
            assert!(seen.insert(vba.allocate().unwrap()));
        }
        assert_eq!(vba.allocate(), None);
        assert_eq!(vba.last_free_block_id(), -1);
    }

    #[test]
    fn reset_block_clears_voxels() {
        let mut vba = VoxelBlockArray::new(2).unwrap();
        let b = vba.allocate().unwrap();
        let start = b as usize * BLOCK_VOLUME;
        vba.voxels_mut()[start].w_depth = 7;
        vba.reset_block(b);
        assert!(vba.block_voxels(b).iter().all(Voxel::is_uninitialized));
    }

    proptest! {
        // Invariant: the free list always holds exactly the indices not
        // handed out, with no duplicates, under any allocate/free sequence.
        #[test]
        fn free_list_roundtrip(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let n = 8u32;
            let mut vba = VoxelBlockArray::new(n).unwrap();
            let mut held: Vec<u32> = Vec::new();

            for alloc in ops {
                if alloc {
                    if let Some(b) = vba.allocate() {
                        prop_assert!(!held.contains(&b), "double allocation of block {b}");
                        held.push(b);
                    } else {
                        prop_assert_eq!(held.len(), n as usize);
                    }
                } else if let Some(b) = held.pop() {
                    vba.free(b);
                }
            }

            prop_assert_eq!(vba.free_count() as usize, n as usize - held.len());
            let free: BTreeSet<i32> = if vba.last_free_block_id() >= 0 {
                vba.allocation_list()[..=vba.last_free_block_id() as usize].iter().copied().collect()
            } else {
                BTreeSet::new()
            };
            for b in &held {
                prop_assert!(!free.contains(&(*b as i32)), "held block {b} on free list");
            }
            prop_assert_eq!(free.len(), n as usize - held.len(), "free list has duplicates");
        }
    }
}
