// crates/tsdf-core/src/staging.rs

//! Per-entry side arrays written by the allocation/visibility pass.
//!
//! One element per hash entry: the allocation intent, the visibility kind,
//! and the staged block coordinate. Pixels are processed data-parallel, so
//! the cells are atomics; the pass boundary is the only synchronization
//! point and `Relaxed` ordering suffices.
//!
//! Visibility uses `fetch_max` so an "evicted" mark (2) can never be
//! overwritten by a concurrent "resident" mark (1) for the same frame.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::block::BlockPos;

/// No allocation requested for this entry.
pub const ALLOC_NONE: u8 = 0;
/// Allocate in this ordered slot.
pub const ALLOC_ORDERED: u8 = 1;
/// Allocate a new excess slot chained from this entry.
pub const ALLOC_EXCESS: u8 = 2;

/// Entry not visible this frame.
pub const VISIBLE_NONE: u8 = 0;
/// Entry visible and resident.
pub const VISIBLE_RESIDENT: u8 = 1;
/// Entry visible but its block is swapped out.
pub const VISIBLE_EVICTED: u8 = 2;

/// Side arrays for one hash level.
#[derive(Debug)]
pub struct AllocationStaging {
    alloc_type: Vec<AtomicU8>,
    visible_type: Vec<AtomicU8>,
    block_coords: Vec<AtomicU64>,
}

impl AllocationStaging {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            alloc_type: (0..len).map(|_| AtomicU8::new(0)).collect(),
            visible_type: (0..len).map(|_| AtomicU8::new(0)).collect(),
            block_coords: (0..len).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.alloc_type.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alloc_type.is_empty()
    }

    /// Reset every cell; called at frame start (and by an abandoning caller
    /// before reuse).
    pub fn clear(&self) {
        for a in &self.alloc_type {
            a.store(ALLOC_NONE, Ordering::Relaxed);
        }
        for v in &self.visible_type {
            v.store(VISIBLE_NONE, Ordering::Relaxed);
        }
        // Coordinates are only read behind a nonzero alloc_type; no clear needed.
    }

    /// Stage "allocate in ordered slot `index`" for `pos`, marking it
    /// visible. Idempotent for equal `pos`; distinct coordinates hitting the
    /// same slot race deliberately (last write wins, losers retry next
    /// frame).
    #[inline]
    pub fn stage_ordered(&self, index: u32, pos: BlockPos) {
        self.block_coords[index as usize].store(pos.pack(), Ordering::Relaxed);
        self.alloc_type[index as usize].store(ALLOC_ORDERED, Ordering::Relaxed);
        self.mark_visible(index, VISIBLE_RESIDENT);
    }

    /// Stage "allocate an excess slot chained from `parent`" for `pos`.
    /// The new entry's visibility is marked by the resolver once the slot
    /// exists.
    #[inline]
    pub fn stage_excess(&self, parent: u32, pos: BlockPos) {
        self.block_coords[parent as usize].store(pos.pack(), Ordering::Relaxed);
        self.alloc_type[parent as usize].store(ALLOC_EXCESS, Ordering::Relaxed);
    }

    /// Raise the visibility kind of `index` to at least `kind`.
    #[inline]
    pub fn mark_visible(&self, index: u32, kind: u8) {
        self.visible_type[index as usize].fetch_max(kind, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn alloc_type(&self, index: u32) -> u8 {
        self.alloc_type[index as usize].load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub fn visible_type(&self, index: u32) -> u8 {
        self.visible_type[index as usize].load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub fn staged_coords(&self, index: u32) -> BlockPos {
        BlockPos::unpack(self.block_coords[index as usize].load(Ordering::Relaxed))
    }

    /// Clear one entry's allocation intent (resolver, after materializing or
    /// dropping it).
    #[inline]
    pub fn clear_alloc(&self, index: u32) {
        self.alloc_type[index as usize].store(ALLOC_NONE, Ordering::Relaxed);
    }
}
