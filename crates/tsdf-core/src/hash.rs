// crates/tsdf-core/src/hash.rs

//! Bucketed spatial hash over block coordinates with an overflow ("excess")
//! chain region.
//!
//! Layout: `n_buckets * entries_per_bucket` ordered entries followed by
//! `n_excess` excess entries. An entry's `offset` field links chains through
//! the excess region: `0` means no successor, `k + 1` points at excess slot
//! `k`. Lookups are read-only and lock-free; all mutation happens in the
//! single-sweep allocation resolver.

use serde::{Deserialize, Serialize};

use crate::block::{bucket_index, BlockPos};

/// Tagged replacement for the raw block-pointer sentinels.
///
/// The wire encoding is the sentinel one: `>= 0` resident pool index, `-1`
/// evicted to host storage, `-2` split into finer-level children, `<= -3`
/// free slot. [`BlockState::to_raw`] / [`BlockState::from_raw`] round-trip it
/// at the persistence boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockState {
    /// Slot is unoccupied; `pos` is don't-care.
    Free,
    /// Hierarchical only: decisions at this coordinate defer to the next
    /// finer level.
    Split,
    /// Entry is live but its voxels are on host storage.
    Evicted,
    /// Entry is live and resident; payload is the block-pool index.
    Resident(u32),
}

impl BlockState {
    /// Sentinel encoding used on disk and by accelerator kernels.
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> i32 {
        match self {
            Self::Free => -3,
            Self::Split => -2,
            Self::Evicted => -1,
            Self::Resident(idx) => idx as i32,
        }
    }

    /// Decode the sentinel encoding; any value `<= -3` is `Free`.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            idx if idx >= 0 => Self::Resident(idx as u32),
            -1 => Self::Evicted,
            -2 => Self::Split,
            _ => Self::Free,
        }
    }

    /// Whether the entry occupies its slot (`pos` is meaningful).
    #[inline]
    #[must_use]
    pub const fn is_occupied(self) -> bool {
        !matches!(self, Self::Free)
    }
}

/// One hash-table slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashEntry {
    /// Block coordinate; meaningful only when the slot is occupied.
    pub pos: BlockPos,
    /// Excess-chain link: `0` = end of chain, `k + 1` = excess slot `k`.
    pub offset: i32,
    pub state: BlockState,
}

impl HashEntry {
    #[inline]
    #[must_use]
    pub const fn vacant() -> Self {
        Self {
            pos: BlockPos::new(0, 0, 0),
            offset: 0,
            state: BlockState::Free,
        }
    }
}

/// Sentinel-encoded entry as persisted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawHashEntry {
    pub pos: [i16; 3],
    pub offset: i32,
    pub ptr: i32,
}

impl From<HashEntry> for RawHashEntry {
    fn from(e: HashEntry) -> Self {
        Self {
            pos: [e.pos.x, e.pos.y, e.pos.z],
            offset: e.offset,
            ptr: e.state.to_raw(),
        }
    }
}

impl From<RawHashEntry> for HashEntry {
    fn from(r: RawHashEntry) -> Self {
        Self {
            pos: BlockPos::new(r.pos[0], r.pos[1], r.pos[2]),
            offset: r.offset,
            state: BlockState::from_raw(r.ptr),
        }
    }
}

/// Insert decision produced by [`VoxelHash::prepare_insert`].
///
/// The allocation pass records these as per-entry intents; the resolver
/// materializes them one sweep later.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertDecision {
    /// The coordinate is already present at `index`.
    Found { index: u32, state: BlockState },
    /// `index` is the first free ordered slot of the home bucket.
    RoomInBucket { index: u32 },
    /// The bucket and its chain are full of other coordinates; a new excess
    /// entry must be linked after `parent`.
    NeedExcess { parent: u32 },
}

/// The bucketed hash index.
#[derive(Debug)]
pub struct VoxelHash {
    n_buckets: u32,
    entries_per_bucket: u32,
    n_excess: u32,
    entries: Vec<HashEntry>,
    /// Next never-used excess slot (relative to the excess region). Excess
    /// slots are handed out monotonically; entry removal is out of scope, so
    /// no free list is kept for them.
    excess_cursor: u32,
}

impl VoxelHash {
    #[must_use]
    pub fn new(n_buckets: u32, entries_per_bucket: u32, n_excess: u32) -> Self {
        let total = (n_buckets * entries_per_bucket + n_excess) as usize;
        Self {
            n_buckets,
            entries_per_bucket,
            n_excess,
            entries: vec![HashEntry::vacant(); total],
            excess_cursor: 0,
        }
    }

    /// Number of entries in the ordered (bucketed) region.
    #[inline]
    #[must_use]
    pub const fn ordered_len(&self) -> u32 {
        self.n_buckets * self.entries_per_bucket
    }

    /// Total entry count, ordered region plus excess region.
    #[inline]
    #[must_use]
    pub const fn total_len(&self) -> u32 {
        self.ordered_len() + self.n_excess
    }

    #[inline]
    #[must_use]
    pub const fn n_buckets(&self) -> u32 {
        self.n_buckets
    }

    #[inline]
    #[must_use]
    pub const fn entries_per_bucket(&self) -> u32 {
        self.entries_per_bucket
    }

    #[inline]
    #[must_use]
    pub const fn n_excess(&self) -> u32 {
        self.n_excess
    }

    /// Number of excess slots handed out so far.
    #[inline]
    #[must_use]
    pub const fn excess_used(&self) -> u32 {
        self.excess_cursor
    }

    #[inline]
    #[must_use]
    pub fn entry(&self, index: u32) -> &HashEntry {
        &self.entries[index as usize]
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[HashEntry] {
        &self.entries
    }

    /// Read-only lookup: scan the home bucket, then walk the excess chain
    /// hanging off the bucket's last ordered slot.
    ///
    /// Matches any occupied entry, including `Split` parents; the
    /// hierarchical walker needs those, and flat tables never contain them.
    #[must_use]
    pub fn find(&self, pos: BlockPos) -> Option<(u32, BlockState)> {
        let base = bucket_index(pos, self.n_buckets) * self.entries_per_bucket;

        let mut offset_excess = 0i32;
        for slot in 0..self.entries_per_bucket {
            let idx = base + slot;
            let e = &self.entries[idx as usize];
            offset_excess = e.offset - 1;
            if e.state.is_occupied() && e.pos == pos {
                return Some((idx, e.state));
            }
        }

        let ordered = self.ordered_len();
        while offset_excess >= 0 {
            let idx = ordered + offset_excess as u32;
            let e = &self.entries[idx as usize];
            if e.state.is_occupied() && e.pos == pos {
                return Some((idx, e.state));
            }
            offset_excess = e.offset - 1;
        }
        None
    }

    /// Lookup variant for the allocation pass: besides finding `pos`, record
    /// where an insert would have to go.
    ///
    /// Tie-break: the *first* free ordered slot of the bucket wins. Distinct
    /// coordinates staged against the same free slot in one frame are allowed
    /// to race; one survives, the others re-submit next frame.
    #[must_use]
    pub fn prepare_insert(&self, pos: BlockPos) -> InsertDecision {
        let base = bucket_index(pos, self.n_buckets) * self.entries_per_bucket;

        let mut first_free = None;
        let mut offset_excess = 0i32;
        for slot in 0..self.entries_per_bucket {
            let idx = base + slot;
            let e = &self.entries[idx as usize];
            offset_excess = e.offset - 1;
            if e.state.is_occupied() && e.pos == pos {
                return InsertDecision::Found {
                    index: idx,
                    state: e.state,
                };
            }
            if first_free.is_none() && !e.state.is_occupied() {
                first_free = Some(idx);
            }
        }

        if let Some(index) = first_free {
            return InsertDecision::RoomInBucket { index };
        }

        // Bucket full: walk the chain, remembering the tail as the link point.
        let ordered = self.ordered_len();
        let mut parent = base + self.entries_per_bucket - 1;
        while offset_excess >= 0 {
            let idx = ordered + offset_excess as u32;
            let e = &self.entries[idx as usize];
            if e.state.is_occupied() && e.pos == pos {
                return InsertDecision::Found {
                    index: idx,
                    state: e.state,
                };
            }
            parent = idx;
            offset_excess = e.offset - 1;
        }

        InsertDecision::NeedExcess { parent }
    }

    /// Hand out the next unused excess slot (relative index), or `None` when
    /// the excess region is exhausted.
    #[inline]
    pub fn acquire_excess_slot(&mut self) -> Option<u32> {
        if self.excess_cursor < self.n_excess {
            let rel = self.excess_cursor;
            self.excess_cursor += 1;
            Some(rel)
        } else {
            None
        }
    }

    /// Install a live entry at `index`, overwriting the slot.
    #[inline]
    pub fn install(&mut self, index: u32, pos: BlockPos, state: BlockState) {
        self.entries[index as usize] = HashEntry { pos, offset: 0, state };
    }

    /// Link `parent`'s chain to the excess slot `rel` (relative index).
    #[inline]
    pub fn link_excess(&mut self, parent: u32, rel: u32) {
        self.entries[parent as usize].offset = rel as i32 + 1;
    }

    /// Overwrite an entry's state in place (eviction / swap-in / split
    /// transitions driven by external collaborators).
    #[inline]
    pub fn set_state(&mut self, index: u32, state: BlockState) {
        self.entries[index as usize].state = state;
    }

    /// Rebuild from a persisted dump.
    pub(crate) fn from_parts(
        n_buckets: u32,
        entries_per_bucket: u32,
        n_excess: u32,
        entries: Vec<HashEntry>,
        excess_cursor: u32,
    ) -> anyhow::Result<Self> {
        let expect = (n_buckets * entries_per_bucket + n_excess) as usize;
        anyhow::ensure!(
            entries.len() == expect,
            "hash dump has {} entries, expected {expect}",
            entries.len()
        );
        anyhow::ensure!(
            excess_cursor <= n_excess,
            "excess cursor {excess_cursor} exceeds excess region {n_excess}"
        );
        Ok(Self {
            n_buckets,
            entries_per_bucket,
            n_excess,
            entries,
            excess_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> VoxelHash {
        VoxelHash::new(16, 1, 4)
    }

    /// Find three coordinates sharing a bucket (for chain tests).
    fn colliding_coords(hash: &VoxelHash, n: usize) -> Vec<BlockPos> {
        let target = bucket_index(BlockPos::new(1, 0, 0), hash.n_buckets());
        let mut out = vec![BlockPos::new(1, 0, 0)];
        let mut z = 1i16;
        while out.len() < n {
            let c = BlockPos::new(1, 0, z);
            if bucket_index(c, hash.n_buckets()) == target {
                out.push(c);
            }
            z += 1;
        }
        out
    }

    #[test]
    fn raw_state_roundtrip() {
        for s in [
            BlockState::Free,
            BlockState::Split,
            BlockState::Evicted,
            BlockState::Resident(0),
            BlockState::Resident(12345),
        ] {
            assert_eq!(BlockState::from_raw(s.to_raw()), s);
        }
        // Any deeper negative decodes as Free.
        assert_eq!(BlockState::from_raw(-7), BlockState::Free);
    }

    #[test]
    fn find_on_empty_table_is_none() {
        assert_eq!(tiny().find(BlockPos::new(3, -2, 9)), None);
    }

    #[test]
    fn insert_decision_prefers_first_free_slot() {
        let hash = VoxelHash::new(4, 2, 4);
        let pos = BlockPos::new(2, 0, 0);
        match hash.prepare_insert(pos) {
            InsertDecision::RoomInBucket { index } => {
                assert_eq!(index % 2, 0, "first slot of the bucket expected");
            }
            other => panic!("unexpected decision {other:?}"),
        }
    }

    #[test]
    fn excess_chain_links_and_finds() {
        let mut hash = tiny();
        let coords = colliding_coords(&hash, 3);

        // First coordinate occupies the ordered slot.
        let InsertDecision::RoomInBucket { index: slot } = hash.prepare_insert(coords[0]) else {
            panic!("expected room in bucket");
        };
        hash.install(slot, coords[0], BlockState::Resident(0));

        // Second chains off the ordered slot.
        let InsertDecision::NeedExcess { parent } = hash.prepare_insert(coords[1]) else {
            panic!("expected excess decision");
        };
        assert_eq!(parent, slot);
        let rel = hash.acquire_excess_slot().unwrap();
        assert_eq!(rel, 0);
        hash.install(hash.ordered_len() + rel, coords[1], BlockState::Resident(1));
        hash.link_excess(parent, rel);

        // Third chains off the first excess entry.
        let InsertDecision::NeedExcess { parent } = hash.prepare_insert(coords[2]) else {
            panic!("expected excess decision");
        };
        assert_eq!(parent, hash.ordered_len());
        let rel = hash.acquire_excess_slot().unwrap();
        assert_eq!(rel, 1);
        hash.install(hash.ordered_len() + rel, coords[2], BlockState::Resident(2));
        hash.link_excess(parent, rel);

        assert_eq!(hash.entry(slot).offset, 1);
        assert_eq!(hash.entry(hash.ordered_len()).offset, 2);
        for (i, c) in coords.iter().enumerate() {
            let (idx, state) = hash.find(*c).unwrap();
            assert_eq!(state, BlockState::Resident(i as u32));
            assert_eq!(hash.entry(idx).pos, *c);
        }
    }

    #[test]
    fn excess_exhaustion_reports_none() {
        let mut hash = VoxelHash::new(2, 1, 1);
        assert!(hash.acquire_excess_slot().is_some());
        assert!(hash.acquire_excess_slot().is_none());
    }

    #[test]
    fn free_entries_do_not_match_stale_pos() {
        let mut hash = tiny();
        let pos = BlockPos::new(5, 5, 5);
        let InsertDecision::RoomInBucket { index } = hash.prepare_insert(pos) else {
            panic!("expected room");
        };
        hash.install(index, pos, BlockState::Resident(3));
        hash.set_state(index, BlockState::Free);
        assert_eq!(hash.find(pos), None);
    }
}
