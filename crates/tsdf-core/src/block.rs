// crates/tsdf-core/src/block.rs

//! Integer block coordinates and block-local voxel addressing.
//!
//! A voxel block is a `BLOCK_SIDE`³ cube of voxels addressed by one
//! `BlockPos` in voxel-block units. The bucket hash over block coordinates
//! must be deterministic and identical on every execution target, so it is
//! written out in wrapping `u32` arithmetic rather than relying on the
//! platform hasher.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Edge length of a voxel block, in voxels.
pub const BLOCK_SIDE: usize = 8;

/// Number of voxels per block (`BLOCK_SIDE`³).
pub const BLOCK_VOLUME: usize = BLOCK_SIDE * BLOCK_SIDE * BLOCK_SIDE;

// Teschner et al. spatial-hash primes; large, odd, pairwise unrelated.
const HASH_P1: u32 = 73_856_093;
const HASH_P2: u32 = 19_349_669;
const HASH_P3: u32 = 83_492_791;

/// Integer block coordinate in voxel-block units.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BlockPos {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl BlockPos {
    #[inline]
    #[must_use]
    pub const fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Block containing a point given in voxel-block units (componentwise
    /// floor).
    #[inline]
    #[must_use]
    pub fn containing(p: Vec3) -> Self {
        Self {
            x: p.x.floor() as i16,
            y: p.y.floor() as i16,
            z: p.z.floor() as i16,
        }
    }

    /// Block at `level` containing a voxel coordinate given in finest-voxel
    /// units. The block edge at level `l` is `BLOCK_SIDE << l` voxels; floor
    /// division keeps negative coordinates on the correct side of the origin.
    #[inline]
    #[must_use]
    pub fn of_voxel(v: glam::IVec3, level: u8) -> Self {
        let edge = (BLOCK_SIDE << level) as i32;
        Self {
            x: v.x.div_euclid(edge) as i16,
            y: v.y.div_euclid(edge) as i16,
            z: v.z.div_euclid(edge) as i16,
        }
    }

    /// Coordinate of this block's origin voxel, in the block's own level
    /// units (multiply by the level voxel size for world space).
    #[inline]
    #[must_use]
    pub fn origin_voxel(&self) -> glam::IVec3 {
        glam::IVec3::new(
            i32::from(self.x) * BLOCK_SIDE as i32,
            i32::from(self.y) * BLOCK_SIDE as i32,
            i32::from(self.z) * BLOCK_SIDE as i32,
        )
    }

    /// Pack into the low 48 bits of a `u64` (for the staging side array).
    #[inline]
    #[must_use]
    pub const fn pack(self) -> u64 {
        (self.x as u16 as u64) | ((self.y as u16 as u64) << 16) | ((self.z as u16 as u64) << 32)
    }

    /// Inverse of [`BlockPos::pack`].
    #[inline]
    #[must_use]
    pub const fn unpack(bits: u64) -> Self {
        Self {
            x: bits as u16 as i16,
            y: (bits >> 16) as u16 as i16,
            z: (bits >> 32) as u16 as i16,
        }
    }
}

/// Bucket index of a block coordinate.
///
/// `((x*p1) ^ (y*p2) ^ (z*p3)) mod n_buckets` in wrapping `u32` arithmetic;
/// the i16 components sign-extend first, matching integer promotion on the
/// accelerator side.
#[inline]
#[must_use]
pub fn bucket_index(pos: BlockPos, n_buckets: u32) -> u32 {
    let hx = (pos.x as i32 as u32).wrapping_mul(HASH_P1);
    let hy = (pos.y as i32 as u32).wrapping_mul(HASH_P2);
    let hz = (pos.z as i32 as u32).wrapping_mul(HASH_P3);
    (hx ^ hy ^ hz) % n_buckets
}

/// Linear index of a voxel inside its block (`x` fastest, `z` slowest).
#[inline]
#[must_use]
pub const fn voxel_linear_index(x: usize, y: usize, z: usize) -> usize {
    x + y * BLOCK_SIDE + z * BLOCK_SIDE * BLOCK_SIDE
}

/// Inverse of [`voxel_linear_index`].
#[inline]
#[must_use]
pub const fn voxel_local_coords(lin: usize) -> (usize, usize, usize) {
    let z = lin / (BLOCK_SIDE * BLOCK_SIDE);
    let rem = lin % (BLOCK_SIDE * BLOCK_SIDE);
    (rem % BLOCK_SIDE, rem / BLOCK_SIDE, z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    #[test]
    fn pack_roundtrip_with_negatives() {
        for p in [
            BlockPos::new(0, 0, 0),
            BlockPos::new(-1, -2, -3),
            BlockPos::new(i16::MAX, i16::MIN, 7),
        ] {
            assert_eq!(BlockPos::unpack(p.pack()), p);
        }
    }

    #[test]
    fn containing_floors_negative_points() {
        assert_eq!(
            BlockPos::containing(Vec3::new(-0.25, 1.75, -3.0)),
            BlockPos::new(-1, 1, -3)
        );
    }

    #[test]
    fn of_voxel_floor_divides() {
        // Level 0: 8-voxel blocks.
        assert_eq!(BlockPos::of_voxel(IVec3::new(7, 8, -1), 0), BlockPos::new(0, 1, -1));
        // Level 1: 16-voxel blocks.
        assert_eq!(BlockPos::of_voxel(IVec3::new(15, 16, -17), 1), BlockPos::new(0, 1, -2));
    }

    #[test]
    fn bucket_index_is_stable() {
        // Pinned values; a change here silently invalidates every snapshot.
        let n = 0x4_0000;
        assert_eq!(bucket_index(BlockPos::new(0, 0, 0), n), 0);
        let a = bucket_index(BlockPos::new(1, 2, 3), n);
        let b = bucket_index(BlockPos::new(1, 2, 3), n);
        assert_eq!(a, b);
        assert!(a < n);
        // Sign-extension matters: (-1, 0, 0) must differ from (1, 0, 0).
        assert_ne!(
            bucket_index(BlockPos::new(-1, 0, 0), n),
            bucket_index(BlockPos::new(1, 0, 0), n)
        );
    }

    #[test]
    fn linear_index_roundtrip() {
        for lin in 0..BLOCK_VOLUME {
            let (x, y, z) = voxel_local_coords(lin);
            assert_eq!(voxel_linear_index(x, y, z), lin);
        }
    }
}
