// crates/tsdf-core/src/config.rs

//! Volume parameters and their validation gate.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

/// Parameters of a reconstruction volume.
///
/// `mu` is the half-width of the truncation band in world units; doubling it
/// roughly doubles the number of allocated blocks. `max_weight` trades drift
/// against ghosting on dynamic scenes. The table dimensions set collision
/// resilience; `z_min`/`z_max` cull the frustum.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VolumeConfig {
    /// Capacity of the voxel block pool.
    pub n_blocks: u32,
    /// Number of hash buckets per level.
    pub n_buckets: u32,
    /// Ordered entries per bucket (1 is typical).
    pub entries_per_bucket: u32,
    /// Overflow entries per level.
    pub n_excess: u32,
    /// Edge length of one voxel in world units, at the finest level.
    pub voxel_size: f32,
    /// Truncation band half-width in world units.
    pub mu: f32,
    /// Saturation value for observation weights.
    pub max_weight: u8,
    /// Near frustum plane.
    pub z_min: f32,
    /// Far frustum plane.
    pub z_max: f32,
    /// Index levels: 1 = flat, >= 2 = hierarchical with block edges doubling
    /// per level.
    pub levels: u8,
    /// Whether color is fused at all.
    pub color: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            n_blocks: 0x1_0000,
            n_buckets: 0x4_0000,
            entries_per_bucket: 1,
            n_excess: 0x8000,
            voxel_size: 0.005,
            mu: 0.02,
            max_weight: 100,
            z_min: 0.2,
            z_max: 3.0,
            levels: 1,
            color: true,
        }
    }
}

impl VolumeConfig {
    /// Check the parameters a scene can actually be built from.
    ///
    /// # Errors
    /// Returns a message naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.n_blocks > 0, "n_blocks must be positive");
        ensure!(self.n_buckets > 0, "n_buckets must be positive");
        ensure!(self.entries_per_bucket > 0, "entries_per_bucket must be positive");
        ensure!(self.n_excess > 0, "n_excess must be positive");
        ensure!(
            self.voxel_size.is_finite() && self.voxel_size > 0.0,
            "voxel_size must be positive and finite"
        );
        ensure!(self.mu.is_finite() && self.mu > 0.0, "mu must be positive and finite");
        ensure!(self.max_weight > 0, "max_weight must be positive");
        ensure!(
            self.z_min.is_finite() && self.z_max.is_finite() && self.z_min < self.z_max,
            "frustum bounds must be finite with z_min < z_max"
        );
        ensure!(self.levels >= 1, "at least one index level is required");
        Ok(())
    }

    /// Voxel edge length at `level` (levels double the edge each step).
    #[inline]
    #[must_use]
    pub fn voxel_size_at(&self, level: u8) -> f32 {
        self.voxel_size * (1u32 << level) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        VolumeConfig::default().validate().unwrap();
    }

    #[test]
    fn bad_frustum_is_rejected() {
        let cfg = VolumeConfig {
            z_min: 2.0,
            z_max: 1.0,
            ..VolumeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn voxel_size_doubles_per_level() {
        let cfg = VolumeConfig::default();
        assert!((cfg.voxel_size_at(2) - cfg.voxel_size * 4.0).abs() < f32::EPSILON);
    }
}
