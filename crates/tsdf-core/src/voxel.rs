// crates/tsdf-core/src/voxel.rs

//! Fixed-point voxel record and the weighted-update arithmetic shared by the
//! depth and color fusion paths.
//!
//! The signed distance is stored as an `i16` mapping the truncation interval
//! `[-1, +1]` linearly onto `[-SDF_SCALE, +SDF_SCALE]`. A voxel is
//! *uninitialized* exactly when its depth weight is zero.

use serde::{Deserialize, Serialize};

/// Largest encodable fixed-point magnitude; `i16::MAX` so the mapping is
/// symmetric around zero.
pub const SDF_SCALE: f32 = 32767.0;

/// Decode a fixed-point signed distance to `[-1, +1]`.
#[inline]
#[must_use]
pub fn sdf_value_to_f32(v: i16) -> f32 {
    f32::from(v) / SDF_SCALE
}

/// Encode a float signed distance, clamping to `[-1, +1]` and rounding to the
/// nearest representable value.
#[inline]
#[must_use]
pub fn sdf_f32_to_value(f: f32) -> i16 {
    (f.clamp(-1.0, 1.0) * SDF_SCALE).round() as i16
}

/// One step of the weighted running mean: fold observation `obs` (weight 1)
/// into `(old, w_old)`. The denominator is `w_old + 1 >= 1`, so no division
/// by zero can occur.
#[inline]
#[must_use]
pub fn weighted_mean(old: f32, w_old: f32, obs: f32) -> f32 {
    (w_old * old + obs) / (w_old + 1.0)
}

/// A single TSDF voxel.
///
/// The color fields are always present; whether they are updated is decided
/// per engine (see the fusion kernel), so a depth-only pipeline simply leaves
/// `w_color == 0`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Voxel {
    /// Fixed-point truncated signed distance.
    pub sdf: i16,
    /// Depth observation count, saturating at the configured maximum.
    pub w_depth: u8,
    /// RGB color, quantized per channel.
    pub clr: [u8; 3],
    /// Color observation count.
    pub w_color: u8,
}

impl Voxel {
    /// The never-observed voxel: encoded `+1` distance, zero weights.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            sdf: i16::MAX,
            w_depth: 0,
            clr: [0; 3],
            w_color: 0,
        }
    }

    /// Whether this voxel has never received a depth observation.
    #[inline]
    #[must_use]
    pub const fn is_uninitialized(&self) -> bool {
        self.w_depth == 0
    }

    /// Signed distance as a float in `[-1, +1]`.
    #[inline]
    #[must_use]
    pub fn sdf_f32(&self) -> f32 {
        sdf_value_to_f32(self.sdf)
    }
}

impl Default for Voxel {
    fn default() -> Self {
        Self::empty()
    }
}
