// crates/tsdf-fusion/src/view.rs

//! Per-frame sensor inputs: depth (mandatory) and color (optional) images
//! with their poses and intrinsics.
//!
//! Poses are world → camera. Invalid depth is encoded as `0`; anything
//! non-finite in a pose or in the intrinsics is rejected here, at the frame
//! boundary, so the kernels never see it.

use anyhow::{ensure, Result};
use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use tsdf_core::geom::{pose_is_finite, sample_bilinear_rgb, sample_nearest_f32, ProjParams};

/// Depth image in world units; `0` marks a pixel without a measurement.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DepthImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl DepthImage {
    /// # Errors
    /// Fails when `data` does not hold exactly `width * height` samples.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        ensure!(
            data.len() == (width * height) as usize,
            "depth buffer holds {} samples, expected {}x{}",
            data.len(),
            width,
            height
        );
        Ok(Self { width, height, data })
    }

    /// Constant-depth image (test and simulation helper).
    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; (width * height) as usize],
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(x + y * self.width) as usize]
    }

    /// Nearest-neighbor sample at continuous pixel coordinates.
    #[inline]
    #[must_use]
    pub fn sample_nearest(&self, p: Vec2) -> f32 {
        sample_nearest_f32(&self.data, self.width, p)
    }
}

/// RGBA color image.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RgbImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<[u8; 4]>,
}

impl RgbImage {
    /// # Errors
    /// Fails when `data` does not hold exactly `width * height` pixels.
    pub fn new(width: u32, height: u32, data: Vec<[u8; 4]>) -> Result<Self> {
        ensure!(
            data.len() == (width * height) as usize,
            "rgb buffer holds {} pixels, expected {}x{}",
            data.len(),
            width,
            height
        );
        Ok(Self { width, height, data })
    }

    /// Bilinear RGB sample (channels in `[0, 255]`).
    #[inline]
    #[must_use]
    pub fn sample_bilinear(&self, p: Vec2) -> Vec3 {
        sample_bilinear_rgb(&self.data, self.width, p)
    }
}

/// One frame of input to the integration engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FrameView {
    pub depth: DepthImage,
    pub rgb: Option<RgbImage>,
    /// World → depth-camera pose.
    pub m_d: Mat4,
    /// World → color-camera pose.
    pub m_rgb: Mat4,
    pub proj_d: ProjParams,
    pub proj_rgb: ProjParams,
}

impl FrameView {
    /// Validate and assemble a frame.
    ///
    /// # Errors
    /// Rejects non-finite poses and degenerate intrinsics.
    pub fn new(
        depth: DepthImage,
        rgb: Option<RgbImage>,
        m_d: Mat4,
        m_rgb: Mat4,
        proj_d: ProjParams,
        proj_rgb: ProjParams,
    ) -> Result<Self> {
        ensure!(pose_is_finite(&m_d), "depth pose is not finite");
        ensure!(pose_is_finite(&m_rgb), "color pose is not finite");
        for (name, p) in [("depth", &proj_d), ("color", &proj_rgb)] {
            ensure!(
                p.fx.is_finite() && p.fy.is_finite() && p.cx.is_finite() && p.cy.is_finite(),
                "{name} intrinsics are not finite"
            );
            ensure!(p.fx != 0.0 && p.fy != 0.0, "{name} focal length is zero");
        }
        Ok(Self {
            depth,
            rgb,
            m_d,
            m_rgb,
            proj_d,
            proj_rgb,
        })
    }

    /// Depth-only frame with a shared pose and intrinsics for both cameras.
    ///
    /// # Errors
    /// Same validation as [`FrameView::new`].
    pub fn depth_only(depth: DepthImage, m_d: Mat4, proj_d: ProjParams) -> Result<Self> {
        Self::new(depth, None, m_d, m_d, proj_d, proj_d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_image_checks_length() {
        assert!(DepthImage::new(4, 4, vec![0.0; 16]).is_ok());
        assert!(DepthImage::new(4, 4, vec![0.0; 15]).is_err());
    }

    #[test]
    fn non_finite_pose_is_rejected() {
        let depth = DepthImage::filled(2, 2, 1.0);
        let mut pose = Mat4::IDENTITY;
        pose.w_axis.z = f32::INFINITY;
        let r = FrameView::depth_only(depth, pose, ProjParams::new(1.0, 1.0, 0.0, 0.0));
        assert!(r.is_err());
    }

    #[test]
    fn zero_focal_length_is_rejected() {
        let depth = DepthImage::filled(2, 2, 1.0);
        let r = FrameView::depth_only(depth, Mat4::IDENTITY, ProjParams::new(0.0, 1.0, 0.0, 0.0));
        assert!(r.is_err());
    }
}
