//! Rectilinear pinhole camera with radial-tangential distortion.

use nalgebra::{Point2, Vector3};

use super::{CameraModel, ModelType, radtan_offset, radtan_undistort};

/// Fixed-point iterations used to invert the distortion polynomial.
const UNDISTORT_ITERATIONS: usize = 8;

/// Pinhole intrinsics plus `k1, k2, p1, p2` distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeCamera {
    pub width: u32,
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
}

impl PinholeCamera {
    /// Camera without lens distortion.
    pub fn ideal(width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            cx,
            cy,
            k1: 0.0,
            k2: 0.0,
            p1: 0.0,
            p2: 0.0,
        }
    }

    fn has_distortion(&self) -> bool {
        self.k1 != 0.0 || self.k2 != 0.0 || self.p1 != 0.0 || self.p2 != 0.0
    }

    /// Project a point in the camera frame to distorted pixel coordinates.
    ///
    /// Returns `None` for points at or behind the camera center.
    pub fn project(&self, p_c: &Vector3<f64>) -> Option<Point2<f64>> {
        if p_c.z <= 0.0 {
            return None;
        }
        let (x, y) = (p_c.x / p_c.z, p_c.y / p_c.z);
        let (dx, dy) = radtan_offset(self.k1, self.k2, self.p1, self.p2, x, y);
        Some(Point2::new(
            self.fx * (x + dx) + self.cx,
            self.fy * (y + dy) + self.cy,
        ))
    }
}

impl CameraModel for PinholeCamera {
    fn lift_projective(&self, pixel: &Point2<f64>) -> Vector3<f64> {
        let xd = (pixel.x - self.cx) / self.fx;
        let yd = (pixel.y - self.cy) / self.fy;

        if !self.has_distortion() {
            return Vector3::new(xd, yd, 1.0);
        }

        let (x, y) = radtan_undistort(
            self.k1,
            self.k2,
            self.p1,
            self.p2,
            xd,
            yd,
            UNDISTORT_ITERATIONS,
        );
        Vector3::new(x, y, 1.0)
    }

    fn image_width(&self) -> u32 {
        self.width
    }

    fn image_height(&self) -> u32 {
        self.height
    }

    fn model_type(&self) -> ModelType {
        ModelType::Pinhole
    }
}
