//! Unified omnidirectional camera model (Mei).

use nalgebra::{Point2, Vector3};

use super::{CameraModel, ModelType, radtan_offset, radtan_undistort};

const UNDISTORT_ITERATIONS: usize = 8;

/// Mirror parameter `xi`, radial-tangential distortion and generalized focal
/// lengths `gamma1`, `gamma2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeiCamera {
    pub width: u32,
    pub height: u32,
    pub xi: f64,
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub gamma1: f64,
    pub gamma2: f64,
    pub u0: f64,
    pub v0: f64,
}

impl MeiCamera {
    /// Project a point in the camera frame to pixel coordinates.
    pub fn project(&self, p_c: &Vector3<f64>) -> Option<Point2<f64>> {
        let z = p_c.z + self.xi * p_c.norm();
        if z <= 0.0 {
            return None;
        }
        let (x, y) = (p_c.x / z, p_c.y / z);
        let (dx, dy) = radtan_offset(self.k1, self.k2, self.p1, self.p2, x, y);
        Some(Point2::new(
            self.gamma1 * (x + dx) + self.u0,
            self.gamma2 * (y + dy) + self.v0,
        ))
    }
}

impl CameraModel for MeiCamera {
    fn lift_projective(&self, pixel: &Point2<f64>) -> Vector3<f64> {
        let xd = (pixel.x - self.u0) / self.gamma1;
        let yd = (pixel.y - self.v0) / self.gamma2;
        let (x, y) = radtan_undistort(
            self.k1,
            self.k2,
            self.p1,
            self.p2,
            xd,
            yd,
            UNDISTORT_ITERATIONS,
        );

        let rho2 = x * x + y * y;
        if (self.xi - 1.0).abs() < f64::EPSILON {
            let lambda = 2.0 / (rho2 + 1.0);
            Vector3::new(lambda * x, lambda * y, lambda - 1.0)
        } else {
            let lambda =
                (self.xi + (1.0 + (1.0 - self.xi * self.xi) * rho2).sqrt()) / (1.0 + rho2);
            Vector3::new(lambda * x, lambda * y, lambda - self.xi)
        }
    }

    fn image_width(&self) -> u32 {
        self.width
    }

    fn image_height(&self) -> u32 {
        self.height
    }

    fn model_type(&self) -> ModelType {
        ModelType::Mei
    }
}
