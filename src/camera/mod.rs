//! Camera projection models.
//!
//! The tracker depends on a single capability: lifting a pixel to a ray in the
//! camera frame. Each lens family implements [`CameraModel`] and is selected
//! once, from the calibration file, when the tracker is set up.

pub mod calibration;
pub mod kannala_brandt;
pub mod mei;
pub mod pinhole;

use std::fmt;

use nalgebra::{Point2, Vector3};

pub use calibration::{CameraCalibration, CameraError};
pub use kannala_brandt::KannalaBrandtCamera;
pub use mei::MeiCamera;
pub use pinhole::PinholeCamera;

/// Lens family of a calibrated camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Rectilinear projection with radial/tangential distortion.
    Pinhole,
    /// Equidistant fisheye (Kannala-Brandt polynomial in theta).
    KannalaBrandt,
    /// Unified omnidirectional model (Mei) with mirror parameter xi.
    Mei,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelType::Pinhole => "PINHOLE",
            ModelType::KannalaBrandt => "KANNALA_BRANDT",
            ModelType::Mei => "MEI",
        };
        f.write_str(name)
    }
}

/// Pixel-to-ray projection for one calibrated camera.
pub trait CameraModel: fmt::Debug + Send + Sync {
    /// Lift a distorted pixel coordinate to a ray in the camera frame.
    ///
    /// The ray is not normalized to any particular length; divide by `z` to
    /// obtain the undistorted normalized-plane coordinate.
    fn lift_projective(&self, pixel: &Point2<f64>) -> Vector3<f64>;

    fn image_width(&self) -> u32;

    fn image_height(&self) -> u32;

    fn model_type(&self) -> ModelType;

    /// Undistorted normalized-plane coordinate of a pixel (`x/z`, `y/z`).
    fn normalized(&self, pixel: &Point2<f64>) -> Point2<f64> {
        let ray = self.lift_projective(pixel);
        Point2::new(ray.x / ray.z, ray.y / ray.z)
    }
}

/// Radial-tangential distortion offset shared by the pinhole and Mei models.
///
/// Returns the displacement `d(p)` such that `p_distorted = p + d(p)`.
pub(crate) fn radtan_offset(k1: f64, k2: f64, p1: f64, p2: f64, x: f64, y: f64) -> (f64, f64) {
    let x2 = x * x;
    let y2 = y * y;
    let xy = x * y;
    let rho2 = x2 + y2;
    let radial = k1 * rho2 + k2 * rho2 * rho2;
    (
        x * radial + 2.0 * p1 * xy + p2 * (rho2 + 2.0 * x2),
        y * radial + 2.0 * p2 * xy + p1 * (rho2 + 2.0 * y2),
    )
}

/// Invert radial-tangential distortion by fixed-point iteration.
pub(crate) fn radtan_undistort(
    k1: f64,
    k2: f64,
    p1: f64,
    p2: f64,
    xd: f64,
    yd: f64,
    iterations: usize,
) -> (f64, f64) {
    let (mut x, mut y) = (xd, yd);
    for _ in 0..iterations {
        let (dx, dy) = radtan_offset(k1, k2, p1, p2, x, y);
        x = xd - dx;
        y = yd - dy;
    }
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_radtan_undistort_inverts_offset() {
        let (k1, k2, p1, p2) = (-0.28, 0.07, 2e-4, 1.8e-5);
        let (x, y) = (0.21, -0.13);
        let (dx, dy) = radtan_offset(k1, k2, p1, p2, x, y);

        let (ux, uy) = radtan_undistort(k1, k2, p1, p2, x + dx, y + dy, 20);

        assert_relative_eq!(ux, x, epsilon = 1e-6);
        assert_relative_eq!(uy, y, epsilon = 1e-6);
    }

    #[test]
    fn test_model_type_display() {
        assert_eq!(ModelType::KannalaBrandt.to_string(), "KANNALA_BRANDT");
        assert_eq!(format!("{}", ModelType::Pinhole), "PINHOLE");
    }
}
