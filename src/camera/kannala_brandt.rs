//! Equidistant fisheye camera (Kannala-Brandt).
//!
//! The distorted radius on the normalized plane is the odd polynomial
//! `r(θ) = θ + k2·θ³ + k3·θ⁵ + k4·θ⁷ + k5·θ⁹` of the incidence angle θ.

use nalgebra::{Point2, Vector3};

use super::{CameraModel, ModelType};

const NEWTON_ITERATIONS: usize = 20;
const NEWTON_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KannalaBrandtCamera {
    pub width: u32,
    pub height: u32,
    pub k2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub mu: f64,
    pub mv: f64,
    pub u0: f64,
    pub v0: f64,
}

impl KannalaBrandtCamera {
    fn radius(&self, theta: f64) -> f64 {
        let t2 = theta * theta;
        theta * (1.0 + t2 * (self.k2 + t2 * (self.k3 + t2 * (self.k4 + t2 * self.k5))))
    }

    fn radius_derivative(&self, theta: f64) -> f64 {
        let t2 = theta * theta;
        1.0 + t2 * (3.0 * self.k2 + t2 * (5.0 * self.k3 + t2 * (7.0 * self.k4 + t2 * 9.0 * self.k5)))
    }

    /// Solve `r(θ) = r_d` for θ with Newton's method.
    fn solve_theta(&self, r_d: f64) -> f64 {
        let mut theta = r_d;
        for _ in 0..NEWTON_ITERATIONS {
            let deriv = self.radius_derivative(theta);
            if deriv.abs() < f64::EPSILON {
                break;
            }
            let step = (self.radius(theta) - r_d) / deriv;
            theta -= step;
            if step.abs() < NEWTON_TOLERANCE {
                break;
            }
        }
        theta
    }

    /// Project a point in the camera frame to pixel coordinates.
    pub fn project(&self, p_c: &Vector3<f64>) -> Point2<f64> {
        let theta = p_c.xy().norm().atan2(p_c.z);
        let phi = p_c.y.atan2(p_c.x);
        let r = self.radius(theta);
        Point2::new(
            self.mu * r * phi.cos() + self.u0,
            self.mv * r * phi.sin() + self.v0,
        )
    }
}

impl CameraModel for KannalaBrandtCamera {
    fn lift_projective(&self, pixel: &Point2<f64>) -> Vector3<f64> {
        let x = (pixel.x - self.u0) / self.mu;
        let y = (pixel.y - self.v0) / self.mv;
        let r_d = (x * x + y * y).sqrt();

        if r_d < 1e-10 {
            return Vector3::new(0.0, 0.0, 1.0);
        }

        let theta = self.solve_theta(r_d);
        let phi = y.atan2(x);
        Vector3::new(
            theta.sin() * phi.cos(),
            theta.sin() * phi.sin(),
            theta.cos(),
        )
    }

    fn image_width(&self) -> u32 {
        self.width
    }

    fn image_height(&self) -> u32 {
        self.height
    }

    fn model_type(&self) -> ModelType {
        ModelType::KannalaBrandt
    }
}
