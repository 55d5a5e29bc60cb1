//! Frame-to-frame propagation of tracked points.
//!
//! Points are carried into the new frame with pyramidal Lucas-Kanade optical
//! flow. Points whose flow fails or that land outside the valid interior of
//! the image are reported as lost.

use anyhow::Result;
use nalgebra::Point2;
use opencv::core::{Mat, Point2f, Size, TermCriteria, TermCriteria_Type, Vector};
use opencv::prelude::*;
use opencv::video;

/// Search window edge length (pixels) at every pyramid level.
pub const WINDOW_SIZE: i32 = 21;
/// Highest pyramid level (0-based), i.e. four levels in total.
pub const MAX_PYRAMID_LEVEL: i32 = 3;
/// Pixels along each image edge in which tracked points are discarded.
pub const BORDER_SIZE: i32 = 1;

const MAX_ITERATIONS: i32 = 30;
const EPSILON: f64 = 0.01;
const MIN_EIGEN_THRESHOLD: f64 = 1e-4;

/// Per-point outcome of flow propagation (same order as the input).
#[derive(Debug, Clone, Default)]
pub struct FlowResult {
    pub points: Vec<Point2<f32>>,
    pub status: Vec<bool>,
}

impl FlowResult {
    pub fn num_tracked(&self) -> usize {
        self.status.iter().filter(|&&s| s).count()
    }
}

pub struct OpticalFlow {
    win_size: Size,
    max_level: i32,
    criteria: TermCriteria,
}

impl OpticalFlow {
    pub fn new() -> Result<Self> {
        let criteria = TermCriteria::new(
            TermCriteria_Type::COUNT as i32 + TermCriteria_Type::EPS as i32,
            MAX_ITERATIONS,
            EPSILON,
        )?;
        Ok(Self {
            win_size: Size::new(WINDOW_SIZE, WINDOW_SIZE),
            max_level: MAX_PYRAMID_LEVEL,
            criteria,
        })
    }

    /// Locate `prev_points` of `prev_image` in `image`.
    ///
    /// An empty input yields an empty result without touching the images.
    pub fn propagate(
        &self,
        prev_image: &Mat,
        image: &Mat,
        prev_points: &[Point2<f32>],
    ) -> Result<FlowResult> {
        if prev_points.is_empty() {
            return Ok(FlowResult::default());
        }

        let prev_pts: Vector<Point2f> = prev_points
            .iter()
            .map(|p| Point2f::new(p.x, p.y))
            .collect();
        let mut next_pts = Vector::<Point2f>::new();
        let mut status = Vector::<u8>::new();
        let mut err = Vector::<f32>::new();

        video::calc_optical_flow_pyr_lk(
            prev_image,
            image,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut err,
            self.win_size,
            self.max_level,
            self.criteria,
            0,
            MIN_EIGEN_THRESHOLD,
        )?;

        let points = next_pts.iter().map(|p| Point2::new(p.x, p.y)).collect();
        let status = status
            .iter()
            .zip(next_pts.iter())
            .map(|(s, p)| s != 0 && p.x.is_finite() && p.y.is_finite())
            .collect();

        Ok(FlowResult { points, status })
    }
}

/// Whether `pt`, rounded to the nearest pixel, lies inside the image with a
/// margin of [`BORDER_SIZE`] on every side.
///
/// Rounding is half-to-even, like OpenCV's `cvRound`.
pub fn in_border(pt: &Point2<f32>, width: i32, height: i32) -> bool {
    if !(pt.x.is_finite() && pt.y.is_finite()) {
        return false;
    }
    let x = pt.x.round_ties_even() as i32;
    let y = pt.y.round_ties_even() as i32;
    BORDER_SIZE <= x && x < width - BORDER_SIZE && BORDER_SIZE <= y && y < height - BORDER_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::test_support::{blank, squares};

    #[test]
    fn test_in_border_margin() {
        let (w, h) = (100, 80);
        assert!(in_border(&Point2::new(1.0, 1.0), w, h));
        assert!(in_border(&Point2::new(98.4, 78.4), w, h));
        assert!(!in_border(&Point2::new(0.4, 10.0), w, h));
        assert!(!in_border(&Point2::new(10.0, 79.0), w, h));
        assert!(!in_border(&Point2::new(98.6, 10.0), w, h));
        assert!(!in_border(&Point2::new(-3.0, 10.0), w, h));
    }

    #[test]
    fn test_in_border_rounds_half_to_even() {
        // 0.5 rounds to 0 (outside), 1.5 rounds to 2 (inside).
        assert!(!in_border(&Point2::new(0.5, 10.0), 100, 80));
        assert!(in_border(&Point2::new(1.5, 10.0), 100, 80));
        // 98.5 rounds to 98 (inside), 99.5 rounds to 100 (outside).
        assert!(in_border(&Point2::new(98.5, 10.0), 100, 80));
        assert!(!in_border(&Point2::new(99.5, 10.0), 100, 80));
    }

    #[test]
    fn test_in_border_rejects_nan() {
        assert!(!in_border(&Point2::new(f32::NAN, 10.0), 100, 80));
    }

    #[test]
    fn test_empty_input_yields_empty_output() {
        let flow = OpticalFlow::new().unwrap();
        let img = blank(64, 48, 0.0);

        let result = flow.propagate(&img, &img, &[]).unwrap();

        assert!(result.points.is_empty());
        assert!(result.status.is_empty());
    }

    #[test]
    fn test_follows_translated_corner() {
        let flow = OpticalFlow::new().unwrap();
        let prev = squares(160, 120, &[(60, 40)], 30);
        let next = squares(160, 120, &[(63, 42)], 30);

        let result = flow
            .propagate(&prev, &next, &[Point2::new(60.0, 40.0)])
            .unwrap();

        assert_eq!(result.num_tracked(), 1);
        let p = result.points[0];
        assert!((p.x - 63.0).abs() < 0.5, "x = {}", p.x);
        assert!((p.y - 42.0).abs() < 0.5, "y = {}", p.y);
    }

    #[test]
    fn test_static_image_keeps_position() {
        let flow = OpticalFlow::new().unwrap();
        let img = squares(160, 120, &[(60, 40)], 30);

        let result = flow
            .propagate(&img, &img, &[Point2::new(60.0, 40.0)])
            .unwrap();

        assert!(result.status[0]);
        assert!((result.points[0].x - 60.0).abs() < 0.1);
        assert!((result.points[0].y - 40.0).abs() < 0.1);
    }
}
