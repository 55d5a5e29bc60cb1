//! Detection of new corners in the free part of the occupancy mask.

use anyhow::Result;
use nalgebra::Point2;
use opencv::core::{Mat, Point2f, Vector};
use opencv::imgproc;
use opencv::prelude::*;
use tracing::warn;

use crate::tracking::mask::OccupancyMask;

/// Minimum accepted corner score relative to the best corner in the image.
pub const QUALITY_LEVEL: f64 = 0.01;
const BLOCK_SIZE: i32 = 3;
const HARRIS_K: f64 = 0.04;

/// Shi-Tomasi (minimum eigenvalue) corner detector.
pub struct CornerDetector {
    min_distance: f64,
}

impl CornerDetector {
    pub fn new(min_distance: u32) -> Self {
        Self {
            min_distance: min_distance as f64,
        }
    }

    /// Detect up to `max_corners` corners where `mask` is free.
    ///
    /// A mask that does not fit the image is a degraded condition: it is
    /// logged and no corners are returned for this frame.
    pub fn detect(
        &self,
        image: &Mat,
        mask: &OccupancyMask,
        max_corners: usize,
    ) -> Result<Vec<Point2<f32>>> {
        if max_corners == 0 {
            return Ok(Vec::new());
        }
        if let Err(e) = mask.check_against(image) {
            warn!("Skipping feature detection: {}", e);
            return Ok(Vec::new());
        }

        let mut corners = Vector::<Point2f>::new();
        imgproc::good_features_to_track(
            image,
            &mut corners,
            i32::try_from(max_corners).unwrap_or(i32::MAX),
            QUALITY_LEVEL,
            self.min_distance,
            mask.as_mat(),
            BLOCK_SIZE,
            false,
            HARRIS_K,
        )?;

        Ok(corners.iter().map(|p| Point2::new(p.x, p.y)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::test_support::{blank, checker, squares};

    #[test]
    fn test_finds_square_corners() {
        let img = squares(160, 120, &[(60, 40)], 30);
        let mask = OccupancyMask::free(160, 120).unwrap();

        let corners = CornerDetector::new(10).detect(&img, &mask, 10).unwrap();

        assert!(!corners.is_empty());
        let near_corner = corners
            .iter()
            .any(|c| (c.x - 60.0).abs() < 3.0 && (c.y - 40.0).abs() < 3.0);
        assert!(near_corner, "corners: {:?}", corners);
    }

    #[test]
    fn test_respects_budget_and_spacing() {
        let img = checker(320, 240, 24, 0, 0);
        let mask = OccupancyMask::free(320, 240).unwrap();

        let corners = CornerDetector::new(15).detect(&img, &mask, 25).unwrap();

        assert!(corners.len() <= 25);
        assert!(corners.len() >= 10);
        for (i, a) in corners.iter().enumerate() {
            for b in &corners[i + 1..] {
                assert!((a - b).norm() >= 15.0 - 1e-3);
            }
        }
    }

    #[test]
    fn test_occupied_region_gets_no_corners() {
        let img = squares(160, 120, &[(60, 40)], 30);
        let mut mask = OccupancyMask::free(160, 120).unwrap();
        mask.occupy(&Point2::new(75.0, 55.0), 40).unwrap();

        let corners = CornerDetector::new(10).detect(&img, &mask, 10).unwrap();

        assert!(corners.is_empty(), "corners: {:?}", corners);
    }

    #[test]
    fn test_mismatched_mask_skips_detection() {
        let img = squares(160, 120, &[(60, 40)], 30);
        let mask = OccupancyMask::free(100, 100).unwrap();

        let corners = CornerDetector::new(10).detect(&img, &mask, 10).unwrap();

        assert!(corners.is_empty());
    }

    #[test]
    fn test_empty_mask_skips_detection() {
        let img = blank(64, 64, 0.0);
        let mask = OccupancyMask::from_mat(Mat::default());

        let corners = CornerDetector::new(10).detect(&img, &mask, 10).unwrap();

        assert!(corners.is_empty());
    }

    #[test]
    fn test_zero_budget_detects_nothing() {
        let img = squares(160, 120, &[(60, 40)], 30);
        let mask = OccupancyMask::free(160, 120).unwrap();

        assert!(CornerDetector::new(10).detect(&img, &mask, 0).unwrap().is_empty());
    }
}
