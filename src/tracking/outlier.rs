//! Epipolar outlier rejection between consecutive frames.
//!
//! Both ends of each correspondence are undistorted through the camera model
//! and re-projected with a synthetic pinhole (fixed focal length, principal
//! point at the image center) before fitting F, so the epipolar test works on
//! distortion-free coordinates whatever the lens.

use std::sync::Arc;

use nalgebra::Point2;
use tracing::{debug, warn};

use crate::camera::CameraModel;
use crate::geometry::fundamental::{
    FundamentalRansacConfig, MIN_CORRESPONDENCES, find_fundamental_ransac,
};
use crate::tracking::track::Track;

pub const RANSAC_CONFIDENCE: f64 = 0.99;

pub struct OutlierRejector {
    camera: Arc<dyn CameraModel>,
    focal_length: f64,
    center: Point2<f64>,
    ransac: FundamentalRansacConfig,
}

impl OutlierRejector {
    pub fn new(
        camera: Arc<dyn CameraModel>,
        focal_length: f64,
        image_width: u32,
        image_height: u32,
        threshold: f64,
        seed: u64,
    ) -> Self {
        Self {
            camera,
            focal_length,
            center: Point2::new(image_width as f64 / 2.0, image_height as f64 / 2.0),
            ransac: FundamentalRansacConfig {
                threshold,
                confidence: RANSAC_CONFIDENCE,
                seed,
                ..Default::default()
            },
        }
    }

    /// Synthetic undistorted pixel of a distorted pixel.
    pub fn undistorted_pixel(&self, pixel: &Point2<f32>) -> Point2<f64> {
        let n = self
            .camera
            .normalized(&Point2::new(pixel.x as f64, pixel.y as f64));
        Point2::new(
            self.focal_length * n.x + self.center.x,
            self.focal_length * n.y + self.center.y,
        )
    }

    /// Drop tracks whose (previous, current) pixel pair is inconsistent with
    /// the fundamental matrix fitted over all tracks.
    ///
    /// With fewer than eight tracks this is a no-op. Returns the number of
    /// tracks removed.
    pub fn reject(&self, tracks: &mut Vec<Track>) -> usize {
        if tracks.len() < MIN_CORRESPONDENCES {
            debug!(
                n = tracks.len(),
                "Skipping fundamental matrix check, not enough tracks"
            );
            return 0;
        }

        let prev: Vec<Point2<f64>> = tracks
            .iter()
            .map(|t| self.undistorted_pixel(&t.prev_pixel))
            .collect();
        let curr: Vec<Point2<f64>> = tracks
            .iter()
            .map(|t| self.undistorted_pixel(&t.pixel))
            .collect();

        let Some(fit) = find_fundamental_ransac(&prev, &curr, &self.ransac) else {
            warn!(
                n = tracks.len(),
                "Fundamental matrix RANSAC found no model, keeping all tracks"
            );
            return 0;
        };

        let before = tracks.len();
        let mut inliers = fit.inlier_mask.into_iter();
        tracks.retain(|_| inliers.next().unwrap_or(false));
        let removed = before - tracks.len();

        debug!(
            before,
            after = tracks.len(),
            iterations = fit.iterations,
            "FM ransac"
        );
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    fn camera() -> Arc<dyn CameraModel> {
        Arc::new(PinholeCamera {
            width: 752,
            height: 480,
            fx: 458.654,
            fy: 457.296,
            cx: 367.215,
            cy: 248.375,
            k1: -0.28340811,
            k2: 0.07395907,
            p1: 0.00019359,
            p2: 1.76187114e-05,
        })
    }

    fn rejector() -> OutlierRejector {
        OutlierRejector::new(camera(), 460.0, 752, 480, 1.0, 0)
    }

    /// Tracks observing a rigid scene from two poses, with distorted pixels.
    fn rigid_tracks(n: usize) -> Vec<Track> {
        let cam = PinholeCamera {
            width: 752,
            height: 480,
            fx: 458.654,
            fy: 457.296,
            cx: 367.215,
            cy: 248.375,
            k1: -0.28340811,
            k2: 0.07395907,
            p1: 0.00019359,
            p2: 1.76187114e-05,
        };
        let rot = Rotation3::from_euler_angles(0.01, 0.03, -0.02);
        let t = Vector3::new(0.2, -0.03, 0.05);

        (0..n)
            .map(|i| {
                let u = (i % 6) as f64 / 5.0 - 0.5;
                let v = (i / 6) as f64 / 4.0 - 0.5;
                let depth = 4.0 + (i % 5) as f64;
                let p = Vector3::new(u * depth * 0.9, v * depth * 0.7, depth);
                let a = cam.project(&p).unwrap();
                let b = cam.project(&(rot * p + t)).unwrap();

                let mut track = Track::new(Point2::new(b.x as f32, b.y as f32));
                track.prev_pixel = Point2::new(a.x as f32, a.y as f32);
                track.age = 2 + i as u32;
                track
            })
            .collect()
    }

    #[test]
    fn test_undistorted_pixel_of_principal_point_is_image_center() {
        let r = rejector();
        let p = r.undistorted_pixel(&Point2::new(367.215, 248.375));

        assert_relative_eq!(p.x, 376.0, epsilon = 1e-3);
        assert_relative_eq!(p.y, 240.0, epsilon = 1e-3);
    }

    #[test]
    fn test_fewer_than_eight_tracks_are_left_untouched() {
        let mut tracks = rigid_tracks(5);
        for track in &mut tracks {
            track.pixel.x += 40.0;
            track.pixel.y -= 25.0;
        }
        let before = tracks.clone();

        let removed = rejector().reject(&mut tracks);

        assert_eq!(removed, 0);
        assert_eq!(tracks, before);
    }

    #[test]
    fn test_rigid_motion_keeps_every_track() {
        let mut tracks = rigid_tracks(30);

        let removed = rejector().reject(&mut tracks);

        assert_eq!(removed, 0);
        assert_eq!(tracks.len(), 30);
    }

    #[test]
    fn test_corrupted_tracks_are_removed_as_whole_records() {
        let mut tracks = rigid_tracks(30);
        for i in [4usize, 13, 22] {
            tracks[i].pixel.x += 30.0;
            tracks[i].pixel.y += 30.0;
        }
        let kept_ages: Vec<u32> = tracks
            .iter()
            .enumerate()
            .filter(|(i, _)| ![4, 13, 22].contains(i))
            .map(|(_, t)| t.age)
            .collect();

        let removed = rejector().reject(&mut tracks);

        assert_eq!(removed, 3);
        let ages: Vec<u32> = tracks.iter().map(|t| t.age).collect();
        assert_eq!(ages, kept_ages);
    }
}
