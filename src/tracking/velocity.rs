//! Undistortion and image-plane velocity of tracked features.

use std::collections::HashMap;

use nalgebra::{Point2, Vector2};

use crate::camera::CameraModel;
use crate::tracking::track::{FeatureId, Track};

/// Keeps the normalized positions of the previous frame, keyed by feature id,
/// and differentiates against them.
#[derive(Debug, Default)]
pub struct VelocityEstimator {
    prev_positions: Option<HashMap<FeatureId, Point2<f64>>>,
    prev_timestamp: Option<f64>,
}

impl VelocityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized position recorded for `id` in the last update.
    pub fn previous_position(&self, id: FeatureId) -> Option<Point2<f64>> {
        self.prev_positions.as_ref()?.get(&id).copied()
    }

    pub fn has_history(&self) -> bool {
        self.prev_positions.is_some()
    }

    /// Undistort every track and set its velocity.
    ///
    /// Velocity is zero on the first update, for unconfirmed tracks, and for
    /// confirmed tracks absent from the previous update. The positions of
    /// this update replace the stored ones.
    pub fn update(&mut self, tracks: &mut [Track], camera: &dyn CameraModel, timestamp: f64) {
        let mut positions = HashMap::with_capacity(tracks.len());
        for track in tracks.iter_mut() {
            track.normalized = camera.normalized(&Point2::new(
                track.pixel.x as f64,
                track.pixel.y as f64,
            ));
            if track.id.is_confirmed() {
                positions.insert(track.id, track.normalized);
            }
        }

        self.apply_velocities(tracks, timestamp);
        self.prev_positions = Some(positions);
        self.prev_timestamp = Some(timestamp);
    }

    fn apply_velocities(&self, tracks: &mut [Track], timestamp: f64) {
        let (Some(prev), Some(prev_t)) = (self.prev_positions.as_ref(), self.prev_timestamp) else {
            for track in tracks.iter_mut() {
                track.velocity = Vector2::zeros();
            }
            return;
        };

        let dt = timestamp - prev_t;
        for track in tracks.iter_mut() {
            track.velocity = match prev.get(&track.id) {
                Some(p) if track.id.is_confirmed() && dt > 0.0 => (track.normalized - p) / dt,
                _ => Vector2::zeros(),
            };
        }
    }
}
