//! Per-frame tracker output and diagnostics.
//!
//! These types describe what happened during processing of a single frame:
//! - the published features (id, pixel, normalized position, velocity)
//! - how many tracks were lost or rejected at each stage
//! - timing information for profiling

use nalgebra::{Point2, Vector2};

use crate::tracking::track::{FeatureId, Track};

/// One feature as handed to the downstream estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedFeature {
    pub id: FeatureId,
    pub pixel: Point2<f32>,
    pub normalized: Point2<f64>,
    pub velocity: Vector2<f64>,
}

impl From<&Track> for TrackedFeature {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id,
            pixel: track.pixel,
            normalized: track.normalized,
            velocity: track.velocity,
        }
    }
}

/// Features published for one frame, in tracker storage order.
#[derive(Debug, Clone)]
pub struct FeatureFrame {
    pub timestamp: f64,
    pub features: Vec<TrackedFeature>,
    pub stats: FrameStats,
}

/// Track counts for a frame.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    /// Tracks carried in from the previous frame.
    pub n_input: usize,
    pub lost_flow: usize,
    pub lost_border: usize,
    pub rejected_epipolar: usize,
    pub rejected_spacing: usize,
    pub n_detected: usize,
    /// Active tracks after the frame.
    pub n_active: usize,
    pub published: bool,
    pub timing: TimingStats,
}

impl FrameStats {
    /// Tracks that survived flow and border checks.
    pub fn n_tracked(&self) -> usize {
        self.n_input - self.lost_flow - self.lost_border
    }
}

/// Timing breakdown for a frame.
#[derive(Debug, Clone, Default)]
pub struct TimingStats {
    pub total_ms: f64,
    pub preprocess_ms: f64,
    pub flow_ms: f64,
    pub reject_ms: f64,
    pub select_ms: f64,
    pub detect_ms: f64,
    pub undistort_ms: f64,
}

impl TimingStats {
    pub fn zero() -> Self {
        Self::default()
    }
}
