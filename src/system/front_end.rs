//! Front end - drives one feature tracker over a camera stream.
//!
//! The `FrontEnd` is the top-level struct that users interact with. It
//! decides which frames are published, feeds every frame to the tracker,
//! confirms ids and assembles the per-frame output for the estimator.

use std::sync::Arc;

use anyhow::Result;
use opencv::core::Mat;
use tracing::{debug, info};

use crate::camera::CameraModel;
use crate::system::publish_rate::{Decision, PublishRateLimiter};
use crate::tracking::{FeatureFrame, FeatureTracker, TrackedFeature, TrackerConfig};

/// Result of handing one frame to the front end.
#[derive(Debug, Clone)]
pub enum FrameOutcome {
    /// The stream was discontinuous; tracking restarts with the next frame.
    Restart,
    /// The frame was tracked but not published.
    Tracked,
    Published(FeatureFrame),
}

pub struct FrontEnd {
    tracker: FeatureTracker,
    limiter: PublishRateLimiter,
    n_frames: u64,
    n_published: u64,
    n_restarts: u64,
}

impl FrontEnd {
    pub fn new(config: TrackerConfig, camera: Arc<dyn CameraModel>) -> Result<Self> {
        let limiter = PublishRateLimiter::new(config.freq);
        let tracker = FeatureTracker::new(config, camera)?;
        Ok(Self::from_parts(tracker, limiter))
    }

    pub fn from_parts(tracker: FeatureTracker, limiter: PublishRateLimiter) -> Self {
        Self {
            tracker,
            limiter,
            n_frames: 0,
            n_published: 0,
            n_restarts: 0,
        }
    }

    pub fn tracker(&self) -> &FeatureTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut FeatureTracker {
        &mut self.tracker
    }

    pub fn num_frames(&self) -> u64 {
        self.n_frames
    }

    pub fn num_published(&self) -> u64 {
        self.n_published
    }

    pub fn num_restarts(&self) -> u64 {
        self.n_restarts
    }

    /// Process one camera frame.
    ///
    /// Published frames carry only tracks seen in at least two frames; their
    /// ids are confirmed before publication.
    pub fn process(&mut self, image: &Mat, timestamp: f64) -> Result<FrameOutcome> {
        self.n_frames += 1;

        let publish = match self.limiter.decide(timestamp) {
            Decision::Restart => {
                self.tracker.reset();
                self.n_restarts += 1;
                info!(t = timestamp, "Front end restarted");
                return Ok(FrameOutcome::Restart);
            }
            Decision::Publish => true,
            Decision::Skip => false,
        };

        self.tracker.process_frame_with(image, timestamp, publish)?;
        self.tracker.confirm_all_ids();

        if !publish {
            return Ok(FrameOutcome::Tracked);
        }

        let features: Vec<TrackedFeature> = self
            .tracker
            .tracks()
            .iter()
            .filter(|t| t.age > 1)
            .map(TrackedFeature::from)
            .collect();
        self.n_published += 1;
        debug!(t = timestamp, n = features.len(), "Publishing features");

        Ok(FrameOutcome::Published(FeatureFrame {
            timestamp,
            features,
            stats: self.tracker.stats().clone(),
        }))
    }
}
