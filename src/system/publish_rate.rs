//! Publication rate control for an incoming frame stream.
//!
//! Every frame is tracked, but only a subset is selected for publication so
//! the estimator sees features at roughly `freq` Hz. Selected frames are the
//! ones on which outliers are rejected and new features detected.

use tracing::warn;

/// Largest accepted gap between consecutive frames (seconds).
pub const MAX_FRAME_GAP: f64 = 1.0;
/// Relative distance to the target rate at which the rate window restarts.
const RATE_TOLERANCE: f64 = 0.01;

/// What to do with one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Track and publish.
    Publish,
    /// Track only.
    Skip,
    /// The stream is discontinuous; drop the frame and start over.
    Restart,
}

#[derive(Debug, Clone)]
pub struct PublishRateLimiter {
    freq: u32,
    /// Start of the current rate window; `None` until the first frame.
    window_start: Option<f64>,
    last_time: f64,
    pub_count: u32,
}

impl PublishRateLimiter {
    /// Limiter targeting `freq` Hz. Zero publishes every frame.
    pub fn new(freq: u32) -> Self {
        Self {
            freq,
            window_start: None,
            last_time: 0.0,
            pub_count: 1,
        }
    }

    pub fn freq(&self) -> u32 {
        self.freq
    }

    pub fn reset(&mut self) {
        self.window_start = None;
        self.last_time = 0.0;
        self.pub_count = 1;
    }

    /// Classify the frame at `timestamp` and update the rate bookkeeping.
    ///
    /// The first frame after construction or a restart only starts the
    /// clock (unless every frame is published).
    pub fn decide(&mut self, timestamp: f64) -> Decision {
        let Some(window_start) = self.window_start else {
            self.window_start = Some(timestamp);
            self.last_time = timestamp;
            if self.freq == 0 {
                return Decision::Publish;
            }
            return Decision::Skip;
        };

        if timestamp - self.last_time > MAX_FRAME_GAP || timestamp < self.last_time {
            warn!(
                last = self.last_time,
                t = timestamp,
                "Image stream discontinuity, restarting feature tracker"
            );
            self.reset();
            return Decision::Restart;
        }
        self.last_time = timestamp;

        if self.freq == 0 {
            return Decision::Publish;
        }

        let freq = self.freq as f64;
        let rate = self.pub_count as f64 / (timestamp - window_start);
        if rate.round() > freq {
            return Decision::Skip;
        }

        if (rate - freq).abs() < RATE_TOLERANCE * freq {
            self.window_start = Some(timestamp);
            self.pub_count = 0;
        }
        self.pub_count += 1;
        Decision::Publish
    }
}
