//! Feature tracking: processes camera frames and maintains tracked features.
//!
//! This module implements the visual front end of the estimator:
//! - Frame preprocessing (CLAHE)
//! - Optical flow propagation and border filtering
//! - Fundamental matrix outlier rejection
//! - Age-ordered spatial selection and corner detection
//! - Undistortion and feature velocity

pub mod config;
pub mod detector;
pub mod flow;
pub mod mask;
pub mod outlier;
pub mod preprocess;
pub mod result;
pub mod track;
pub mod tracker;
pub mod undistortion_view;
pub mod velocity;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::TrackerConfig;
pub use result::{FeatureFrame, FrameStats, TimingStats, TrackedFeature};
pub use track::{FeatureId, IdAllocator, Track};
pub use tracker::FeatureTracker;
pub use undistortion_view::undistortion_view;
