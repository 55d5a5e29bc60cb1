//! Front end orchestration.
//!
//! This module contains the top-level `FrontEnd` that feeds a camera stream
//! through one `FeatureTracker`, along with the publication rate control.

mod front_end;
pub mod publish_rate;

pub use front_end::{FrameOutcome, FrontEnd};
pub use publish_rate::{Decision, PublishRateLimiter};
