//! Geometry utilities: two-view epipolar estimation.

pub mod fundamental;

pub use fundamental::{FundamentalRansacConfig, FundamentalResult, find_fundamental_ransac};
