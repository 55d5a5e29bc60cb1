//! Main tracker: orchestrates per-frame feature tracking.
//!
//! One call to [`FeatureTracker::process_frame_with`] runs the whole pipeline
//! for a single camera frame:
//! - optional CLAHE
//! - pyramidal LK propagation of the active tracks, border filtering, aging
//! - on published frames: fundamental matrix outlier rejection, age-ordered
//!   spatial selection and detection of new corners in the free area
//! - undistortion and velocity estimation

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, bail};
use opencv::core::{CV_8UC1, Mat};
use opencv::prelude::*;
use tracing::{debug, info, warn};

use crate::camera::CameraModel;
use crate::tracking::config::TrackerConfig;
use crate::tracking::detector::CornerDetector;
use crate::tracking::flow::{OpticalFlow, in_border};
use crate::tracking::mask::{OccupancyMask, select_by_age};
use crate::tracking::outlier::OutlierRejector;
use crate::tracking::preprocess::Preprocessor;
use crate::tracking::result::{FrameStats, TrackedFeature};
use crate::tracking::track::{IdAllocator, Track};
use crate::tracking::velocity::VelocityEstimator;

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Feature tracker for one camera stream.
pub struct FeatureTracker {
    config: TrackerConfig,
    camera: Arc<dyn CameraModel>,

    preprocessor: Preprocessor,
    flow: OpticalFlow,
    rejector: OutlierRejector,
    detector: CornerDetector,
    velocity: VelocityEstimator,

    /// Issues ids on confirmation. Private unless built with a shared handle.
    ids: IdAllocator,

    /// Active tracks in storage order.
    tracks: Vec<Track>,

    /// Preprocessed image of the last frame.
    prev_image: Option<Mat>,
    /// Timestamp (s) of the last frame.
    cur_time: Option<f64>,

    /// Validity mask restricting selection and detection (fisheye lenses).
    fisheye_mask: Option<Mat>,

    stats: FrameStats,
}

impl FeatureTracker {
    pub fn new(config: TrackerConfig, camera: Arc<dyn CameraModel>) -> Result<Self> {
        config.validate()?;
        let fisheye_mask = config.load_fisheye_mask()?;

        if camera.image_width() != config.image_width || camera.image_height() != config.image_height {
            warn!(
                "Calibration image size {}x{} differs from tracker image size {}x{}",
                camera.image_width(),
                camera.image_height(),
                config.image_width,
                config.image_height
            );
        }

        let rejector = OutlierRejector::new(
            camera.clone(),
            config.focal_length,
            config.image_width,
            config.image_height,
            config.f_threshold,
            config.ransac_seed,
        );

        info!(
            camera = %camera.model_type(),
            max_cnt = config.max_cnt,
            min_dist = config.min_dist,
            equalize = config.equalize,
            fisheye = fisheye_mask.is_some(),
            "Feature tracker created"
        );

        Ok(Self {
            preprocessor: Preprocessor::new(config.equalize)?,
            flow: OpticalFlow::new()?,
            rejector,
            detector: CornerDetector::new(config.min_dist),
            velocity: VelocityEstimator::new(),
            ids: IdAllocator::new(),
            tracks: Vec::new(),
            prev_image: None,
            cur_time: None,
            fisheye_mask,
            stats: FrameStats::default(),
            config,
            camera,
        })
    }

    /// Draw ids from `ids` instead of a private counter.
    pub fn with_id_allocator(mut self, ids: IdAllocator) -> Self {
        self.ids = ids;
        self
    }

    /// Replace the fisheye validity mask (nonzero = valid).
    pub fn set_fisheye_mask(&mut self, mask: Mat) -> Result<()> {
        self.config.check_fisheye_mask(&mask)?;
        self.fisheye_mask = Some(mask);
        Ok(())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn camera(&self) -> &Arc<dyn CameraModel> {
        &self.camera
    }

    pub fn id_allocator(&self) -> &IdAllocator {
        &self.ids
    }

    /// Active tracks in storage order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Output records of every active track, in storage order.
    pub fn features(&self) -> Vec<TrackedFeature> {
        self.tracks.iter().map(TrackedFeature::from).collect()
    }

    /// Statistics of the last processed frame.
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.cur_time
    }

    /// Process a frame that is selected for publication.
    pub fn process_frame(&mut self, image: &Mat, timestamp: f64) -> Result<()> {
        self.process_frame_with(image, timestamp, true)
    }

    /// Process one frame.
    ///
    /// Tracks are always propagated, aged and undistorted. Outlier rejection,
    /// spatial selection and detection only run when `publish` is set.
    ///
    /// The frame is validated before any state changes: it must be a
    /// single-channel 8-bit image of the configured size, with a timestamp
    /// later than the previous frame.
    pub fn process_frame_with(&mut self, image: &Mat, timestamp: f64, publish: bool) -> Result<()> {
        self.check_frame(image, timestamp)?;

        let t_start = Instant::now();
        let mut stats = FrameStats {
            n_input: self.tracks.len(),
            published: publish,
            ..Default::default()
        };

        let t = Instant::now();
        let image = self.preprocessor.apply(image)?;
        stats.timing.preprocess_ms = elapsed_ms(t);

        let t = Instant::now();
        if let Some(prev_image) = self.prev_image.take() {
            self.propagate(&prev_image, &image, &mut stats)?;
        }
        stats.timing.flow_ms = elapsed_ms(t);

        if publish {
            let t = Instant::now();
            stats.rejected_epipolar = self.reject_with_fundamental();
            stats.timing.reject_ms = elapsed_ms(t);

            let t = Instant::now();
            let mut mask = self.occupancy_mask()?;
            stats.rejected_spacing = select_by_age(&mut self.tracks, &mut mask, self.config.min_dist as i32)?;
            stats.timing.select_ms = elapsed_ms(t);

            let t = Instant::now();
            let needed = self.config.max_cnt.saturating_sub(self.tracks.len());
            let corners = self.detector.detect(&image, &mask, needed)?;
            stats.n_detected = corners.len();
            self.tracks.extend(corners.into_iter().map(Track::new));
            stats.timing.detect_ms = elapsed_ms(t);
        }

        let t = Instant::now();
        self.velocity.update(&mut self.tracks, self.camera.as_ref(), timestamp);
        stats.timing.undistort_ms = elapsed_ms(t);

        self.prev_image = Some(image);
        self.cur_time = Some(timestamp);

        stats.n_active = self.tracks.len();
        stats.timing.total_ms = elapsed_ms(t_start);
        debug!(
            t = timestamp,
            tracked = stats.n_tracked(),
            lost_flow = stats.lost_flow,
            lost_border = stats.lost_border,
            rejected_f = stats.rejected_epipolar,
            rejected_mask = stats.rejected_spacing,
            detected = stats.n_detected,
            total_ms = stats.timing.total_ms,
            "Frame tracked"
        );
        self.stats = stats;

        Ok(())
    }

    /// Run the fundamental matrix check on the current tracks on its own.
    ///
    /// Below eight tracks this leaves the tracks unchanged. Returns the
    /// number of tracks removed.
    pub fn reject_with_fundamental(&mut self) -> usize {
        self.rejector.reject(&mut self.tracks)
    }

    /// Confirm the id of the track at `index`.
    ///
    /// Returns `false` when `index` is past the last track.
    pub fn confirm_id(&mut self, index: usize) -> bool {
        match self.tracks.get_mut(index) {
            Some(track) => {
                self.ids.confirm(track);
                true
            }
            None => false,
        }
    }

    /// Confirm the id of every active track.
    pub fn confirm_all_ids(&mut self) {
        for track in &mut self.tracks {
            self.ids.confirm(track);
        }
    }

    /// Forget every track and the previous frame. The id allocator is kept.
    pub fn reset(&mut self) {
        info!(n_dropped = self.tracks.len(), "Feature tracker reset");
        self.tracks.clear();
        self.prev_image = None;
        self.cur_time = None;
        self.velocity = VelocityEstimator::new();
        self.stats = FrameStats::default();
    }

    fn check_frame(&self, image: &Mat, timestamp: f64) -> Result<()> {
        if !timestamp.is_finite() {
            bail!("Frame timestamp {} is not finite", timestamp);
        }
        if let Some(prev) = self.cur_time {
            if timestamp <= prev {
                bail!(
                    "Frame timestamp {:.6} is not after the previous frame {:.6}",
                    timestamp,
                    prev
                );
            }
        }
        if image.empty() {
            bail!("Empty image at t = {:.6}", timestamp);
        }
        if image.typ() != CV_8UC1 {
            bail!("Expected a single-channel 8-bit image, got type {}", image.typ());
        }
        if image.cols() != self.config.image_width as i32 || image.rows() != self.config.image_height as i32 {
            bail!(
                "Image is {}x{}, tracker expects {}x{}",
                image.cols(),
                image.rows(),
                self.config.image_width,
                self.config.image_height
            );
        }
        Ok(())
    }

    /// Carry the tracks into `image`; drop lost and out-of-border tracks and
    /// age the survivors.
    fn propagate(&mut self, prev_image: &Mat, image: &Mat, stats: &mut FrameStats) -> Result<()> {
        let prev_points: Vec<_> = self.tracks.iter().map(|t| t.pixel).collect();
        let flow = self.flow.propagate(prev_image, image, &prev_points)?;

        let (width, height) = (image.cols(), image.rows());
        let mut survivors = Vec::with_capacity(self.tracks.len());
        for ((mut track, pixel), ok) in self.tracks.drain(..).zip(flow.points).zip(flow.status) {
            if !ok {
                stats.lost_flow += 1;
                continue;
            }
            if !in_border(&pixel, width, height) {
                stats.lost_border += 1;
                continue;
            }
            track.prev_pixel = track.pixel;
            track.pixel = pixel;
            track.age += 1;
            survivors.push(track);
        }
        self.tracks = survivors;
        Ok(())
    }

    fn occupancy_mask(&self) -> Result<OccupancyMask> {
        match self.fisheye_mask.as_ref() {
            Some(valid) => OccupancyMask::from_validity(valid),
            None => OccupancyMask::free(self.config.image_width as i32, self.config.image_height as i32),
        }
    }
}
