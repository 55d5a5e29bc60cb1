//! Tracker configuration.
//!
//! Settings are read from the same OpenCV-style YAML file that holds the camera
//! calibration; every field has a default so partial files work.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use opencv::core::{CV_8UC1, Mat};
use opencv::imgcodecs::{self, IMREAD_GRAYSCALE};
use opencv::prelude::*;
use serde::Deserialize;

use crate::camera::calibration::read_opencv_yaml;

/// Fixed parameters of one feature tracker instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub image_width: u32,
    pub image_height: u32,
    /// Maximum number of simultaneously tracked features.
    pub max_cnt: usize,
    /// Minimum pixel distance between selected features.
    pub min_dist: u32,
    /// RANSAC inlier threshold (pixels) of the fundamental matrix check.
    #[serde(alias = "F_threshold")]
    pub f_threshold: f64,
    /// Apply CLAHE before tracking.
    #[serde(deserialize_with = "bool_or_int")]
    pub equalize: bool,
    /// Restrict features to the valid region of `fisheye_mask`.
    #[serde(deserialize_with = "bool_or_int")]
    pub fisheye: bool,
    /// Grayscale image; nonzero pixels are valid.
    pub fisheye_mask: Option<PathBuf>,
    /// Synthetic focal length used to re-project undistorted points.
    pub focal_length: f64,
    /// Publication rate in Hz; 0 publishes every frame.
    pub freq: u32,
    pub ransac_seed: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            image_width: 752,
            image_height: 480,
            max_cnt: 150,
            min_dist: 30,
            f_threshold: 1.0,
            equalize: true,
            fisheye: false,
            fisheye_mask: None,
            focal_length: 460.0,
            freq: 10,
            ransac_seed: 0,
        }
    }
}

/// OpenCV `FileStorage` writes booleans as 0/1.
fn bool_or_int<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

impl TrackerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let text = crate::camera::calibration::strip_opencv_header(yaml);
        let config: Self = serde_yaml::from_str(&text).context("Failed to parse tracker config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = read_opencv_yaml(path)?;
        let mut config: Self = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse tracker config {:?}", path))?;

        // Relative mask paths are resolved against the config file location.
        if let (Some(mask), Some(dir)) = (config.fisheye_mask.as_mut(), path.parent()) {
            if mask.is_relative() {
                *mask = dir.join(&*mask);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_width < 3 || self.image_height < 3 {
            bail!(
                "Image size {}x{} leaves no interior region",
                self.image_width,
                self.image_height
            );
        }
        if self.max_cnt == 0 {
            bail!("max_cnt must be positive");
        }
        if !(self.f_threshold.is_finite() && self.f_threshold > 0.0) {
            bail!("F_threshold must be positive, got {}", self.f_threshold);
        }
        if !(self.focal_length.is_finite() && self.focal_length > 0.0) {
            bail!("focal_length must be positive, got {}", self.focal_length);
        }
        if self.fisheye && self.fisheye_mask.is_none() {
            bail!("fisheye is enabled but no fisheye_mask is configured");
        }
        Ok(())
    }

    /// Load the fisheye validity mask, if enabled.
    ///
    /// The mask must be single-channel and match the configured image size.
    pub fn load_fisheye_mask(&self) -> Result<Option<Mat>> {
        if !self.fisheye {
            return Ok(None);
        }
        let Some(path) = self.fisheye_mask.as_ref() else {
            bail!("fisheye is enabled but no fisheye_mask is configured");
        };
        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 mask path {:?}", path))?;
        let mask = imgcodecs::imread(path_str, IMREAD_GRAYSCALE)
            .with_context(|| format!("Failed to read fisheye mask {:?}", path))?;
        self.check_fisheye_mask(&mask)?;
        Ok(Some(mask))
    }

    pub fn check_fisheye_mask(&self, mask: &Mat) -> Result<()> {
        if mask.empty() {
            bail!("Fisheye mask is empty");
        }
        if mask.typ() != CV_8UC1 {
            bail!("Fisheye mask must be single-channel 8-bit");
        }
        if mask.cols() != self.image_width as i32 || mask.rows() != self.image_height as i32 {
            bail!(
                "Fisheye mask is {}x{}, expected {}x{}",
                mask.cols(),
                mask.rows(),
                self.image_width,
                self.image_height
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Scalar;

    #[test]
    fn test_defaults_match_euroc_setup() {
        let config = TrackerConfig::default();
        assert_eq!(config.max_cnt, 150);
        assert_eq!(config.min_dist, 30);
        assert_eq!(config.focal_length, 460.0);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_opencv_style_file() {
        let yaml = "%YAML:1.0
model_type: PINHOLE
image_width: 640
image_height: 400
max_cnt: 120
min_dist: 25
freq: 20
F_threshold: 1.5
equalize: 0
fisheye: 0
";
        let config = TrackerConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.image_width, 640);
        assert_eq!(config.image_height, 400);
        assert_eq!(config.max_cnt, 120);
        assert_eq!(config.min_dist, 25);
        assert_eq!(config.freq, 20);
        assert_eq!(config.f_threshold, 1.5);
        assert!(!config.equalize);
        assert!(!config.fisheye);
        assert_eq!(config.focal_length, 460.0);
    }

    #[test]
    fn test_zero_budget_is_rejected() {
        let yaml = "max_cnt: 0\n";
        assert!(TrackerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_fisheye_without_mask_is_rejected() {
        let yaml = "fisheye: 1\n";
        assert!(TrackerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_fisheye_mask_size_must_match() {
        let config = TrackerConfig {
            image_width: 64,
            image_height: 48,
            ..Default::default()
        };
        let wrong = Mat::new_rows_cols_with_default(40, 64, CV_8UC1, Scalar::all(255.0)).unwrap();
        let right = Mat::new_rows_cols_with_default(48, 64, CV_8UC1, Scalar::all(255.0)).unwrap();

        assert!(config.check_fisheye_mask(&wrong).is_err());
        config.check_fisheye_mask(&right).unwrap();
    }

    #[test]
    fn test_bundled_euroc_config() {
        use crate::camera::CameraModel;

        let yaml = include_str!("../../config/euroc_config.yaml");

        let config = TrackerConfig::from_yaml(yaml).unwrap();
        assert_eq!((config.image_width, config.image_height), (752, 480));
        assert!(config.equalize);

        let calib = crate::camera::CameraCalibration::from_yaml(yaml).unwrap();
        let camera = calib.build().unwrap();
        assert_eq!(camera.image_width(), config.image_width);
    }
}
