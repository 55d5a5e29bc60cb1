//! Camera calibration files.
//!
//! Calibrations use the camodocs YAML layout written by OpenCV's
//! `FileStorage`:
//!
//! ```yaml
//! %YAML:1.0
//! ---
//! model_type: PINHOLE
//! camera_name: cam0
//! image_width: 752
//! image_height: 480
//! distortion_parameters: { k1: -0.28, k2: 0.07, p1: 1.9e-4, p2: 1.8e-5 }
//! projection_parameters: { fx: 458.6, fy: 457.3, cx: 367.2, cy: 248.4 }
//! ```
//!
//! The tracker settings may live in the same file; unknown keys are ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use super::{CameraModel, KannalaBrandtCamera, MeiCamera, ModelType, PinholeCamera};

/// Setup-time failure while building a camera model.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to read calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed calibration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("unsupported camera model '{0}'")]
    UnsupportedModel(String),
    #[error("{model} calibration is missing '{section}'")]
    MissingSection {
        model: ModelType,
        section: &'static str,
    },
    #[error("invalid {name} = {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("invalid image size {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistortionParameters {
    #[serde(default)]
    pub k1: f64,
    #[serde(default)]
    pub k2: f64,
    #[serde(default)]
    pub p1: f64,
    #[serde(default)]
    pub p2: f64,
}

/// Union of the projection blocks of all supported models.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectionParameters {
    pub fx: Option<f64>,
    pub fy: Option<f64>,
    pub cx: Option<f64>,
    pub cy: Option<f64>,
    pub k2: Option<f64>,
    pub k3: Option<f64>,
    pub k4: Option<f64>,
    pub k5: Option<f64>,
    pub mu: Option<f64>,
    pub mv: Option<f64>,
    pub u0: Option<f64>,
    pub v0: Option<f64>,
    pub gamma1: Option<f64>,
    pub gamma2: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorParameters {
    pub xi: f64,
}

/// Parsed calibration description; [`CameraCalibration::build`] turns it
/// into a [`CameraModel`].
#[derive(Debug, Clone, Deserialize)]
pub struct CameraCalibration {
    pub model_type: String,
    #[serde(default)]
    pub camera_name: String,
    pub image_width: u32,
    pub image_height: u32,
    #[serde(default)]
    pub distortion_parameters: Option<DistortionParameters>,
    #[serde(default)]
    pub projection_parameters: Option<ProjectionParameters>,
    #[serde(default)]
    pub mirror_parameters: Option<MirrorParameters>,
}

/// Read an OpenCV `FileStorage` YAML file as plain YAML text.
///
/// `FileStorage` writes a `%YAML:1.0` directive that YAML parsers reject.
pub fn read_opencv_yaml(path: &Path) -> Result<String, CameraError> {
    let text = std::fs::read_to_string(path).map_err(|source| CameraError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(strip_opencv_header(&text))
}

pub(crate) fn strip_opencv_header(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("%YAML"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn positive(name: &'static str, value: f64) -> Result<f64, CameraError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(CameraError::InvalidParameter { name, value })
    }
}

fn required(
    model: ModelType,
    section: &'static str,
    value: Option<f64>,
) -> Result<f64, CameraError> {
    value.ok_or(CameraError::MissingSection { model, section })
}

impl CameraCalibration {
    pub fn from_yaml(yaml: &str) -> Result<Self, CameraError> {
        Ok(serde_yaml::from_str(&strip_opencv_header(yaml))?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CameraError> {
        let text = read_opencv_yaml(path.as_ref())?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn model(&self) -> Result<ModelType, CameraError> {
        match self.model_type.trim().to_ascii_uppercase().as_str() {
            "PINHOLE" => Ok(ModelType::Pinhole),
            "KANNALA_BRANDT" => Ok(ModelType::KannalaBrandt),
            "MEI" => Ok(ModelType::Mei),
            other => Err(CameraError::UnsupportedModel(other.to_string())),
        }
    }

    /// Build the camera model described by this calibration.
    pub fn build(&self) -> Result<Arc<dyn CameraModel>, CameraError> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(CameraError::InvalidImageSize {
                width: self.image_width,
                height: self.image_height,
            });
        }

        let model = self.model()?;
        let proj = self
            .projection_parameters
            .as_ref()
            .ok_or(CameraError::MissingSection {
                model,
                section: "projection_parameters",
            })?;
        let dist = self.distortion_parameters.clone().unwrap_or_default();

        let camera: Arc<dyn CameraModel> = match model {
            ModelType::Pinhole => Arc::new(PinholeCamera {
                width: self.image_width,
                height: self.image_height,
                fx: positive("fx", required(model, "fx", proj.fx)?)?,
                fy: positive("fy", required(model, "fy", proj.fy)?)?,
                cx: required(model, "cx", proj.cx)?,
                cy: required(model, "cy", proj.cy)?,
                k1: dist.k1,
                k2: dist.k2,
                p1: dist.p1,
                p2: dist.p2,
            }),
            ModelType::KannalaBrandt => Arc::new(KannalaBrandtCamera {
                width: self.image_width,
                height: self.image_height,
                k2: proj.k2.unwrap_or(0.0),
                k3: proj.k3.unwrap_or(0.0),
                k4: proj.k4.unwrap_or(0.0),
                k5: proj.k5.unwrap_or(0.0),
                mu: positive("mu", required(model, "mu", proj.mu)?)?,
                mv: positive("mv", required(model, "mv", proj.mv)?)?,
                u0: required(model, "u0", proj.u0)?,
                v0: required(model, "v0", proj.v0)?,
            }),
            ModelType::Mei => {
                let mirror =
                    self.mirror_parameters
                        .as_ref()
                        .ok_or(CameraError::MissingSection {
                            model,
                            section: "mirror_parameters",
                        })?;
                if !mirror.xi.is_finite() || mirror.xi < 0.0 {
                    return Err(CameraError::InvalidParameter {
                        name: "xi",
                        value: mirror.xi,
                    });
                }
                Arc::new(MeiCamera {
                    width: self.image_width,
                    height: self.image_height,
                    xi: mirror.xi,
                    k1: dist.k1,
                    k2: dist.k2,
                    p1: dist.p1,
                    p2: dist.p2,
                    gamma1: positive("gamma1", required(model, "gamma1", proj.gamma1)?)?,
                    gamma2: positive("gamma2", required(model, "gamma2", proj.gamma2)?)?,
                    u0: required(model, "u0", proj.u0)?,
                    v0: required(model, "v0", proj.v0)?,
                })
            }
        };

        Ok(camera)
    }
}
