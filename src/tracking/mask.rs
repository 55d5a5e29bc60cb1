//! Occupancy mask and spatially uniform track selection.
//!
//! Tracks are visited from oldest to youngest; a track is kept only if its
//! pixel is still free, and each kept track stamps a filled disk of radius
//! `min_dist` as occupied. The remaining free area is where new corners may
//! be detected.

use anyhow::Result;
use nalgebra::Point2;
use opencv::core::{CV_8UC1, Mat, Point, Scalar};
use opencv::imgproc;
use opencv::prelude::*;
use thiserror::Error;

use crate::tracking::track::Track;

pub const FREE: u8 = 255;
pub const OCCUPIED: u8 = 0;

/// Why a mask cannot be used to restrict detection on a given image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskError {
    #[error("mask is empty")]
    Empty,
    #[error("mask type {0} is not single-channel 8-bit")]
    WrongType(i32),
    #[error("mask is {mask_cols}x{mask_rows} but image is {image_cols}x{image_rows}")]
    SizeMismatch {
        mask_cols: i32,
        mask_rows: i32,
        image_cols: i32,
        image_rows: i32,
    },
}

/// 8-bit single channel bitmap: [`FREE`] where a feature may be kept or
/// detected, [`OCCUPIED`] elsewhere.
pub struct OccupancyMask {
    mask: Mat,
}

impl OccupancyMask {
    /// All-free mask of the given size.
    pub fn free(width: i32, height: i32) -> Result<Self> {
        let mask = Mat::new_rows_cols_with_default(height, width, CV_8UC1, Scalar::all(FREE as f64))?;
        Ok(Self { mask })
    }

    /// Mask initialized from a validity mask (nonzero = valid).
    pub fn from_validity(valid: &Mat) -> Result<Self> {
        let mut mask = Mat::default();
        imgproc::threshold(valid, &mut mask, 0.0, FREE as f64, imgproc::THRESH_BINARY)?;
        Ok(Self { mask })
    }

    /// Wrap an existing bitmap without checks.
    pub fn from_mat(mask: Mat) -> Self {
        Self { mask }
    }

    pub fn as_mat(&self) -> &Mat {
        &self.mask
    }

    pub fn width(&self) -> i32 {
        self.mask.cols()
    }

    pub fn height(&self) -> i32 {
        self.mask.rows()
    }

    /// Whether the pixel nearest to `pt` is free. Points outside the mask
    /// are never free.
    pub fn is_free(&self, pt: &Point2<f32>) -> bool {
        let Some(p) = to_pixel(pt) else {
            return false;
        };
        if p.x < 0 || p.y < 0 || p.x >= self.width() || p.y >= self.height() {
            return false;
        }
        self.mask
            .at_2d::<u8>(p.y, p.x)
            .map(|&v| v == FREE)
            .unwrap_or(false)
    }

    /// Mark a filled disk around `pt` as occupied.
    pub fn occupy(&mut self, pt: &Point2<f32>, radius: i32) -> Result<()> {
        let Some(center) = to_pixel(pt) else {
            return Ok(());
        };
        imgproc::circle(
            &mut self.mask,
            center,
            radius,
            Scalar::all(OCCUPIED as f64),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
        Ok(())
    }

    /// Check that this mask can restrict detection on `image`.
    pub fn check_against(&self, image: &Mat) -> std::result::Result<(), MaskError> {
        if self.mask.empty() {
            return Err(MaskError::Empty);
        }
        if self.mask.typ() != CV_8UC1 {
            return Err(MaskError::WrongType(self.mask.typ()));
        }
        if self.mask.cols() != image.cols() || self.mask.rows() != image.rows() {
            return Err(MaskError::SizeMismatch {
                mask_cols: self.mask.cols(),
                mask_rows: self.mask.rows(),
                image_cols: image.cols(),
                image_rows: image.rows(),
            });
        }
        Ok(())
    }
}

/// Nearest integer pixel, rounding half to even like `cvRound`.
fn to_pixel(pt: &Point2<f32>) -> Option<Point> {
    if !(pt.x.is_finite() && pt.y.is_finite()) {
        return None;
    }
    Some(Point::new(
        pt.x.round_ties_even() as i32,
        pt.y.round_ties_even() as i32,
    ))
}

/// Keep the oldest, mutually separated tracks and stamp them into `mask`.
///
/// Tracks are ordered by descending age. The sort is stable, so tracks of
/// equal age keep their current relative order; since new detections are
/// appended after survivors, an older-inserted track wins a tie. Rejected
/// tracks are removed. Returns the number removed.
pub fn select_by_age(tracks: &mut Vec<Track>, mask: &mut OccupancyMask, min_dist: i32) -> Result<usize> {
    let before = tracks.len();
    tracks.sort_by(|a, b| b.age.cmp(&a.age));

    let mut selected = Vec::with_capacity(tracks.len());
    for track in tracks.drain(..) {
        if mask.is_free(&track.pixel) {
            mask.occupy(&track.pixel, min_dist)?;
            selected.push(track);
        }
    }
    *tracks = selected;

    Ok(before - tracks.len())
}
