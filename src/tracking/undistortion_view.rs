//! Debug rendering of a frame as seen through the undistortion.

use anyhow::{Result, bail};
use nalgebra::Point2;
use opencv::core::{CV_8UC1, Mat, Scalar};
use opencv::prelude::*;

use crate::camera::CameraModel;

/// Border added around the image on every side of the canvas.
pub const PADDING: i32 = 300;

/// Re-project every pixel of `image` through `camera` onto a synthetic
/// pinhole view with focal length `focal_length`.
///
/// The canvas is `PADDING` pixels larger than the image on every side, with
/// the principal point at the image center offset by the padding. Pixels
/// landing outside the canvas are skipped; unfilled canvas pixels stay black.
pub fn undistortion_view(camera: &dyn CameraModel, image: &Mat, focal_length: f64) -> Result<Mat> {
    if image.typ() != CV_8UC1 {
        bail!("Undistortion view needs a single-channel 8-bit image");
    }
    let (rows, cols) = (image.rows(), image.cols());
    let canvas_rows = rows + 2 * PADDING;
    let canvas_cols = cols + 2 * PADDING;
    let mut canvas = Mat::new_rows_cols_with_default(canvas_rows, canvas_cols, CV_8UC1, Scalar::all(0.0))?;

    let cx = cols as f64 / 2.0;
    let cy = rows as f64 / 2.0;
    for v in 0..rows {
        for u in 0..cols {
            let n = camera.normalized(&Point2::new(u as f64, v as f64));
            let x = n.x * focal_length + cx + PADDING as f64;
            let y = n.y * focal_length + cy + PADDING as f64;
            if !(x.is_finite() && y.is_finite()) {
                continue;
            }
            let (x, y) = (x.round() as i32, y.round() as i32);
            if x < 0 || y < 0 || x >= canvas_cols || y >= canvas_rows {
                continue;
            }
            *canvas.at_2d_mut::<u8>(y, x)? = *image.at_2d::<u8>(v, u)?;
        }
    }
    Ok(canvas)
}
