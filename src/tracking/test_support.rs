//! Synthetic images for tracker tests.

use opencv::core::{CV_8UC1, Mat, Rect, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::*;

pub fn blank(width: i32, height: i32, value: f64) -> Mat {
    Mat::new_rows_cols_with_default(height, width, CV_8UC1, Scalar::all(value)).unwrap()
}

/// Dark frame with bright, slightly blurred squares at the given top-left corners.
pub fn squares(width: i32, height: i32, corners: &[(i32, i32)], side: i32) -> Mat {
    let mut img = blank(width, height, 20.0);
    for &(x, y) in corners {
        imgproc::rectangle(
            &mut img,
            Rect::new(x, y, side, side),
            Scalar::all(220.0),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
    }
    let mut out = Mat::default();
    imgproc::gaussian_blur_def(&img, &mut out, Size::new(5, 5), 1.0).unwrap();
    out
}

/// Textured frame: a grid of squares with spacing `step`, shifted by `(dx, dy)`.
pub fn checker(width: i32, height: i32, step: i32, dx: i32, dy: i32) -> Mat {
    let mut corners = Vec::new();
    let mut y = step / 2 + dy;
    while y + step / 2 < height {
        let mut x = step / 2 + dx;
        while x + step / 2 < width {
            corners.push((x, y));
            x += step;
        }
        y += step;
    }
    squares(width, height, &corners, step / 3)
}
