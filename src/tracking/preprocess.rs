//! Optional local contrast normalization of incoming frames.

use anyhow::Result;
use opencv::core::{Mat, Ptr, Size};
use opencv::imgproc::{self, CLAHE};
use opencv::prelude::*;

const CLAHE_CLIP_LIMIT: f64 = 3.0;
const CLAHE_TILE_GRID: i32 = 8;

/// CLAHE over an 8×8 tile grid with clip limit 3.0, or a pass-through.
pub struct Preprocessor {
    clahe: Option<Ptr<CLAHE>>,
}

impl Preprocessor {
    pub fn new(equalize: bool) -> Result<Self> {
        let clahe = if equalize {
            Some(imgproc::create_clahe(
                CLAHE_CLIP_LIMIT,
                Size::new(CLAHE_TILE_GRID, CLAHE_TILE_GRID),
            )?)
        } else {
            None
        };
        Ok(Self { clahe })
    }

    pub fn is_equalizing(&self) -> bool {
        self.clahe.is_some()
    }

    /// Return the image the tracker should work on. Nothing is retained
    /// between calls.
    pub fn apply(&mut self, image: &Mat) -> Result<Mat> {
        match self.clahe.as_mut() {
            Some(clahe) => {
                let mut out = Mat::default();
                clahe.apply(image, &mut out)?;
                Ok(out)
            }
            None => Ok(image.try_clone()?),
        }
    }
}
