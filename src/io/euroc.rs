use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;
use opencv::prelude::*;
use opencv::{imgcodecs, imgcodecs::IMREAD_GRAYSCALE};

#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub timestamp_ns: u64,
    pub filename: String,
}

impl ImageEntry {
    pub fn timestamp_s(&self) -> f64 {
        self.timestamp_ns as f64 * 1e-9
    }
}

/// Monocular image stream of a EuRoC MAV sequence (`<root>/cam0`).
#[derive(Debug)]
pub struct EurocSequence {
    image_dir: PathBuf,
    pub entries: Vec<ImageEntry>,
}

impl EurocSequence {
    /// Open the `cam0` stream of the sequence at `root` (the `mav0` directory).
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::with_camera(root, "cam0")
    }

    pub fn with_camera<P: AsRef<Path>>(root: P, camera: &str) -> Result<Self> {
        let cam_dir = root.as_ref().join(camera);
        let entries = load_image_list(cam_dir.join("data.csv"))?;
        if entries.is_empty() {
            bail!("No images listed in {}", cam_dir.join("data.csv").display());
        }
        Ok(Self {
            image_dir: cam_dir.join("data"),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn timestamp_s(&self, idx: usize) -> Option<f64> {
        self.entries.get(idx).map(ImageEntry::timestamp_s)
    }

    pub fn image_path(&self, idx: usize) -> Option<PathBuf> {
        self.entries.get(idx).map(|e| self.image_dir.join(&e.filename))
    }

    /// Load image `idx` as 8-bit grayscale.
    pub fn image(&self, idx: usize) -> Result<Mat> {
        let path = self
            .image_path(idx)
            .with_context(|| format!("No frame at index {}", idx))?;
        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 image path {:?}", path))?;

        let image = imgcodecs::imread(path_str, IMREAD_GRAYSCALE)
            .with_context(|| format!("Failed to read image {:?}", path))?;
        if image.empty() {
            bail!("Image {:?} is missing or unreadable", path);
        }
        Ok(image)
    }
}

fn load_image_list(csv_path: PathBuf) -> Result<Vec<ImageEntry>> {
    let rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(&csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;
    parse_image_list(rdr)
}

fn parse_image_list<R: std::io::Read>(mut rdr: csv::Reader<R>) -> Result<Vec<ImageEntry>> {
    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        let ts: u64 = rec[0]
            .trim()
            .parse()
            .with_context(|| format!("Bad timestamp {:?}", &rec[0]))?;
        let filename = rec[1].trim().to_string();
        entries.push(ImageEntry {
            timestamp_ns: ts,
            filename,
        });
    }
    Ok(entries)
}
