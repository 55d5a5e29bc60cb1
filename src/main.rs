use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rust_vins_tracker::camera::{CameraCalibration, CameraModel};
use rust_vins_tracker::io::euroc::EurocSequence;
use rust_vins_tracker::system::{FrameOutcome, FrontEnd};
use rust_vins_tracker::tracking::TrackerConfig;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rust_vins_tracker=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(
        args.next()
            .context("usage: rust_vins_tracker <config.yaml> [dataset/mav0]")?,
    );
    let dataset_path = args
        .next()
        .unwrap_or_else(|| "data/euroc/MH_01_easy/mav0".to_string());

    let calibration = CameraCalibration::load(&config_path)?;
    let camera = calibration.build()?;
    let config = TrackerConfig::load(&config_path)?;
    info!(
        camera = %calibration.camera_name,
        model = %camera.model_type(),
        width = config.image_width,
        height = config.image_height,
        freq = config.freq,
        "Loaded configuration from {}",
        config_path.display()
    );

    let sequence = EurocSequence::new(&dataset_path)?;
    info!("Loaded {} frames from {}", sequence.len(), dataset_path);

    let mut front_end = FrontEnd::new(config, camera)?;
    let mut n_features = 0usize;

    for i in 0..sequence.len() {
        let image = sequence.image(i)?;
        let Some(timestamp) = sequence.timestamp_s(i) else {
            break;
        };

        match front_end.process(&image, timestamp)? {
            FrameOutcome::Published(frame) => {
                n_features += frame.features.len();
                if front_end.num_published() % 100 == 0 {
                    info!(
                        "Frame {}/{}: {} features published, {} tracked, {} new, {:.1} ms",
                        i,
                        sequence.len(),
                        frame.features.len(),
                        frame.stats.n_tracked(),
                        frame.stats.n_detected,
                        frame.stats.timing.total_ms
                    );
                }
            }
            FrameOutcome::Restart => warn!("Restart at frame {} (t = {:.3})", i, timestamp),
            FrameOutcome::Tracked => {}
        }
    }

    let n_published = front_end.num_published();
    info!(
        "Done! Processed {} frames, published {} ({:.1} features per frame), {} restarts",
        front_end.num_frames(),
        n_published,
        n_features as f64 / n_published.max(1) as f64,
        front_end.num_restarts()
    );

    Ok(())
}
