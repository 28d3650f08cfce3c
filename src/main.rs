//! frame-detector - run the camera detection pipeline over still images
//!
//! Each image is encoded into a planar YUV frame and pushed through the same
//! path live camera frames take, so the output matches what a preview
//! overlay would draw.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, unbounded};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use frame_detector::config::{self, AppConfig};
use frame_detector::vision::ModelAssets;
use frame_detector::{storage, CameraFrame, DetectionService, PlanarImage, Rotation};

/// frame-detector - object detection over camera-style frames
#[derive(Parser, Debug)]
#[command(name = "frame-detector")]
#[command(about = "Run SSD object detection over images through the camera frame pipeline")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ONNX model file
    #[arg(long)]
    model: Option<PathBuf>,

    /// Label file, one class name per line
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Minimum score (0.0 - 1.0)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Sensor rotation reported with each frame, in degrees
    #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
    rotation: i32,

    /// Destination view width in pixels
    #[arg(long)]
    view_width: Option<f32>,

    /// Destination view height in pixels
    #[arg(long)]
    view_height: Option<f32>,

    /// Write a default configuration file and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,

    /// Images to run detection on
    images: Vec<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        config::save_config(&AppConfig::default(), path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    if args.images.is_empty() {
        anyhow::bail!("No images given");
    }

    let rotation = Rotation::try_from(args.rotation)?;
    let config = apply_overrides(load_or_create_config(args.config.as_deref())?, &args);
    config.validate()?;

    let (tx, results) = unbounded();
    let service = DetectionService::start(&config, tx).context("Failed to start detection")?;

    for path in &args.images {
        run_image(&service, &results, path, rotation)?;
    }

    info!("Processed {} images", args.images.len());
    Ok(())
}

/// Load configuration from file or create default
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    let config_path = storage::default_config_path()?;
    if config_path.exists() {
        let config = config::load_config(&config_path)?;
        info!("Loaded configuration from {:?}", config_path);
        return Ok(config);
    }

    info!("Using default configuration");
    let mut config = AppConfig::default();
    let assets = ModelAssets::in_dir(&storage::get_models_dir()?);
    config.model.path = assets.model_path;
    config.model.labels_path = assets.labels_path;
    Ok(config)
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(mut config: AppConfig, args: &Args) -> AppConfig {
    if let Some(model) = &args.model {
        config.model.path = model.clone();
    }
    if let Some(labels) = &args.labels {
        config.model.labels_path = labels.clone();
    }
    if let Some(threshold) = args.threshold {
        config.detection.score_threshold = threshold;
    }
    if let Some(width) = args.view_width {
        config.view.width = width;
    }
    if let Some(height) = args.view_height {
        config.view.height = height;
    }
    config
}

/// Push one image through the service and print what it delivers
fn run_image(
    service: &DetectionService,
    results: &crossbeam_channel::Receiver<Vec<frame_detector::Detection>>,
    path: &Path,
    rotation: Rotation,
) -> Result<()> {
    let rgb = image::open(path)
        .with_context(|| format!("Failed to open image {:?}", path))?
        .to_rgb8();

    // Release runs after delivery, so it marks the end of this frame
    let (done_tx, done_rx) = bounded(1);
    let frame = CameraFrame::new(PlanarImage::from_rgb(&rgb), rotation.degrees()).with_release(move || {
        let _ = done_tx.send(());
    });

    if !service.analyze(frame) {
        warn!("Frame for {:?} was not accepted", path);
        return Ok(());
    }
    done_rx.recv().context("Detection worker stopped")?;

    println!("{}:", path.display());
    match results.try_recv() {
        Ok(detections) if detections.is_empty() => println!("  (nothing above threshold)"),
        Ok(detections) => {
            for d in &detections {
                let b = d.bounding_box;
                println!(
                    "  {:<28} [{:.1}, {:.1}, {:.1}, {:.1}]",
                    d.caption(),
                    b.left,
                    b.top,
                    b.right,
                    b.bottom
                );
            }
        }
        Err(_) => println!("  (frame dropped, see log)"),
    }

    Ok(())
}
