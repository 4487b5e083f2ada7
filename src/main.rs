//! drawing-ocr - Tile-and-merge OCR for large engineering drawings
//!
//! Reads rasterized drawing pages, runs OCR over overlapping tiles and writes
//! one merged word table (and optionally an annotated image) per page.

use anyhow::{Context, Result};
use clap::Parser;
use image::Rgb;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use drawing_ocr::config::{self, AppConfig};
use drawing_ocr::pipeline::process_document;
use drawing_ocr::render::draw_boxes;
use drawing_ocr::shared::{JobRegistry, JobStatus};
use drawing_ocr::storage;
use drawing_ocr::vision::{ModelManager, OcrEngine};

/// drawing-ocr - OCR for large engineering drawings
#[derive(Parser, Debug)]
#[command(name = "drawing-ocr")]
#[command(about = "Tile-and-merge OCR for rasterized drawing pages")]
struct Args {
    /// Page images, processed in the given order
    #[arg(required = true)]
    pages: Vec<PathBuf>,

    /// Configuration file (defaults to <config_dir>/config.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tile edge length in pixels
    #[arg(long)]
    tile_size: Option<u32>,

    /// Overlap between neighbouring tiles in pixels
    #[arg(long)]
    overlap: Option<u32>,

    /// Tiles per inference call
    #[arg(long)]
    batch_size: Option<usize>,

    /// IoU at which equal-text detections are merged
    #[arg(long)]
    iou_threshold: Option<f64>,

    /// Run inference on the GPU when available
    #[arg(long)]
    gpu: bool,

    /// Directory holding det.onnx, rec.onnx and dict.txt
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Directory for results
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip writing annotated page images
    #[arg(long)]
    no_annotate: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (mut config, config_source) = load_or_default_config(args.config.as_ref())?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.output.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match config_source {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration"),
    }

    apply_overrides(&mut config, &args);
    config.validate()?;

    let page_config = config.page_config();
    info!(
        "Tiling {}px with {}px overlap, batch size {}, IoU threshold {}",
        page_config.tile_size,
        page_config.overlap,
        page_config.batch_size,
        page_config.iou_threshold
    );

    let manager = match &config.inference.models_dir {
        Some(dir) => ModelManager::with_dir(dir.clone())?,
        None => ModelManager::new()?,
    };
    let model_paths = manager.ensure_all_models()?;

    if config.inference.use_gpu {
        info!("GPU inference requested");
    }
    let mut engine = OcrEngine::new(&model_paths, config.engine_config())?;

    let pages = args
        .pages
        .iter()
        .map(|path| {
            image::open(path)
                .map(|img| img.to_rgb8())
                .with_context(|| format!("Failed to open page image {:?}", path))
        })
        .collect::<Result<Vec<_>>>()?;

    let job_id = Uuid::new_v4();
    let registry = JobRegistry::new();
    registry.register(job_id);

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let worker = std::thread::spawn(move || {
        let result = process_document(job_id, &pages, &page_config, &mut engine, &event_tx);
        (pages, result)
    });

    // The loop ends once the worker drops its sender
    for event in event_rx.iter() {
        let snapshot = registry.apply(&event);
        info!("[{:5.1}%] {}", snapshot.progress, snapshot.message);
    }

    let (pages, result) = worker
        .join()
        .map_err(|_| anyhow::anyhow!("OCR worker panicked"))?;
    let document = result?;

    if let Some(snapshot) = registry.get(&job_id) {
        if snapshot.status != JobStatus::Completed {
            warn!("Job {} ended as {:?}", job_id, snapshot.status);
        }
    }

    let output_dir = &config.output.output_dir;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {:?}", output_dir))?;

    for (index, (page, detections)) in pages.iter().zip(&document).enumerate() {
        let table_path = output_dir.join(format!("page_{}.json", index));
        storage::save_detections(&detections.words, &table_path)?;

        if config.output.annotate {
            let image_path = output_dir.join(format!("page_{}.png", index));
            draw_boxes(page, &detections.words, Rgb([255, 0, 0]), 2)
                .save(&image_path)
                .with_context(|| format!("Failed to write {:?}", image_path))?;
        }

        info!("Page {}: {} words -> {:?}", index + 1, detections.len(), table_path);
    }

    info!("drawing-ocr finished");
    Ok(())
}

/// Explicit `--config`, else `<config_dir>/config.toml` when present, else defaults
fn load_or_default_config(explicit: Option<&PathBuf>) -> Result<(AppConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        return Ok((config::load_config(path)?, Some(path.clone())));
    }

    if let Ok(config_dir) = storage::get_config_dir() {
        let path = config_dir.join("config.toml");
        if path.exists() {
            return Ok((config::load_config(&path)?, Some(path)));
        }
    }

    Ok((AppConfig::default(), None))
}

fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(tile_size) = args.tile_size {
        config.tiling.tile_size = tile_size;
    }
    if let Some(overlap) = args.overlap {
        config.tiling.overlap = overlap;
    }
    if let Some(batch_size) = args.batch_size {
        config.inference.batch_size = batch_size;
    }
    if let Some(iou_threshold) = args.iou_threshold {
        config.dedup.iou_threshold = iou_threshold;
    }
    if args.gpu {
        config.inference.use_gpu = true;
    }
    if let Some(dir) = &args.models_dir {
        config.inference.models_dir = Some(dir.clone());
    }
    if let Some(dir) = &args.output_dir {
        config.output.output_dir = dir.clone();
    }
    if args.no_annotate {
        config.output.annotate = false;
    }
}
