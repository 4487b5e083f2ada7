//! Application Configuration
//!
//! User settings and preferences stored in TOML format. Missing keys fall back
//! to their defaults, so a config file only needs the values it changes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigurationError;
use crate::pipeline::PageConfig;
use crate::vision::ocr::OcrEngineConfig;
use crate::vision::postprocess::DetectionParams;
use crate::vision::preprocess::PreprocessConfig;

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Tile geometry
    pub tiling: TilingConfig,
    /// OCR model settings
    pub inference: InferenceConfig,
    /// Duplicate merging
    pub dedup: DedupConfig,
    /// Results and logging
    pub output: OutputConfig,
}

/// Tile geometry in page pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilingConfig {
    pub tile_size: u32,
    pub overlap: u32,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_size: 1000,
            overlap: 250,
        }
    }
}

/// OCR inference settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Tiles per detection run
    pub batch_size: usize,
    /// Use CUDA/CoreML when available
    pub use_gpu: bool,
    /// Model directory; the data directory is used when unset
    pub models_dir: Option<PathBuf>,
    /// Longest detection input side
    pub det_limit_side: u32,
    /// Pixel probability threshold of the detection map
    pub det_threshold: f32,
    /// Minimum mean probability of a text box
    pub box_threshold: f32,
    /// Text box expansion ratio
    pub unclip_ratio: f32,
    /// Recognition input height
    pub rec_height: u32,
    /// Recognition input width cap
    pub rec_max_width: u32,
    /// Text crops per recognition run
    pub rec_batch_size: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            use_gpu: false,
            models_dir: None,
            det_limit_side: 960,
            det_threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            rec_height: 48,
            rec_max_width: 640,
            rec_batch_size: 16,
        }
    }
}

/// Duplicate merging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub iou_threshold: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { iou_threshold: 0.6 }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for page tables and annotated images
    pub output_dir: PathBuf,
    /// Write annotated page images
    pub annotate: bool,
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            annotate: true,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Pipeline parameters for one page
    pub fn page_config(&self) -> PageConfig {
        PageConfig {
            tile_size: self.tiling.tile_size,
            overlap: self.tiling.overlap,
            batch_size: self.inference.batch_size,
            iou_threshold: self.dedup.iou_threshold,
        }
    }

    /// Settings for the ONNX OCR engine
    pub fn engine_config(&self) -> OcrEngineConfig {
        let inference = &self.inference;
        OcrEngineConfig {
            preprocess: PreprocessConfig {
                det_limit_side: inference.det_limit_side,
                rec_height: inference.rec_height,
                rec_max_width: inference.rec_max_width,
                ..Default::default()
            },
            detection: DetectionParams {
                threshold: inference.det_threshold,
                box_threshold: inference.box_threshold,
                unclip_ratio: inference.unclip_ratio,
                ..Default::default()
            },
            rec_batch_size: inference.rec_batch_size,
            use_gpu: inference.use_gpu,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.page_config().validate()
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
