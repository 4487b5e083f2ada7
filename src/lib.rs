//! Tile-and-merge OCR for large engineering drawings
//!
//! A page raster is cut into overlapping tiles, each tile is read by an OCR
//! backend, and the per-tile detections are projected back onto the page and
//! merged so text crossing a tile seam appears once.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod shared;
pub mod storage;
pub mod vision;

pub use error::{ConfigurationError, InferenceError, PipelineError};
pub use pipeline::{process_document, run_page, PageConfig, PageDetections};
