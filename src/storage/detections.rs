//! Page detection tables as JSON
//!
//! One file per page holding an array of rows with the columns
//! value, confidence, x1, y1, x2, y2, tile_id, word_idx.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use crate::vision::detection::WordDetection;

/// Write a page table, creating parent directories as needed
pub fn save_detections(words: &[WordDetection], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(words)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;
    debug!("Saved {} detections to {:?}", words.len(), path);
    Ok(())
}

/// Read a page table written by [`save_detections`]
pub fn load_detections(path: &Path) -> Result<Vec<WordDetection>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let words = serde_json::from_str(&content)
        .with_context(|| format!("Invalid detection table {:?}", path))?;
    Ok(words)
}
