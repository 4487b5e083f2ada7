//! Vision/OCR Layer
//!
//! Tiling, coordinate projection and duplicate suppression for large drawing
//! pages, plus the PaddleOCR backend that reads text inside each tile.

pub mod dedup;
pub mod detection;
pub mod geometry;
pub mod models;
pub mod ocr;
pub mod postprocess;
pub mod preprocess;
pub mod projection;
pub mod tiling;

pub use dedup::{deduplicate, normalize_text};
pub use detection::{assign_word_indices, GlobalDetection, RawDetection, WordDetection};
pub use geometry::{iou, BoundingBox};
pub use models::{ModelManager, ModelPaths, ModelType, OnnxSession};
pub use ocr::{InferenceAdapter, OcrEngine, OcrEngineConfig};
pub use projection::{project, TileFrame};
pub use tiling::{crop_tiles, stride, Tile};
