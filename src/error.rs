//! Error types for the tile-and-merge pipeline
//!
//! Every error is terminal for the page being processed. Nothing here is
//! retried internally.

use thiserror::Error;

/// Invalid tiling or pipeline parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("tile size must be positive")]
    ZeroTileSize,

    #[error("overlap {overlap} must be smaller than tile size {tile_size}")]
    NonPositiveStride { tile_size: u32, overlap: u32 },

    #[error("batch size must be at least one")]
    ZeroBatchSize,

    #[error("IoU threshold must lie in [0, 1], got {0}")]
    InvalidIouThreshold(f64),
}

/// The inference adapter failed on a batch
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("ONNX Runtime error: {0}")]
    Runtime(#[from] ort::Error),

    #[error("unexpected model output: {0}")]
    MalformedOutput(String),

    #[error("failed to load model resource: {0}")]
    Resource(#[from] std::io::Error),

    #[error("inference backend failed: {0}")]
    Backend(String),
}

/// Structural failure while processing a page
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("page image is empty")]
    EmptyImage,

    #[error("tiling produced no tiles")]
    NoTiles,

    #[error("inference returned {actual} results for {expected} tiles")]
    ResultCountMismatch { expected: usize, actual: usize },
}
