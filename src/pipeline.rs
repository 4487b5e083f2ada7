//! Page pipeline
//!
//! Tiles a page, runs the inference adapter batch by batch, projects every
//! tile's detections into page coordinates and merges duplicates from the
//! overlap regions into one word table.

use crossbeam_channel::Sender;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ConfigurationError, InferenceError, PipelineError};
use crate::shared::{JobEvent, ProgressEvent};
use crate::vision::dedup::deduplicate;
use crate::vision::detection::{assign_word_indices, GlobalDetection, WordDetection};
use crate::vision::ocr::InferenceAdapter;
use crate::vision::projection::{project, TileFrame};
use crate::vision::tiling::{crop_tiles, stride};

/// Parameters for one page run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Pixels shared by neighbouring tiles
    pub overlap: u32,
    /// Tiles per inference call
    pub batch_size: usize,
    /// Minimum IoU for two equal-text detections to be merged
    pub iou_threshold: f64,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            tile_size: 1000,
            overlap: 250,
            batch_size: 2,
            iou_threshold: 0.6,
        }
    }
}

impl PageConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        stride(self.tile_size, self.overlap)?;
        if self.batch_size == 0 {
            return Err(ConfigurationError::ZeroBatchSize);
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigurationError::InvalidIouThreshold(self.iou_threshold));
        }
        Ok(())
    }
}

/// Final word table of one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageDetections {
    pub words: Vec<WordDetection>,
    pub page_width: u32,
    pub page_height: u32,
    pub tile_count: usize,
    pub batch_count: usize,
}

impl PageDetections {
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Run the tile-and-merge pipeline over one page.
///
/// `progress` is called after every batch with `(completed_batches, total_batches)`.
/// Tiles without text contribute nothing; a page without any text yields an
/// empty table, not an error. A NaN or infinite confidence from the adapter
/// fails the page with [`InferenceError::MalformedOutput`].
pub fn run_page<A>(
    image: &RgbImage,
    config: &PageConfig,
    adapter: &mut A,
    mut progress: Option<&mut dyn FnMut(usize, usize)>,
) -> Result<PageDetections, PipelineError>
where
    A: InferenceAdapter + ?Sized,
{
    let start = Instant::now();
    let (page_width, page_height) = image.dimensions();
    if page_width == 0 || page_height == 0 {
        return Err(PipelineError::EmptyImage);
    }
    config.validate()?;

    let tiles = crop_tiles(image, config.tile_size, config.overlap)?;
    if tiles.is_empty() {
        return Err(PipelineError::NoTiles);
    }

    let total_batches = tiles.len().div_ceil(config.batch_size);
    debug!(
        "Page {}x{}: {} tiles in {} batches of up to {}",
        page_width,
        page_height,
        tiles.len(),
        total_batches,
        config.batch_size
    );

    let mut results = Vec::with_capacity(tiles.len());
    for (n, chunk) in tiles.chunks(config.batch_size).enumerate() {
        let images: Vec<&RgbImage> = chunk.iter().map(|tile| &tile.image).collect();
        let output = adapter.infer(&images)?;
        if output.len() != chunk.len() {
            return Err(PipelineError::ResultCountMismatch {
                expected: chunk.len(),
                actual: output.len(),
            });
        }
        let mut rows = output.iter().flatten().flatten();
        if let Some(bad) = rows.find(|d| !d.confidence.is_finite()) {
            return Err(InferenceError::MalformedOutput(format!(
                "non-finite confidence {} for {:?}",
                bad.confidence, bad.value
            ))
            .into());
        }
        results.extend(output);

        debug!("Batch {}/{} done", n + 1, total_batches);
        if let Some(callback) = progress.as_mut() {
            callback(n + 1, total_batches);
        }
    }

    let mut merged: Vec<GlobalDetection> = Vec::new();
    for (tile, table) in tiles.iter().zip(results) {
        let Some(table) = table else {
            continue;
        };
        let frame = TileFrame::for_tile(tile, page_width, page_height);
        merged.extend(project(&table, &frame));
    }

    let before = merged.len();
    let words = assign_word_indices(deduplicate(merged, config.iou_threshold));

    info!(
        "Page {}x{}: {} detections, {} after dedup ({:?})",
        page_width,
        page_height,
        before,
        words.len(),
        start.elapsed()
    );

    Ok(PageDetections {
        words,
        page_width,
        page_height,
        tile_count: tiles.len(),
        batch_count: total_batches,
    })
}

/// Process every page of a document in order, publishing progress on `events`.
///
/// The first failing page stops the job; a `Failed` event is sent and the
/// error returned. A closed channel does not interrupt processing.
pub fn process_document<A>(
    job_id: Uuid,
    pages: &[RgbImage],
    config: &PageConfig,
    adapter: &mut A,
    events: &Sender<JobEvent>,
) -> Result<Vec<PageDetections>, PipelineError>
where
    A: InferenceAdapter + ?Sized,
{
    let publish = |event: ProgressEvent| {
        if events.send(JobEvent::new(job_id, event)).is_err() {
            warn!("Progress receiver for job {} dropped", job_id);
        }
    };

    info!("Job {}: processing {} pages", job_id, pages.len());
    publish(ProgressEvent::Started { total_pages: pages.len() });

    let mut document = Vec::with_capacity(pages.len());
    for (page, image) in pages.iter().enumerate() {
        publish(ProgressEvent::PageStarted { page });

        let mut on_batch = |completed_batches: usize, total_batches: usize| {
            publish(ProgressEvent::BatchCompleted {
                page,
                completed_batches,
                total_batches,
            });
        };

        match run_page(image, config, adapter, Some(&mut on_batch)) {
            Ok(detections) => {
                publish(ProgressEvent::PageCompleted {
                    page,
                    detections: detections.len(),
                });
                document.push(detections);
            }
            Err(e) => {
                error!("Job {}: page {} failed: {}", job_id, page + 1, e);
                publish(ProgressEvent::Failed { message: e.to_string() });
                return Err(e);
            }
        }
    }

    publish(ProgressEvent::Completed);
    info!("Job {}: done", job_id);
    Ok(document)
}
