//! OCR (Optical Character Recognition) module
//!
//! [`InferenceAdapter`] is the seam between the page pipeline and a text
//! detection/recognition backend. [`OcrEngine`] implements it with PaddleOCR
//! models via ONNX Runtime.

use image::{imageops, RgbImage};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use super::detection::RawDetection;
use super::geometry::BoundingBox;
use super::models::{ModelPaths, OnnxSession};
use super::postprocess::{
    boxes_from_probability_map, ctc_greedy_decode, parse_charset, DetectionParams, PixelBox,
};
use super::preprocess::{prepare_detection, prepare_recognition, stack_padded, PreprocessConfig};
use crate::error::InferenceError;

/// One detection table per tile of a batch; `None` means no text
pub type BatchOutput = Vec<Option<Vec<RawDetection>>>;

/// Batched text detection and recognition.
///
/// `infer` receives the tile images of one batch and must return exactly one
/// entry per image, in order. `None` or an empty table both mean "no text".
/// Boxes are unit-normalized to the tile's width and height.
pub trait InferenceAdapter {
    fn infer(&mut self, batch: &[&RgbImage]) -> Result<BatchOutput, InferenceError>;
}

impl<A: InferenceAdapter + ?Sized> InferenceAdapter for &mut A {
    fn infer(&mut self, batch: &[&RgbImage]) -> Result<BatchOutput, InferenceError> {
        (**self).infer(batch)
    }
}

impl<A: InferenceAdapter + ?Sized> InferenceAdapter for Box<A> {
    fn infer(&mut self, batch: &[&RgbImage]) -> Result<BatchOutput, InferenceError> {
        (**self).infer(batch)
    }
}

/// OCR engine settings
#[derive(Debug, Clone)]
pub struct OcrEngineConfig {
    pub preprocess: PreprocessConfig,
    pub detection: DetectionParams,
    /// Text crops per recognition run
    pub rec_batch_size: usize,
    /// Request a GPU execution provider
    pub use_gpu: bool,
}

impl Default for OcrEngineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            detection: DetectionParams::default(),
            rec_batch_size: 16,
            use_gpu: false,
        }
    }
}

/// OCR engine using PaddleOCR via ONNX Runtime
pub struct OcrEngine {
    detector: OnnxSession,
    recognizer: OnnxSession,
    charset: Vec<String>,
    config: OcrEngineConfig,
}

impl OcrEngine {
    /// Load detection, recognition and dictionary files
    pub fn new(models: &ModelPaths, config: OcrEngineConfig) -> Result<Self, InferenceError> {
        let detector = OnnxSession::new(&models.detection, config.use_gpu)?;
        let recognizer = OnnxSession::new(&models.recognition, config.use_gpu)?;
        let charset = load_charset(&models.dictionary)?;

        debug!("OCR engine ready ({} symbols)", charset.len());

        Ok(Self {
            detector,
            recognizer,
            charset,
            config,
        })
    }

    /// Detect text boxes for every image of a batch with a single model run
    fn detect_batch(&mut self, batch: &[&RgbImage]) -> Result<Vec<Vec<PixelBox>>, InferenceError> {
        let mut tensors = Vec::with_capacity(batch.len());
        let mut sizes = Vec::with_capacity(batch.len());
        for image in batch {
            let (tensor, w, h) = prepare_detection(image, &self.config.preprocess);
            tensors.push(tensor);
            sizes.push((w, h));
        }

        let (shape, probs) = self.detector.run(stack_padded(&tensors))?;

        // Expected [N, 1, H, W]
        if shape.len() != 4 || shape[0] != batch.len() {
            return Err(InferenceError::MalformedOutput(format!(
                "detection output shape {:?} for batch of {}",
                shape,
                batch.len()
            )));
        }
        let (map_h, map_w) = (shape[2], shape[3]);
        let plane = shape[1] * map_h * map_w;

        let mut boxes = Vec::with_capacity(batch.len());
        for (n, (image, &(det_w, det_h))) in batch.iter().zip(&sizes).enumerate() {
            let probs = &probs[n * plane..n * plane + map_h * map_w];
            let valid_w = det_w.min(map_w as u32);
            let valid_h = det_h.min(map_h as u32);

            boxes.push(boxes_from_probability_map(
                probs,
                map_w,
                valid_w,
                valid_h,
                image.width() as f32 / det_w as f32,
                image.height() as f32 / det_h as f32,
                image.width(),
                image.height(),
                &self.config.detection,
            ));
        }

        Ok(boxes)
    }

    /// Recognize the text inside each box of one tile
    fn recognize(
        &mut self,
        image: &RgbImage,
        boxes: &[PixelBox],
    ) -> Result<Vec<(String, f32)>, InferenceError> {
        let mut results = Vec::with_capacity(boxes.len());

        for chunk in boxes.chunks(self.config.rec_batch_size.max(1)) {
            let crops: Vec<_> = chunk
                .iter()
                .map(|b| {
                    let x = b.x1.floor() as u32;
                    let y = b.y1.floor() as u32;
                    let w = ((b.x2.ceil() as u32).saturating_sub(x)).max(1);
                    let h = ((b.y2.ceil() as u32).saturating_sub(y)).max(1);
                    let crop = imageops::crop_imm(image, x, y, w, h).to_image();
                    prepare_recognition(&crop, &self.config.preprocess)
                })
                .collect();

            let (shape, scores) = self.recognizer.run(stack_padded(&crops))?;

            // Expected [N, T, C]
            if shape.len() != 3 || shape[0] != chunk.len() {
                return Err(InferenceError::MalformedOutput(format!(
                    "recognition output shape {:?} for {} crops",
                    shape,
                    chunk.len()
                )));
            }
            let (timesteps, classes) = (shape[1], shape[2]);
            let stride = timesteps * classes;

            for n in 0..chunk.len() {
                let sequence = &scores[n * stride..(n + 1) * stride];
                results.push(ctc_greedy_decode(sequence, timesteps, classes, &self.charset));
            }
        }

        Ok(results)
    }
}

impl InferenceAdapter for OcrEngine {
    fn infer(&mut self, batch: &[&RgbImage]) -> Result<BatchOutput, InferenceError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let all_boxes = self.detect_batch(batch)?;

        let mut tables = Vec::with_capacity(batch.len());
        for (image, boxes) in batch.iter().zip(all_boxes) {
            if boxes.is_empty() {
                tables.push(None);
                continue;
            }

            let texts = self.recognize(image, &boxes)?;
            let (w, h) = (image.width() as f64, image.height() as f64);

            let table: Vec<RawDetection> = boxes
                .iter()
                .zip(texts)
                .filter(|(_, (text, _))| !text.trim().is_empty())
                .map(|(b, (text, confidence))| {
                    RawDetection::new(
                        text,
                        confidence as f64,
                        BoundingBox::new(
                            b.x1 as f64 / w,
                            b.y1 as f64 / h,
                            b.x2 as f64 / w,
                            b.y2 as f64 / h,
                        ),
                    )
                })
                .collect();

            tables.push(Some(table));
        }

        debug!("OCR batch of {} tiles in {:?}", batch.len(), start.elapsed());
        Ok(tables)
    }
}

fn load_charset(path: &Path) -> Result<Vec<String>, InferenceError> {
    let contents = std::fs::read_to_string(path)?;
    let charset = parse_charset(&contents);
    if charset.len() <= 1 {
        return Err(InferenceError::MalformedOutput(format!("dictionary {:?} is empty", path)));
    }
    Ok(charset)
}
