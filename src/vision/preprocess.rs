//! Image preprocessing for OCR models
//!
//! Turns RGB tiles and text crops into normalized NCHW tensors for the PaddleOCR
//! detection and recognition models.

use image::{imageops, RgbImage};
use ndarray::{s, Array3, Array4};

/// Preprocessing configuration
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Longest side allowed for the detection input (larger tiles are scaled down)
    pub det_limit_side: u32,
    /// Input height of the recognition model (typically 48)
    pub rec_height: u32,
    /// Maximum recognition input width
    pub rec_max_width: u32,
    /// Mean values for normalization [R, G, B]
    pub mean: [f32; 3],
    /// Std values for normalization [R, G, B]
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            det_limit_side: 960,
            rec_height: 48,
            rec_max_width: 640,
            // PaddleOCR maps [0, 255] -> [-1, 1]
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

/// Round to the nearest multiple of 32, never below 32
fn round_to_32(value: f32) -> u32 {
    (((value / 32.0).round() as u32) * 32).max(32)
}

/// Detection input size for a tile: longest side capped at `limit`, both sides multiples of 32
pub fn detection_size(width: u32, height: u32, limit: u32) -> (u32, u32) {
    let longest = width.max(height) as f32;
    let ratio = if longest > limit as f32 {
        limit as f32 / longest
    } else {
        1.0
    };
    (
        round_to_32(width as f32 * ratio),
        round_to_32(height as f32 * ratio),
    )
}

/// Recognition input width for a crop scaled to `height`, capped at `max_width`
pub fn recognition_width(width: u32, height: u32, target_height: u32, max_width: u32) -> u32 {
    if height == 0 {
        return 1;
    }
    let scaled = (width as f32 * target_height as f32 / height as f32).ceil() as u32;
    scaled.clamp(1, max_width)
}

/// Normalize an RGB image into a CHW tensor
pub fn to_chw(image: &RgbImage, mean: &[f32; 3], std: &[f32; 3]) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array3::<f32>::zeros((3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel.0[c] as f32 / 255.0;
            tensor[[c, y as usize, x as usize]] = (value - mean[c]) / std[c];
        }
    }

    tensor
}

/// Resize a tile for the detection model.
///
/// Returns the CHW tensor with its resized width and height.
pub fn prepare_detection(image: &RgbImage, config: &PreprocessConfig) -> (Array3<f32>, u32, u32) {
    let (w, h) = detection_size(image.width(), image.height(), config.det_limit_side);
    let resized = imageops::resize(image, w, h, imageops::FilterType::Triangle);
    (to_chw(&resized, &config.mean, &config.std), w, h)
}

/// Resize a text crop to the recognition height
pub fn prepare_recognition(crop: &RgbImage, config: &PreprocessConfig) -> Array3<f32> {
    let w = recognition_width(crop.width(), crop.height(), config.rec_height, config.rec_max_width);
    let resized = imageops::resize(crop, w, config.rec_height, imageops::FilterType::Triangle);
    to_chw(&resized, &config.mean, &config.std)
}

/// Stack CHW tensors into one NCHW batch, zero-padding right and bottom to the largest size
pub fn stack_padded(tensors: &[Array3<f32>]) -> Array4<f32> {
    let max_h = tensors.iter().map(|t| t.dim().1).max().unwrap_or(0);
    let max_w = tensors.iter().map(|t| t.dim().2).max().unwrap_or(0);

    let mut batch = Array4::<f32>::zeros((tensors.len(), 3, max_h, max_w));
    for (n, tensor) in tensors.iter().enumerate() {
        let (_, h, w) = tensor.dim();
        batch.slice_mut(s![n, .., ..h, ..w]).assign(tensor);
    }

    batch
}
