//! Model output decoding
//!
//! Converts the DB probability map into text boxes and CTC logits into strings.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};

/// Parameters for turning a probability map into boxes
#[derive(Debug, Clone, Copy)]
pub struct DetectionParams {
    /// Pixel probability above which a pixel counts as text
    pub threshold: f32,
    /// Minimum mean probability inside a box
    pub box_threshold: f32,
    /// Box expansion ratio (area * ratio / perimeter)
    pub unclip_ratio: f32,
    /// Boxes whose shorter side is below this (map pixels) are dropped
    pub min_size: u32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            min_size: 3,
        }
    }
}

/// Text box in source image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

/// Extract axis-aligned text boxes from a `map_width x map_height` probability map.
///
/// Only the top-left `valid_width x valid_height` region is searched (the rest is
/// batch padding). Boxes are scaled by `scale_x`/`scale_y` into source pixels and
/// clamped to `source_width x source_height`.
#[allow(clippy::too_many_arguments)]
pub fn boxes_from_probability_map(
    probs: &[f32],
    map_width: usize,
    valid_width: u32,
    valid_height: u32,
    scale_x: f32,
    scale_y: f32,
    source_width: u32,
    source_height: u32,
    params: &DetectionParams,
) -> Vec<PixelBox> {
    let mut mask = GrayImage::new(valid_width, valid_height);
    for y in 0..valid_height {
        let row = y as usize * map_width;
        for x in 0..valid_width {
            if probs[row + x as usize] > params.threshold {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    let contours: Vec<Contour<u32>> = find_contours(&mask);
    let mut boxes = Vec::new();

    for contour in contours {
        if contour.border_type != BorderType::Outer || contour.points.is_empty() {
            continue;
        }

        let min_x = contour.points.iter().map(|p| p.x).min().unwrap_or(0);
        let max_x = contour.points.iter().map(|p| p.x).max().unwrap_or(0);
        let min_y = contour.points.iter().map(|p| p.y).min().unwrap_or(0);
        let max_y = contour.points.iter().map(|p| p.y).max().unwrap_or(0);

        let w = max_x - min_x + 1;
        let h = max_y - min_y + 1;
        if w.min(h) < params.min_size {
            continue;
        }

        let score = mean_probability(probs, map_width, min_x, min_y, max_x, max_y);
        if score < params.box_threshold {
            continue;
        }

        let (w, h) = (w as f32, h as f32);
        let distance = w * h * params.unclip_ratio / (2.0 * (w + h));

        let x1 = (min_x as f32 - distance) * scale_x;
        let y1 = (min_y as f32 - distance) * scale_y;
        let x2 = (max_x as f32 + 1.0 + distance) * scale_x;
        let y2 = (max_y as f32 + 1.0 + distance) * scale_y;

        let b = PixelBox {
            x1: x1.clamp(0.0, source_width as f32),
            y1: y1.clamp(0.0, source_height as f32),
            x2: x2.clamp(0.0, source_width as f32),
            y2: y2.clamp(0.0, source_height as f32),
            score,
        };
        if b.x2 - b.x1 < 1.0 || b.y2 - b.y1 < 1.0 {
            continue;
        }
        boxes.push(b);
    }

    // Reading order: top to bottom, then left to right
    boxes.sort_by(|a, b| a.y1.total_cmp(&b.y1).then(a.x1.total_cmp(&b.x1)));

    boxes
}

/// Mean probability inside an inclusive rectangle
fn mean_probability(probs: &[f32], map_width: usize, x1: u32, y1: u32, x2: u32, y2: u32) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in y1..=y2 {
        let row = y as usize * map_width;
        for x in x1..=x2 {
            sum += probs[row + x as usize] as f64;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

/// Greedy CTC decoding of one sequence of `timesteps x classes` scores.
///
/// Class 0 is the blank; class `k` maps to `charset[k - 1]`. Repeated classes
/// collapse. Returns the text and the mean score of the emitted characters.
pub fn ctc_greedy_decode(
    scores: &[f32],
    timesteps: usize,
    classes: usize,
    charset: &[String],
) -> (String, f32) {
    let mut text = String::new();
    let mut confidence_sum = 0.0f32;
    let mut emitted = 0usize;
    let mut previous = 0usize;

    for t in 0..timesteps {
        let step = &scores[t * classes..(t + 1) * classes];
        let (best, best_score) = step
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |acc, (k, v)| if v > acc.1 { (k, v) } else { acc });

        if best != 0 && best != previous {
            if let Some(ch) = charset.get(best - 1) {
                text.push_str(ch);
                confidence_sum += best_score;
                emitted += 1;
            }
        }
        previous = best;
    }

    let confidence = if emitted == 0 {
        0.0
    } else {
        confidence_sum / emitted as f32
    };

    (text, confidence)
}

/// Parse a PaddleOCR dictionary file (one symbol per line) and append the space class
pub fn parse_charset(contents: &str) -> Vec<String> {
    let mut charset: Vec<String> = contents
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
        .collect();
    charset.push(" ".to_string());
    charset
}
