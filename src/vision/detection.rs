//! Detection records at each stage of the pipeline
//!
//! - [`RawDetection`]: what the inference adapter returns, boxes relative to the tile
//! - [`GlobalDetection`]: projected into page-normalized coordinates, stamped with its tile
//! - [`WordDetection`]: a row of the final page table, with its dense `word_idx`

use serde::{Deserialize, Serialize};

use super::geometry::BoundingBox;

/// Text token recognized inside one tile.
///
/// The box is unit-normalized to the tile's width and height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Recognized text
    pub value: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f64,
    /// Box relative to the tile
    #[serde(flatten)]
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(value: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            value: value.into(),
            confidence,
            bbox,
        }
    }
}

/// Text token in page-normalized coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDetection {
    pub value: String,
    pub confidence: f64,
    /// Box relative to the full page
    #[serde(flatten)]
    pub bbox: BoundingBox,
    /// Tile the detection came from
    pub tile_id: usize,
}

/// Row of the finalized page table consumed downstream.
///
/// Serialized columns: value, confidence, x1, y1, x2, y2, tile_id, word_idx.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordDetection {
    #[serde(flatten)]
    pub detection: GlobalDetection,
    /// Dense zero-based index in the final order
    pub word_idx: usize,
}

impl WordDetection {
    pub fn value(&self) -> &str {
        &self.detection.value
    }

    pub fn confidence(&self) -> f64 {
        self.detection.confidence
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.detection.bbox
    }

    pub fn tile_id(&self) -> usize {
        self.detection.tile_id
    }
}

/// Number the final sequence densely from zero, keeping its order
pub fn assign_word_indices(detections: Vec<GlobalDetection>) -> Vec<WordDetection> {
    detections
        .into_iter()
        .enumerate()
        .map(|(word_idx, detection)| WordDetection { detection, word_idx })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global(value: &str, tile_id: usize) -> GlobalDetection {
        GlobalDetection {
            value: value.to_string(),
            confidence: 0.9,
            bbox: BoundingBox::new(0.1, 0.1, 0.2, 0.2),
            tile_id,
        }
    }

    #[test]
    fn test_word_indices_are_dense_and_ordered() {
        let words = assign_word_indices(vec![global("B", 4), global("A", 0), global("C", 2)]);

        let indices: Vec<usize> = words.iter().map(|w| w.word_idx).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(words[0].value(), "B");
        assert_eq!(words[0].tile_id(), 4);
    }

    #[test]
    fn test_word_detection_serializes_flat_columns() {
        let word = assign_word_indices(vec![global("W12", 3)]).remove(0);
        let json = serde_json::to_value(&word).unwrap();

        for column in ["value", "confidence", "x1", "y1", "x2", "y2", "tile_id", "word_idx"] {
            assert!(json.get(column).is_some(), "missing column {}", column);
        }
        assert_eq!(json["tile_id"], 3);
        assert_eq!(json["word_idx"], 0);
    }

    #[test]
    fn test_word_detection_json_roundtrip() {
        let word = assign_word_indices(vec![global("PT-4", 1)]).remove(0);
        let json = serde_json::to_string(&word).unwrap();
        let parsed: WordDetection = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, word);
    }
}
