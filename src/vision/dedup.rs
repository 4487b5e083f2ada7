//! Duplicate suppression across overlapping tiles
//!
//! A text token lying in a tile overlap is recognized once per tile. After
//! projection the copies share (normalized) text and overlap heavily; this
//! module keeps the most confident copy.

use std::collections::HashMap;

use super::detection::GlobalDetection;
use super::geometry::iou;

/// Comparison key for text: surrounding whitespace trimmed, case folded
pub fn normalize_text(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Greedy non-maximum suppression that only merges detections with equal text.
///
/// Detections are ordered by confidence, descending (ties keep input order). Walking
/// that order, each surviving detection suppresses every later detection with the
/// same normalized text and `iou >= iou_threshold`. Detections with different text
/// never suppress each other however much they overlap.
///
/// The result is in confidence-descending order, not input order. Confidences
/// are ranked with [`f64::total_cmp`], so a NaN never breaks the sort.
pub fn deduplicate(detections: Vec<GlobalDetection>, iou_threshold: f64) -> Vec<GlobalDetection> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by(|&a, &b| {
        detections[b]
            .confidence
            .total_cmp(&detections[a].confidence)
    });

    let keys: Vec<String> = detections.iter().map(|d| normalize_text(&d.value)).collect();

    // Only equal-text pairs can interact, so the scan runs per text bucket.
    // Positions inside a bucket stay in sorted order.
    let mut buckets: HashMap<&str, Vec<usize>> = HashMap::new();
    for (pos, &idx) in order.iter().enumerate() {
        buckets.entry(keys[idx].as_str()).or_default().push(pos);
    }

    let mut suppressed = vec![false; order.len()];
    for positions in buckets.values() {
        for (n, &i) in positions.iter().enumerate() {
            if suppressed[i] {
                continue;
            }
            let box_i = &detections[order[i]].bbox;
            for &j in &positions[n + 1..] {
                if suppressed[j] {
                    continue;
                }
                if iou(box_i, &detections[order[j]].bbox) >= iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
    }

    let mut slots: Vec<Option<GlobalDetection>> = detections.into_iter().map(Some).collect();
    order
        .iter()
        .enumerate()
        .filter(|(pos, _)| !suppressed[*pos])
        .filter_map(|(_, &idx)| slots[idx].take())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::geometry::BoundingBox;

    fn det(value: &str, confidence: f64, bbox: (f64, f64, f64, f64)) -> GlobalDetection {
        GlobalDetection {
            value: value.to_string(),
            confidence,
            bbox: BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
            tile_id: 0,
        }
    }

    fn values(dets: &[GlobalDetection]) -> Vec<&str> {
        dets.iter().map(|d| d.value.as_str()).collect()
    }

    #[test]
    fn test_most_confident_copy_survives() {
        // Second box shifted so that IoU is about 0.9
        let a = det("T12", 0.8, (0.0, 0.0, 1.0, 1.0));
        let b = det("T12", 0.95, (0.0, 0.0, 1.0, 0.9));
        assert!(iou(&a.bbox, &b.bbox) > 0.6);

        let result = deduplicate(vec![a, b], 0.6);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence, 0.95);
    }

    #[test]
    fn test_different_text_is_never_merged() {
        let result = deduplicate(
            vec![
                det("12", 0.9, (0.1, 0.1, 0.2, 0.2)),
                det("21", 0.8, (0.1, 0.1, 0.2, 0.2)),
            ],
            0.6,
        );
        assert_eq!(values(&result), vec!["12", "21"]);
    }

    #[test]
    fn test_text_comparison_ignores_case_and_padding() {
        let result = deduplicate(
            vec![
                det("  Beam B1 ", 0.7, (0.1, 0.1, 0.3, 0.2)),
                det("beam b1", 0.9, (0.1, 0.1, 0.3, 0.2)),
            ],
            0.6,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].value, "beam b1");
    }

    #[test]
    fn test_low_overlap_same_text_both_kept() {
        let result = deduplicate(
            vec![
                det("A", 0.9, (0.0, 0.0, 0.1, 0.1)),
                det("A", 0.8, (0.05, 0.0, 0.15, 0.1)),
            ],
            0.6,
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // IoU exactly 0.5
        let result = deduplicate(
            vec![
                det("X", 0.9, (0.0, 0.0, 10.0, 10.0)),
                det("X", 0.8, (0.0, 0.0, 5.0, 10.0)),
            ],
            0.5,
        );
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_output_is_confidence_descending() {
        let result = deduplicate(
            vec![
                det("a", 0.2, (0.0, 0.0, 0.1, 0.1)),
                det("b", 0.9, (0.2, 0.2, 0.3, 0.3)),
                det("c", 0.5, (0.4, 0.4, 0.5, 0.5)),
            ],
            0.6,
        );
        assert_eq!(values(&result), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_ties_keep_input_order() {
        let result = deduplicate(
            vec![
                det("first", 0.5, (0.0, 0.0, 0.1, 0.1)),
                det("second", 0.5, (0.2, 0.2, 0.3, 0.3)),
                det("third", 0.5, (0.4, 0.4, 0.5, 0.5)),
            ],
            0.6,
        );
        assert_eq!(values(&result), vec!["first", "second", "third"]);

        // Equal confidence duplicates: the earlier input row wins
        let mut a = det("dup", 0.5, (0.0, 0.0, 0.1, 0.1));
        a.tile_id = 1;
        let mut b = det("dup", 0.5, (0.0, 0.0, 0.1, 0.1));
        b.tile_id = 2;
        let result = deduplicate(vec![a, b], 0.6);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].tile_id, 1);
    }

    #[test]
    fn test_suppressed_detection_does_not_suppress() {
        // a overlaps b, b overlaps c, a does not overlap c enough.
        // b is suppressed by a, so c must survive.
        let a = det("n", 0.9, (0.0, 0.0, 10.0, 10.0));
        let b = det("n", 0.8, (2.0, 0.0, 12.0, 10.0));
        let c = det("n", 0.7, (4.0, 0.0, 14.0, 10.0));
        assert!(iou(&a.bbox, &b.bbox) >= 0.6);
        assert!(iou(&b.bbox, &c.bbox) >= 0.6);
        assert!(iou(&a.bbox, &c.bbox) < 0.6);

        let result = deduplicate(vec![c, b, a], 0.6);
        let confidences: Vec<f64> = result.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn test_deduplication_is_idempotent() {
        let input = vec![
            det("A", 0.9, (0.0, 0.0, 0.1, 0.1)),
            det("A", 0.85, (0.0, 0.0, 0.1, 0.11)),
            det("B", 0.7, (0.0, 0.0, 0.1, 0.1)),
            det("A", 0.6, (0.5, 0.5, 0.6, 0.6)),
            det("b", 0.65, (0.0, 0.0, 0.1, 0.1)),
        ];
        let once = deduplicate(input, 0.6);
        let twice = deduplicate(once.clone(), 0.6);
        assert_eq!(once, twice);
        assert_eq!(values(&once), vec!["A", "B", "A"]);
    }

    #[test]
    fn test_nan_confidence_does_not_break_sorting() {
        let input: Vec<GlobalDetection> = (0..40)
            .map(|i| {
                let confidence = if i % 3 == 0 { f64::NAN } else { i as f64 / 40.0 };
                let x = i as f64 * 0.02;
                det(&format!("W{}", i), confidence, (x, 0.0, x + 0.01, 0.01))
            })
            .collect();

        let out = deduplicate(input, 0.6);
        assert_eq!(out.len(), 40);

        let finite: Vec<f64> = out
            .iter()
            .map(|d| d.confidence)
            .filter(|c| c.is_finite())
            .collect();
        assert!(finite.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_empty_input() {
        assert!(deduplicate(Vec::new(), 0.6).is_empty());
    }
}
