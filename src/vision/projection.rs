//! Tile-local to page-normalized coordinate projection

use super::detection::{GlobalDetection, RawDetection};
use super::geometry::BoundingBox;
use super::tiling::Tile;

/// Placement of one tile inside its page, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileFrame {
    pub tile_id: usize,
    pub x_offset: u32,
    pub y_offset: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub page_width: u32,
    pub page_height: u32,
}

impl TileFrame {
    /// Frame of a tile produced by the tiler for a page of the given size
    pub fn for_tile(tile: &Tile, page_width: u32, page_height: u32) -> Self {
        Self {
            tile_id: tile.tile_id,
            x_offset: tile.x_offset,
            y_offset: tile.y_offset,
            tile_width: tile.width(),
            tile_height: tile.height(),
            page_width,
            page_height,
        }
    }

    /// Tile-normalized box to page-normalized box.
    ///
    /// Each coordinate goes tile-normalized -> tile pixel -> page-normalized:
    /// `(c * tile_dim + offset) / page_dim`. Inverted boxes are not corrected.
    pub fn project_box(&self, bbox: &BoundingBox) -> BoundingBox {
        let tile_w = f64::from(self.tile_width);
        let tile_h = f64::from(self.tile_height);
        let x_off = f64::from(self.x_offset);
        let y_off = f64::from(self.y_offset);
        let page_w = f64::from(self.page_width);
        let page_h = f64::from(self.page_height);

        let x1_px = bbox.x1 * tile_w + x_off;
        let y1_px = bbox.y1 * tile_h + y_off;
        let x2_px = bbox.x2 * tile_w + x_off;
        let y2_px = bbox.y2 * tile_h + y_off;

        BoundingBox {
            x1: x1_px / page_w,
            y1: y1_px / page_h,
            x2: x2_px / page_w,
            y2: y2_px / page_h,
        }
    }
}

/// Project a tile's detection table into page coordinates, stamping every row with the tile id
pub fn project(detections: &[RawDetection], frame: &TileFrame) -> Vec<GlobalDetection> {
    detections
        .iter()
        .map(|det| GlobalDetection {
            value: det.value.clone(),
            confidence: det.confidence,
            bbox: frame.project_box(&det.bbox),
            tile_id: frame.tile_id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(x_offset: u32, y_offset: u32, tile_width: u32, tile_height: u32) -> TileFrame {
        TileFrame {
            tile_id: 7,
            x_offset,
            y_offset,
            tile_width,
            tile_height,
            page_width: 2000,
            page_height: 1600,
        }
    }

    #[test]
    fn test_full_tile_box_projects_to_tile_rect() {
        let f = frame(750, 1500, 1000, 100);
        let projected = f.project_box(&BoundingBox::new(0.0, 0.0, 1.0, 1.0));

        assert_eq!(projected.x1, 750.0 / 2000.0);
        assert_eq!(projected.y1, 1500.0 / 1600.0);
        assert_eq!(projected.x2, (750.0 + 1000.0) / 2000.0);
        assert_eq!(projected.y2, (1500.0 + 100.0) / 1600.0);
    }

    #[test]
    fn test_projection_arithmetic_order() {
        let f = frame(333, 17, 999, 487);
        let raw = BoundingBox::new(0.123, 0.456, 0.789, 0.987);
        let projected = f.project_box(&raw);

        assert_eq!(projected.x1, (0.123 * 999.0 + 333.0) / 2000.0);
        assert_eq!(projected.y1, (0.456 * 487.0 + 17.0) / 1600.0);
        assert_eq!(projected.x2, (0.789 * 999.0 + 333.0) / 2000.0);
        assert_eq!(projected.y2, (0.987 * 487.0 + 17.0) / 1600.0);
    }

    #[test]
    fn test_project_stamps_tile_id_and_keeps_text() {
        let raw = vec![
            RawDetection::new("W10x12", 0.91, BoundingBox::new(0.1, 0.1, 0.2, 0.2)),
            RawDetection::new("PT-3", 0.55, BoundingBox::new(0.5, 0.5, 0.6, 0.7)),
        ];
        let projected = project(&raw, &frame(0, 0, 1000, 1000));

        assert_eq!(projected.len(), 2);
        assert!(projected.iter().all(|d| d.tile_id == 7));
        assert_eq!(projected[0].value, "W10x12");
        assert_eq!(projected[1].confidence, 0.55);
    }

    #[test]
    fn test_inverted_boxes_propagate() {
        let projected = frame(0, 0, 1000, 1000).project_box(&BoundingBox::new(0.8, 0.2, 0.4, 0.1));
        assert!(projected.x1 > projected.x2);
        assert!(projected.y1 > projected.y2);
    }

    #[test]
    fn test_empty_table_projects_to_empty() {
        assert!(project(&[], &frame(0, 0, 10, 10)).is_empty());
    }
}
