//! Overlapping tile partitioning of a page raster

use image::{imageops, RgbImage};

use crate::error::ConfigurationError;

/// One crop of the page, in raster-scan order
#[derive(Debug, Clone)]
pub struct Tile {
    /// Zero-based id, dense per page
    pub tile_id: usize,
    /// Left edge in page pixels
    pub x_offset: u32,
    /// Top edge in page pixels
    pub y_offset: u32,
    /// Cropped pixels (smaller than the tile size at the right/bottom edges)
    pub image: RgbImage,
}

impl Tile {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Distance between consecutive tile origins
pub fn stride(tile_size: u32, overlap: u32) -> Result<u32, ConfigurationError> {
    if tile_size == 0 {
        return Err(ConfigurationError::ZeroTileSize);
    }
    if overlap >= tile_size {
        return Err(ConfigurationError::NonPositiveStride { tile_size, overlap });
    }
    Ok(tile_size - overlap)
}

/// Cut `image` into `tile_size` square tiles stepping by `tile_size - overlap`.
///
/// Rows are scanned top to bottom, columns left to right. Tiles running past the
/// right or bottom edge are clipped, not padded. Zero-area crops are skipped.
pub fn crop_tiles(
    image: &RgbImage,
    tile_size: u32,
    overlap: u32,
) -> Result<Vec<Tile>, ConfigurationError> {
    let stride = stride(tile_size, overlap)?;
    let (width, height) = image.dimensions();

    let mut tiles = Vec::new();
    let mut tile_id = 0;

    for y in (0..height).step_by(stride as usize) {
        for x in (0..width).step_by(stride as usize) {
            let tile_w = tile_size.min(width - x);
            let tile_h = tile_size.min(height - y);
            if tile_w == 0 || tile_h == 0 {
                continue;
            }

            tiles.push(Tile {
                tile_id,
                x_offset: x,
                y_offset: y,
                image: imageops::crop_imm(image, x, y, tile_w, tile_h).to_image(),
            });
            tile_id += 1;
        }
    }

    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    }

    #[test]
    fn test_large_page_scenario() {
        let tiles = crop_tiles(&blank(2000, 2000), 1000, 250).unwrap();
        assert_eq!(tiles.len(), 9);

        let offsets: Vec<(u32, u32)> = tiles.iter().map(|t| (t.x_offset, t.y_offset)).collect();
        assert_eq!(
            offsets,
            vec![
                (0, 0),
                (750, 0),
                (1500, 0),
                (0, 750),
                (750, 750),
                (1500, 750),
                (0, 1500),
                (750, 1500),
                (1500, 1500),
            ]
        );

        // Last column and row are clipped to the page
        assert_eq!((tiles[0].width(), tiles[0].height()), (1000, 1000));
        assert_eq!((tiles[2].width(), tiles[2].height()), (500, 1000));
        assert_eq!((tiles[8].width(), tiles[8].height()), (500, 500));
    }

    #[test]
    fn test_tile_ids_are_dense_in_scan_order() {
        let tiles = crop_tiles(&blank(1700, 900), 600, 100).unwrap();
        for (expected, tile) in tiles.iter().enumerate() {
            assert_eq!(tile.tile_id, expected);
        }
        // Row-major: y never decreases, x increases within a row
        for pair in tiles.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let same_row = b.y_offset == a.y_offset;
            assert!(b.y_offset > a.y_offset || (same_row && b.x_offset > a.x_offset));
        }
    }

    #[test]
    fn test_tiling_is_deterministic() {
        let image = blank(1234, 987);
        let first = crop_tiles(&image, 400, 50).unwrap();
        let second = crop_tiles(&image, 400, 50).unwrap();

        let layout = |tiles: &[Tile]| -> Vec<(usize, u32, u32, u32, u32)> {
            tiles
                .iter()
                .map(|t| (t.tile_id, t.x_offset, t.y_offset, t.width(), t.height()))
                .collect()
        };
        assert_eq!(layout(&first), layout(&second));
    }

    #[test]
    fn test_tiles_cover_every_pixel() {
        let (width, height) = (523u32, 311u32);
        let tiles = crop_tiles(&blank(width, height), 128, 32).unwrap();

        let mut covered = vec![false; (width * height) as usize];
        for tile in &tiles {
            for y in tile.y_offset..tile.y_offset + tile.height() {
                for x in tile.x_offset..tile.x_offset + tile.width() {
                    covered[(y * width + x) as usize] = true;
                }
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn test_tile_pixels_match_page() {
        let mut image = blank(300, 300);
        image.put_pixel(260, 270, Rgb([10, 20, 30]));

        let tiles = crop_tiles(&image, 200, 50).unwrap();
        let tile = tiles
            .iter()
            .find(|t| t.x_offset == 150 && t.y_offset == 150)
            .unwrap();
        assert_eq!(tile.image.get_pixel(110, 120), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_image_smaller_than_tile() {
        let tiles = crop_tiles(&blank(300, 200), 1000, 250).unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!((tiles[0].width(), tiles[0].height()), (300, 200));
    }

    #[test]
    fn test_empty_image_has_no_tiles() {
        let tiles = crop_tiles(&RgbImage::new(0, 0), 1000, 250).unwrap();
        assert!(tiles.is_empty());
    }

    #[test]
    fn test_rejects_non_positive_stride() {
        let err = crop_tiles(&blank(100, 100), 250, 250).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::NonPositiveStride { tile_size: 250, overlap: 250 }
        );
        assert!(crop_tiles(&blank(100, 100), 250, 400).is_err());
        assert_eq!(
            crop_tiles(&blank(100, 100), 0, 0).unwrap_err(),
            ConfigurationError::ZeroTileSize
        );
    }
}
