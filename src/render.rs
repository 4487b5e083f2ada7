//! Debug visualization of merged detections

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::vision::detection::WordDetection;

/// Copy of `page` with every detection box outlined.
///
/// Only outlines are drawn; the recognized `value` is not rendered as a label,
/// since that needs a font. Read the text from the page's JSON table instead.
///
/// Boxes are page-normalized; outlines are drawn `thickness` pixels wide,
/// growing inward. Boxes that collapse to nothing after rounding are skipped.
pub fn draw_boxes(
    page: &RgbImage,
    detections: &[WordDetection],
    color: Rgb<u8>,
    thickness: u32,
) -> RgbImage {
    let mut canvas = page.clone();
    let (width, height) = (page.width() as f64, page.height() as f64);

    for det in detections {
        let bbox = det.bbox();
        let x1 = (bbox.x1 * width).round().max(0.0) as i32;
        let y1 = (bbox.y1 * height).round().max(0.0) as i32;
        let x2 = (bbox.x2 * width).round().min(width) as i32;
        let y2 = (bbox.y2 * height).round().min(height) as i32;

        for inset in 0..thickness.max(1) as i32 {
            let w = x2 - x1 - 2 * inset;
            let h = y2 - y1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    canvas
}
