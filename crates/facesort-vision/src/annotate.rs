//! Burns face boxes and identity labels into a copy of a photo.

use crate::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use facesort_core::{Annotator, BoundingBox, QueryFace};
use image::{Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: u32 = 2;
/// Gap between the label baseline and the top edge of the box.
const LABEL_GAP: i64 = 6;

/// Draws yellow rectangles and green labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxAnnotator {
    /// Fixed glyph scale. `None` scales with the photo.
    pub text_scale: Option<u32>,
}

impl BoxAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    fn scale_for(&self, image: &RgbImage) -> u32 {
        self.text_scale
            .unwrap_or_else(|| (image.width().min(image.height()) / 300).clamp(2, 8))
            .max(1)
    }

    /// Draw one box outline, clipped to the image.
    pub fn draw_box(&self, image: &mut RgbImage, region: &BoundingBox) {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        let max_x = i64::from(w) - 1;
        let max_y = i64::from(h) - 1;
        let x1 = (region.x.round() as i64).clamp(0, max_x);
        let y1 = (region.y.round() as i64).clamp(0, max_y);
        let x2 = ((region.x + region.width).round() as i64).clamp(0, max_x);
        let y2 = ((region.y + region.height).round() as i64).clamp(0, max_y);
        let t = i64::from(BOX_THICKNESS);

        for y in y1..=y2 {
            for x in x1..=x2 {
                let on_edge = x < x1 + t || x > x2 - t || y < y1 + t || y > y2 - t;
                if on_edge {
                    image.put_pixel(x as u32, y as u32, BOX_COLOR);
                }
            }
        }
    }

    /// Draw `label` just above `region`, kept inside the image.
    pub fn draw_label(&self, image: &mut RgbImage, region: &BoundingBox, label: &str) {
        let scale = self.scale_for(image);
        let text_h = i64::from(GLYPH_HEIGHT * scale);
        let left = (region.x.round() as i64 - 1).max(0);
        let top = (region.y.round() as i64 - LABEL_GAP - text_h).max(0);
        draw_text(image, left, top, label, scale, LABEL_COLOR);
    }
}

/// Render `text` with its top-left corner at (`left`, `top`); pixels outside
/// the image are dropped.
pub fn draw_text(image: &mut RgbImage, left: i64, top: i64, text: &str, scale: u32, color: Rgb<u8>) {
    let (w, h) = (i64::from(image.width()), i64::from(image.height()));
    let advance = i64::from((GLYPH_WIDTH + 1) * scale);
    let s = i64::from(scale);

    for (i, c) in text.chars().enumerate() {
        let origin_x = left + i as i64 * advance;
        if origin_x >= w {
            break;
        }
        for row in 0..GLYPH_HEIGHT {
            for col in 0..GLYPH_WIDTH {
                if !font::is_set(c, col, row) {
                    continue;
                }
                for dy in 0..s {
                    for dx in 0..s {
                        let x = origin_x + i64::from(col) * s + dx;
                        let y = top + i64::from(row) * s + dy;
                        if (0..w).contains(&x) && (0..h).contains(&y) {
                            image.put_pixel(x as u32, y as u32, color);
                        }
                    }
                }
            }
        }
    }
}

impl Annotator<RgbImage> for BoxAnnotator {
    fn draw_overlay(&self, image: &RgbImage, faces: &[&QueryFace], labels: &[&str]) -> RgbImage {
        let mut out = image.clone();
        for (i, face) in faces.iter().enumerate() {
            self.draw_box(&mut out, &face.region);
            if let Some(label) = labels.get(i) {
                self.draw_label(&mut out, &face.region, label);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facesort_core::Embedding;

    fn region(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
            landmarks: None,
        }
    }

    fn count(image: &RgbImage, color: Rgb<u8>) -> usize {
        image.pixels().filter(|p| **p == color).count()
    }

    #[test]
    fn test_box_outline_only() {
        let mut image = RgbImage::new(100, 100);
        BoxAnnotator::new().draw_box(&mut image, &region(20.0, 30.0, 40.0, 40.0));
        assert_eq!(*image.get_pixel(20, 30), BOX_COLOR);
        assert_eq!(*image.get_pixel(21, 50), BOX_COLOR);
        assert_eq!(*image.get_pixel(60, 70), BOX_COLOR);
        assert_eq!(*image.get_pixel(40, 50), Rgb([0, 0, 0]), "interior untouched");
        assert_eq!(*image.get_pixel(22, 50), Rgb([0, 0, 0]), "two pixels thick");
    }

    #[test]
    fn test_box_clipped_to_image() {
        let mut image = RgbImage::new(50, 50);
        BoxAnnotator::new().draw_box(&mut image, &region(-20.0, -20.0, 200.0, 200.0));
        assert_eq!(*image.get_pixel(0, 0), BOX_COLOR);
        assert_eq!(*image.get_pixel(49, 49), BOX_COLOR);
        assert_eq!(*image.get_pixel(25, 25), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_label_above_box() {
        let mut image = RgbImage::new(200, 200);
        let annotator = BoxAnnotator { text_scale: Some(2) };
        annotator.draw_label(&mut image, &region(50.0, 100.0, 40.0, 40.0), "A");
        let green: Vec<(u32, u32)> = image
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == LABEL_COLOR)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!green.is_empty());
        assert!(green.iter().all(|&(_, y)| y < 100 - 6 + 1));
        assert!(green.iter().all(|&(x, _)| x >= 49));
    }

    #[test]
    fn test_label_clamped_at_top_edge() {
        let mut image = RgbImage::new(100, 100);
        let annotator = BoxAnnotator { text_scale: Some(2) };
        annotator.draw_label(&mut image, &region(0.0, 0.0, 30.0, 30.0), "BOB");
        assert!(count(&image, LABEL_COLOR) > 0, "label must stay visible");
    }

    #[test]
    fn test_overlay_leaves_input_untouched() {
        let image = RgbImage::new(120, 120);
        let face = QueryFace::new(Embedding::new(vec![1.0, 0.0]), region(30.0, 60.0, 40.0, 40.0));
        let out = BoxAnnotator::new().draw_overlay(&image, &[&face], &["alice"]);
        assert_eq!(count(&image, BOX_COLOR), 0);
        assert!(count(&out, BOX_COLOR) > 0);
        assert!(count(&out, LABEL_COLOR) > 0);
    }

    #[test]
    fn test_missing_label_draws_box_only() {
        let image = RgbImage::new(120, 120);
        let face = QueryFace::new(Embedding::new(vec![1.0, 0.0]), region(30.0, 60.0, 40.0, 40.0));
        let out = BoxAnnotator::new().draw_overlay(&image, &[&face], &[]);
        assert!(count(&out, BOX_COLOR) > 0);
        assert_eq!(count(&out, LABEL_COLOR), 0);
    }

    #[test]
    fn test_zero_sized_image() {
        let mut image = RgbImage::new(0, 0);
        BoxAnnotator::new().draw_box(&mut image, &region(0.0, 0.0, 10.0, 10.0));
        draw_text(&mut image, 0, 0, "X", 2, LABEL_COLOR);
    }
}
