//! Operator-review annotation: bounding box overlay plus the rectangularity
//! score rendered in the top-left corner.

use image::{GrayImage, Rgb, RgbImage};

use super::contour::BoundingBox;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const BOX_THICKNESS: u32 = 2;
const TEXT_ORIGIN: (u32, u32) = (10, 30);
const TEXT_SCALE: u32 = 2;

/// Expand the masked grayscale image to RGB so overlays can be colored.
pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    let mut rgb = RgbImage::new(gray.width(), gray.height());
    for (x, y, pixel) in gray.enumerate_pixels() {
        let v = pixel.0[0];
        rgb.put_pixel(x, y, Rgb([v, v, v]));
    }
    rgb
}

/// Produce the annotated copy: masked image with bounding box and score.
pub fn annotate(masked: &GrayImage, bbox: &BoundingBox, rectangularity: f64) -> RgbImage {
    let mut img = gray_to_rgb(masked);
    draw_rectangle(&mut img, bbox);
    draw_text(
        &mut img,
        TEXT_ORIGIN.0,
        TEXT_ORIGIN.1,
        &format!("{:.3}", rectangularity),
    );
    img
}

fn draw_rectangle(img: &mut RgbImage, bbox: &BoundingBox) {
    for offset in 0..BOX_THICKNESS {
        let top = bbox.min_row.saturating_sub(offset);
        let bottom = bbox.max_row + offset;
        let left = bbox.min_col.saturating_sub(offset);
        let right = bbox.max_col + offset;

        for col in left..=right {
            put_pixel_checked(img, col, top, BOX_COLOR);
            put_pixel_checked(img, col, bottom, BOX_COLOR);
        }
        for row in top..=bottom {
            put_pixel_checked(img, left, row, BOX_COLOR);
            put_pixel_checked(img, right, row, BOX_COLOR);
        }
    }
}

fn put_pixel_checked(img: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < img.width() && y < img.height() {
        img.put_pixel(x, y, color);
    }
}

/// 5x7 bitmap glyphs; each row is the low 5 bits of the byte.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x0E, 0x00, 0x00, 0x00],
        _ => return None,
    };
    Some(rows)
}

fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str) {
    let mut cursor = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row_idx, bits) in rows.iter().enumerate() {
                for col_idx in 0..5u32 {
                    if bits & (0x10 >> col_idx) != 0 {
                        for dy in 0..TEXT_SCALE {
                            for dx in 0..TEXT_SCALE {
                                put_pixel_checked(
                                    img,
                                    cursor + col_idx * TEXT_SCALE + dx,
                                    y + row_idx as u32 * TEXT_SCALE + dy,
                                    TEXT_COLOR,
                                );
                            }
                        }
                    }
                }
            }
        }
        cursor += 6 * TEXT_SCALE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotate_draws_box_edges() {
        let masked = GrayImage::new(120, 100);
        let bbox = BoundingBox { min_row: 50, min_col: 60, max_row: 80, max_col: 100 };
        let annotated = annotate(&masked, &bbox, 0.85);

        assert_eq!(*annotated.get_pixel(60, 50), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(100, 80), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(80, 50), BOX_COLOR);
        // Interior untouched.
        assert_eq!(*annotated.get_pixel(80, 65), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_renders_score_pixels() {
        let masked = GrayImage::new(200, 100);
        let bbox = BoundingBox { min_row: 60, min_col: 0, max_row: 90, max_col: 40 };
        let annotated = annotate(&masked, &bbox, 0.853);

        let text_pixels = annotated
            .enumerate_pixels()
            .filter(|(_, _, p)| **p == TEXT_COLOR)
            .count();
        assert!(text_pixels > 0, "score text should be drawn");
    }

    #[test]
    fn test_box_clipped_at_image_edge() {
        let masked = GrayImage::new(10, 10);
        let bbox = BoundingBox { min_row: 0, min_col: 0, max_row: 9, max_col: 9 };
        // Must not panic when the 2px outline would leave the image.
        let _ = annotate(&masked, &bbox, 1.0);
    }
}
