//! Decision annotation
//!
//! Draws the reported candidate box onto the checked image: green when access
//! was granted, red when denied.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::decision::DecisionRecord;
use crate::vision::PixelBox;

pub const GRANTED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const DENIED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Copy of `image` with the record's annotation box drawn on it.
///
/// Records without a box (failures, no detection) return the image unchanged.
pub fn render_annotation(image: &DynamicImage, record: &DecisionRecord, thickness: u32) -> RgbImage {
    let mut canvas = image.to_rgb8();

    if let Some(b) = record.annotation_box {
        let color = if record.matched { GRANTED_COLOR } else { DENIED_COLOR };
        draw_box(&mut canvas, b, color, thickness);
    }

    canvas
}

/// Draw a hollow box `thickness` pixels wide, centered on the box edges
pub fn draw_box(canvas: &mut RgbImage, b: PixelBox, color: Rgb<u8>, thickness: u32) {
    let thickness = thickness.max(1) as i32;
    let half = thickness / 2;

    for offset in -half..(thickness - half) {
        let x = b.x_min as i32 - offset;
        let y = b.y_min as i32 - offset;
        let w = b.width() as i32 + 2 * offset;
        let h = b.height() as i32 + 2 * offset;

        if w <= 0 || h <= 0 {
            continue;
        }

        draw_hollow_rect_mut(canvas, Rect::at(x, y).of_size(w as u32, h as u32), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plates::normalize;

    fn blank() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(100, 60))
    }

    #[test]
    fn test_granted_box_is_green() {
        let key = normalize("ABC123");
        let record = DecisionRecord::granted(key.clone(), &key, 0.9, 1.0, PixelBox::new(20, 10, 80, 50), None);
        let out = render_annotation(&blank(), &record, 1);

        assert_eq!(*out.get_pixel(20, 10), GRANTED_COLOR);
        assert_eq!(*out.get_pixel(50, 10), GRANTED_COLOR);
        assert_eq!(*out.get_pixel(50, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_denied_box_is_red() {
        let record = DecisionRecord::denied(&normalize("XYZ9"), 0.5, PixelBox::new(20, 10, 80, 50));
        let out = render_annotation(&blank(), &record, 1);
        assert_eq!(*out.get_pixel(20, 30), DENIED_COLOR);
    }

    #[test]
    fn test_thickness_spans_edge() {
        let record = DecisionRecord::denied(&normalize("XYZ9"), 0.5, PixelBox::new(20, 10, 80, 50));
        let out = render_annotation(&blank(), &record, 5);

        for x in 18..=22 {
            assert_eq!(*out.get_pixel(x, 30), DENIED_COLOR, "x = {}", x);
        }
        assert_eq!(*out.get_pixel(24, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_no_box_leaves_image_untouched() {
        let out = render_annotation(&blank(), &DecisionRecord::no_detection(), 5);
        assert!(out.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_box_at_image_edge() {
        let record = DecisionRecord::denied(&normalize("XYZ9"), 0.5, PixelBox::new(0, 0, 100, 60));
        let out = render_annotation(&blank(), &record, 3);
        assert_eq!(*out.get_pixel(0, 0), DENIED_COLOR);
    }
}
