//! Splits the rectified ballot into one sub-image per candidate row, using
//! the horizontal separator rules printed on the paper.

use image::imageops::crop_imm;
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use log::debug;

use crate::config::{BoundingBox, ExtractionOptions};

/// One candidate row sliced out of the rectified color image.
///
/// `bounds` is in canonical-frame coordinates; rows are contiguous,
/// non-overlapping and ordered top to bottom.
#[derive(Debug, Clone)]
pub struct RowSlice {
    pub bounds: BoundingBox,
    pub image: RgbImage,
}

/// Detects horizontal separator lines in the rectified binary image and
/// slices the rectified color image into candidate rows.
///
/// Rows smaller than the configured minimum are dropped as noise and do not
/// count toward sheet positions. The caller compares the surviving row
/// count against the roster; a mismatch is a data-quality signal, not an
/// error here.
pub fn segment_rows(
    binary: &GrayImage,
    color: &RgbImage,
    options: &ExtractionOptions,
) -> Vec<RowSlice> {
    let height = binary.height();
    let width = binary.width();

    let mut separators = detect_separator_lines(binary, options);
    separators.sort();
    debug!("segment_rows: separator lines at y = {:?}", separators);

    // Virtual boundaries so the first and last rows are bounded too.
    let mut boundaries = Vec::with_capacity(separators.len() + 2);
    boundaries.push(0u32);
    boundaries.extend(separators);
    boundaries.push(height);

    let mut rows: Vec<RowSlice> = Vec::new();
    for pair in boundaries.windows(2) {
        let y1 = pair[0];
        let y2 = pair[1];
        if y2 <= y1 {
            continue;
        }
        if y2 - y1 <= options.min_row_height || width <= options.min_row_width {
            debug!("segment_rows: dropping noise slice {}..{}", y1, y2);
            continue;
        }
        let image = crop_imm(color, 0, y1, width, y2 - y1).to_image();
        rows.push(RowSlice {
            bounds: BoundingBox {
                x1: 0,
                y1,
                x2: width,
                y2,
            },
            image,
        });
    }
    rows
}

/// Isolates long horizontal rules with a wide 1-pixel-tall morphological
/// opening, then returns the top edge of each rule wider than the minimum
/// separator width.
fn detect_separator_lines(binary: &GrayImage, options: &ExtractionOptions) -> Vec<u32> {
    let kernel = options.separator_kernel_width;
    // Two passes, matching an opening with iterations = 2.
    let mut opened = horizontal_erode(binary, kernel);
    opened = horizontal_erode(&opened, kernel);
    opened = horizontal_dilate(&opened, kernel);
    opened = horizontal_dilate(&opened, kernel);

    let contours: Vec<Contour<u32>> = find_contours(&opened);
    let mut lines = Vec::new();
    for contour in contours.iter() {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let (x1, y1, x2, _y2) = points_rect(contour);
        if x2.saturating_sub(x1) > options.min_separator_width {
            lines.push(y1);
        }
    }
    lines
}

fn points_rect(contour: &Contour<u32>) -> (u32, u32, u32, u32) {
    let mut x1 = u32::MAX;
    let mut y1 = u32::MAX;
    let mut x2 = 0u32;
    let mut y2 = 0u32;
    for p in contour.points.iter() {
        x1 = x1.min(p.x);
        y1 = y1.min(p.y);
        x2 = x2.max(p.x);
        y2 = y2.max(p.y);
    }
    (x1, y1, x2, y2)
}

// imageproc's morphology only offers square structuring elements, so the
// wide 1-pixel-tall kernel is applied as explicit row passes.

fn horizontal_erode(image: &GrayImage, kernel_width: u32) -> GrayImage {
    horizontal_pass(image, kernel_width, |acc, v| acc.min(v), 255)
}

fn horizontal_dilate(image: &GrayImage, kernel_width: u32) -> GrayImage {
    horizontal_pass(image, kernel_width, |acc, v| acc.max(v), 0)
}

fn horizontal_pass(
    image: &GrayImage,
    kernel_width: u32,
    fold: impl Fn(u8, u8) -> u8,
    init: u8,
) -> GrayImage {
    let (width, height) = image.dimensions();
    let left = (kernel_width.saturating_sub(1) / 2) as i64;
    let right = (kernel_width / 2) as i64;
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = init;
            for dx in -left..=right {
                let sx = x as i64 + dx;
                // Pixels outside the image count as background.
                let v = if sx < 0 || sx >= width as i64 {
                    0
                } else {
                    image.get_pixel(sx as u32, y)[0]
                };
                acc = fold(acc, v);
            }
            out.put_pixel(x, y, Luma([acc]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn ruled_binary(line_ys: &[u32]) -> GrayImage {
        let mut img = GrayImage::new(480, 640);
        for &y in line_ys {
            draw_filled_rect_mut(
                &mut img,
                Rect::at(20, y as i32).of_size(420, 3),
                Luma([255u8]),
            );
        }
        img
    }

    #[test]
    fn slices_rows_between_separators() {
        let binary = ruled_binary(&[200, 400]);
        let color = RgbImage::from_pixel(480, 640, Rgb([255u8, 255, 255]));
        let rows = segment_rows(&binary, &color, &ExtractionOptions::DEFAULT);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].bounds.y1, 0);
        assert_eq!(rows[0].bounds.y2, 200);
        assert_eq!(rows[1].bounds.y1, 200);
        assert_eq!(rows[1].bounds.y2, 400);
        assert_eq!(rows[2].bounds.y2, 640);
        assert_eq!(rows[0].image.dimensions(), (480, 200));
    }

    #[test]
    fn short_strokes_are_not_separators() {
        let mut binary = ruled_binary(&[300]);
        // A 100px stroke: long enough to survive the opening, too short for
        // the separator width filter.
        draw_filled_rect_mut(&mut binary, Rect::at(50, 100).of_size(100, 3), Luma([255u8]));
        let color = RgbImage::from_pixel(480, 640, Rgb([255u8, 255, 255]));
        let rows = segment_rows(&binary, &color, &ExtractionOptions::DEFAULT);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn thin_slices_are_dropped() {
        // Two separators 20px apart leave a sliver that must not count.
        let binary = ruled_binary(&[300, 320]);
        let color = RgbImage::from_pixel(480, 640, Rgb([255u8, 255, 255]));
        let rows = segment_rows(&binary, &color, &ExtractionOptions::DEFAULT);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].bounds.y2, 300);
        assert_eq!(rows[1].bounds.y1, 320);
    }

    #[test]
    fn segmentation_is_idempotent() {
        let binary = ruled_binary(&[150, 330, 500]);
        let color = RgbImage::from_pixel(480, 640, Rgb([255u8, 255, 255]));
        let a = segment_rows(&binary, &color, &ExtractionOptions::DEFAULT);
        let b = segment_rows(&binary, &color, &ExtractionOptions::DEFAULT);
        assert_eq!(a.len(), b.len());
        for (ra, rb) in a.iter().zip(b.iter()) {
            assert_eq!(ra.bounds, rb.bounds);
        }
    }
}
