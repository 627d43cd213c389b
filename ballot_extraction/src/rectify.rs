//! Perspective correction of a photographed ballot into the canonical
//! top-down frame.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::morphology::{dilate, erode};
use log::debug;

use crate::config::{ExtractionErrors, ExtractionOptions};

/// The two views of a rectified ballot: the color image handed to the
/// symbol locator, and the binary edge image handed to the row segmenter.
#[derive(Debug, Clone)]
pub struct RectifiedBallot {
    pub color: RgbImage,
    pub binary: GrayImage,
}

/// Rectifies a raw ballot photograph into the canonical frame.
///
/// The input may be any size or orientation. The photograph is resized to
/// the working resolution, edge-detected, and morphologically closed so the
/// ballot's outer border forms one contour; the largest enclosed area is
/// taken as the paper boundary and warped onto the full canonical frame.
///
/// Fails with [`ExtractionErrors::NoBallotBoundary`] when no contour is
/// found at all. This is fatal for the image and is not retried.
pub fn rectify(
    image: &RgbImage,
    options: &ExtractionOptions,
) -> Result<RectifiedBallot, ExtractionErrors> {
    let w = options.canonical_width;
    let h = options.canonical_height;

    let resized = imageops::resize(image, w, h, FilterType::Triangle);
    let gray = imageops::grayscale(&resized);
    let blurred = gaussian_blur_f32(&gray, options.blur_sigma);
    let edges = canny(&blurred, options.canny_low, options.canny_high);
    // Dilate twice, erode once: connects the outer border into a closed
    // contour without losing the separator rules inside the paper.
    let binary = erode(&dilate(&edges, Norm::LInf, 2), Norm::LInf, 1);

    let contours: Vec<Contour<u32>> = find_contours(&binary);
    let boundary =
        largest_outer_contour(&contours).ok_or(ExtractionErrors::NoBallotBoundary)?;
    let (x1, y1, x2, y2) = bounding_rect(boundary);
    debug!(
        "rectify: boundary rect ({}, {}) -> ({}, {}) out of {} contours",
        x1,
        y1,
        x2,
        y2,
        contours.len()
    );
    if x2 <= x1 || y2 <= y1 {
        return Err(ExtractionErrors::DegenerateBoundary);
    }

    let src = [
        (x1 as f32, y1 as f32),
        (x2 as f32, y1 as f32),
        (x1 as f32, y2 as f32),
        (x2 as f32, y2 as f32),
    ];
    let dst = [
        (0.0, 0.0),
        (w as f32, 0.0),
        (0.0, h as f32),
        (w as f32, h as f32),
    ];
    let projection = Projection::from_control_points(src, dst)
        .ok_or(ExtractionErrors::DegenerateBoundary)?;

    let mut color = RgbImage::new(w, h);
    warp_into(
        &resized,
        &projection,
        Interpolation::Bilinear,
        Rgb([255u8, 255, 255]),
        &mut color,
    );
    let mut warped_binary = GrayImage::new(w, h);
    warp_into(
        &binary,
        &projection,
        Interpolation::Nearest,
        Luma([0u8]),
        &mut warped_binary,
    );

    Ok(RectifiedBallot {
        color,
        binary: warped_binary,
    })
}

/// Selects the outer contour enclosing the largest area. Ties keep the
/// first contour in enumeration order, so the choice is deterministic.
fn largest_outer_contour<'a>(contours: &'a [Contour<u32>]) -> Option<&'a Contour<u32>> {
    let mut best: Option<(&Contour<u32>, f64)> = None;
    for contour in contours {
        if contour.border_type != BorderType::Outer {
            continue;
        }
        let area = contour_area(contour);
        match best {
            Some((_, best_area)) if area <= best_area => {}
            _ => best = Some((contour, area)),
        }
    }
    best.map(|(c, _)| c)
}

/// Shoelace area of a closed point chain.
fn contour_area(contour: &Contour<u32>) -> f64 {
    let pts = &contour.points;
    if pts.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0f64;
    for i in 0..pts.len() {
        let p = pts[i];
        let q = pts[(i + 1) % pts.len()];
        acc += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    acc.abs() / 2.0
}

fn bounding_rect(contour: &Contour<u32>) -> (u32, u32, u32, u32) {
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
