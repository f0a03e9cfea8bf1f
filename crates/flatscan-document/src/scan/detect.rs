// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Corner detection — find the outline of a paper document in a photograph
// and reduce it to four ordered corners.

use flatscan_core::config::{EdgePolicy, ScanConfig};
use flatscan_core::error::Result;
use flatscan_core::types::{Detection, Point, Quad};
use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use tracing::{debug, info, instrument, warn};

use crate::geometry::{
    approximate_polygon, arc_length, min_area_rect, order_points, shoelace_area,
};
use crate::raster::Raster;

/// Neighbourhood radius of the adaptive threshold (11x11 window).
const THRESHOLD_RADIUS: u32 = 5;
/// A pixel is foreground when it is this much darker than its local mean.
const THRESHOLD_OFFSET: f64 = 2.0;
/// Douglas-Peucker tolerance as a fraction of the outline perimeter.
const APPROX_EPSILON_RATIO: f64 = 0.02;

/// Locate the document quadrilateral in `image`.
///
/// ## Pipeline
///
/// 1. Convert to grayscale
/// 2. Gaussian blur (sigma derived from `gaussian_kernel`)
/// 3. Binary edge map according to `edge_policy`
/// 4. Dilate (3x3 once, 5x5 twice) to close gaps in the outline
/// 5. Collect outer contours and drop those smaller than
///    `min_contour_area_ratio` of the frame
/// 6. Simplify the largest contour; four vertices are taken as the corners,
///    anything else is replaced by its minimum-area bounding rectangle
/// 7. Clamp the corners into the frame and order them TL, TR, BR, BL
///
/// Never fails: anything that prevents a confident answer, including an
/// internal error, is reported as [`Detection::NotFound`].
#[instrument(skip(image, config), fields(width = image.width(), height = image.height()))]
pub fn detect(image: &Raster, config: &ScanConfig) -> Detection {
    match find_outline(image, config) {
        Ok(Some(quad)) => {
            info!(
                top_left = ?quad.top_left(),
                top_right = ?quad.top_right(),
                bottom_right = ?quad.bottom_right(),
                bottom_left = ?quad.bottom_left(),
                "Document corners found"
            );
            Detection::Found(quad)
        }
        Ok(None) => {
            debug!("No document outline found");
            Detection::NotFound
        }
        Err(err) => {
            warn!(%err, "Corner detection failed; treating as not found");
            Detection::NotFound
        }
    }
}

fn find_outline(image: &Raster, config: &ScanConfig) -> Result<Option<Quad>> {
    config.validate()?;
    image.ensure_non_empty()?;
    let (width, height) = image.dimensions();

    let gray = image.to_gray();
    let blurred = gaussian_blur_f32(&gray, config.gaussian_sigma());
    let edges = edge_map(&blurred, config);
    let closed = close_gaps(&edges);

    let min_area = config.min_contour_area_ratio * f64::from(width) * f64::from(height);
    let Some(outline) = largest_outline(&closed, min_area) else {
        return Ok(None);
    };

    let epsilon = APPROX_EPSILON_RATIO * arc_length(&outline);
    let approx = approximate_polygon(&outline, epsilon);
    debug!(
        outline_points = outline.len(),
        approx_vertices = approx.len(),
        "Outline simplified"
    );

    let corners = if approx.len() == 4 {
        approx
    } else {
        match min_area_rect(&outline) {
            Some(rect) => rect.to_vec(),
            None => return Ok(None),
        }
    };

    let clamped: Vec<Point> = corners
        .into_iter()
        .map(|p| clamp_to_frame(p, width, height))
        .collect();
    order_points(&clamped).map(Some)
}

// -- Edge maps ----------------------------------------------------------------

fn edge_map(blurred: &GrayImage, config: &ScanConfig) -> GrayImage {
    match config.edge_policy {
        EdgePolicy::Canny => canny(blurred, config.canny_low, config.canny_high),
        EdgePolicy::AdaptiveThreshold => adaptive_threshold(blurred),
        EdgePolicy::Combined => {
            let mut union = canny(blurred, config.canny_low, config.canny_high);
            let threshold = adaptive_threshold(blurred);
            for (edge, mask) in union.pixels_mut().zip(threshold.pixels()) {
                edge.0[0] = edge.0[0].max(mask.0[0]);
            }
            union
        }
    }
}

/// Inverted local-mean threshold: pixels noticeably darker than their
/// neighbourhood become 255, everything else 0.
fn adaptive_threshold(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let integral = integral_image(gray);

    GrayImage::from_fn(width, height, |x, y| {
        let mean = local_mean(&integral, width, height, x, y, THRESHOLD_RADIUS);
        let value = f64::from(gray.get_pixel(x, y).0[0]);
        Luma([if value <= mean - THRESHOLD_OFFSET { 255 } else { 0 }])
    })
}

/// Summed-area table of a grayscale image.
///
/// `table[y * (width + 1) + x]` holds the sum of all pixels in the
/// rectangle `[0, x) x [0, y)`. The table is `(width + 1) x (height + 1)`
/// with a zero first row and column.
fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = gray.dimensions();
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];

    for y in 0..h {
        let mut row_sum: u64 = 0;
        for x in 0..w {
            row_sum += u64::from(gray.get_pixel(x, y).0[0]);
            let idx = (y + 1) as usize * stride + (x + 1) as usize;
            let above = y as usize * stride + (x + 1) as usize;
            table[idx] = row_sum + table[above];
        }
    }

    table
}

/// Mean of the square window of `radius` around (cx, cy), clipped to the
/// image.
fn local_mean(integral: &[u64], width: u32, height: u32, cx: u32, cy: u32, radius: u32) -> f64 {
    let stride = (width + 1) as usize;

    let x1 = cx.saturating_sub(radius) as usize;
    let y1 = cy.saturating_sub(radius) as usize;
    let x2 = ((cx + radius + 1) as usize).min(width as usize);
    let y2 = ((cy + radius + 1) as usize).min(height as usize);

    let area = ((x2 - x1) * (y2 - y1)) as f64;
    let sum = integral[y2 * stride + x2] as f64 - integral[y1 * stride + x2] as f64
        - integral[y2 * stride + x1] as f64
        + integral[y1 * stride + x1] as f64;

    sum / area
}

/// Thicken edges so a broken document border still forms one closed
/// contour.
fn close_gaps(edges: &GrayImage) -> GrayImage {
    let once = dilate(edges, Norm::LInf, 1);
    let twice = dilate(&once, Norm::LInf, 2);
    dilate(&twice, Norm::LInf, 2)
}

// -- Contours -----------------------------------------------------------------

/// The outer contour with the largest enclosed area, if any reaches
/// `min_area`.
fn largest_outline(edges: &GrayImage, min_area: f64) -> Option<Vec<Point>> {
    let contours = find_contours::<i32>(edges);
    debug!(contours = contours.len(), "Contours traced");

    contours
        .into_iter()
        .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
        .map(|c| {
            let points: Vec<Point> = c
                .points
                .iter()
                .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                .collect();
            (shoelace_area(&points), points)
        })
        .filter(|(area, _)| *area >= min_area)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, points)| points)
}

fn clamp_to_frame(point: Point, width: u32, height: u32) -> Point {
    Point::new(
        point.x.clamp(0.0, f64::from(width - 1)),
        point.y.clamp(0.0, f64::from(height - 1)),
    )
}

// -- Tests --------------------------------------------------------------------
