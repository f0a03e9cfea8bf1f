// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Skew estimation and correction for pages that were not rectified, based
// on the dominant angle of near-horizontal Hough lines.

use flatscan_core::config::ScanConfig;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use tracing::{debug, info, instrument};

use crate::image::processor::ImageProcessor;
use crate::raster::Raster;

/// Skews smaller than this are left alone.
const MIN_SKEW_DEGREES: f32 = 0.5;
/// Lines tilted further than this are not treated as text lines.
const MAX_SKEW_DEGREES: f32 = 15.0;
/// Votes a line needs, relative to the image width.
const LINE_VOTE_RATIO: f32 = 0.25;
const MIN_LINE_VOTES: u32 = 40;
const SUPPRESSION_RADIUS: u32 = 8;

/// Estimate how far the content is rotated clockwise, in degrees.
///
/// Returns `None` when no near-horizontal line is strong enough to vote.
#[instrument(skip(image, config), fields(width = image.width(), height = image.height()))]
pub fn estimate_skew(image: &Raster, config: &ScanConfig) -> Option<f32> {
    let gray = image.to_gray();
    let blurred = gaussian_blur_f32(&gray, config.gaussian_sigma());
    let edges = canny(&blurred, config.canny_low, config.canny_high);

    let vote_threshold = ((image.width() as f32 * LINE_VOTE_RATIO) as u32).max(MIN_LINE_VOTES);
    let lines = detect_lines(
        &edges,
        LineDetectionOptions {
            vote_threshold,
            suppression_radius: SUPPRESSION_RADIUS,
        },
    );

    let mut skews = near_horizontal_skews(&lines);
    debug!(
        line_count = lines.len(),
        horizontal = skews.len(),
        vote_threshold,
        "Hough lines detected"
    );
    median(&mut skews)
}

/// Rotate `image` upright.
///
/// An explicit `deskew_angle` always wins. Otherwise, when `auto_rotate` is
/// on and the page was not already rectified, the estimated skew is undone
/// if it lies between 0.5 and 15 degrees. Uncovered canvas is filled white
/// and the dimensions are kept.
#[instrument(skip(image, config))]
pub fn deskew(image: Raster, config: &ScanConfig, rectified: bool) -> Raster {
    let correction = if config.deskew_angle != 0.0 {
        config.deskew_angle
    } else if config.auto_rotate && !rectified {
        match estimate_skew(&image, config) {
            Some(skew) if (MIN_SKEW_DEGREES..=MAX_SKEW_DEGREES).contains(&skew.abs()) => -skew,
            Some(skew) => {
                debug!(skew, "Skew outside correction range; leaving as is");
                return image;
            }
            None => return image,
        }
    } else {
        return image;
    };

    info!(correction, "Deskewing");
    ImageProcessor::from_raster(image).rotate(correction).into_raster()
}

/// Tilt of every roughly horizontal line. A Hough angle of 90 degrees is a
/// level line; larger angles descend to the right, i.e. clockwise skew.
fn near_horizontal_skews(lines: &[PolarLine]) -> Vec<f32> {
    lines
        .iter()
        .map(|line| line.angle_in_degrees as f32 - 90.0)
        .filter(|skew| skew.abs() <= MAX_SKEW_DEGREES)
        .collect()
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}
