// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// flatscan-document — Document scanning for Flatscan.
//
// Finds the paper in a photograph, flattens its perspective, and runs the
// enhancement chain (denoise, color balance, tone, CLAHE, shadow
// suppression, monochrome, edge/detail boost) to produce a clean page image.

pub mod geometry;
pub mod image;
pub mod raster;
pub mod scan;

// Re-export the primary entry points so callers can use `flatscan_document::process` etc.
pub use crate::image::processor::ImageProcessor;
pub use geometry::{Homography, compute_homography, order_points, target_dimensions};
pub use raster::{Labeled, Raster};
pub use scan::enhance::ScanEnhancer;
pub use scan::{
    ENHANCED_LABEL, ORIGINAL_LABEL, auto_process_file, auto_process_files, deskew, detect,
    enhance, estimate_skew, prepare, process, process_batch, rectify,
};
