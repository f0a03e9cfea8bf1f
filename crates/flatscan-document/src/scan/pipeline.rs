// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestration — size cap, optional detect + rectify, deskew, and
// enhancement, plus in-place file processing and parallel batches.

use std::io::Write;
use std::path::{Path, PathBuf};

use flatscan_core::config::ScanConfig;
use flatscan_core::error::{Result, ScanError};
use flatscan_core::types::Detection;
use image::ImageFormat;
use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::image::processor::ImageProcessor;
use crate::raster::{Labeled, Raster};
use crate::scan::deskew::deskew;
use crate::scan::detect::detect;
use crate::scan::enhance::enhance;
use crate::scan::rectify::rectify;

/// Label of the processed image in [`process`] output.
pub const ENHANCED_LABEL: &str = "Enhanced";
/// Label of the untouched input in [`process`] output.
pub const ORIGINAL_LABEL: &str = "Original";

/// Process one image.
///
/// Returns `[("Enhanced", ..), ("Original", ..)]`, where the original is
/// `image` exactly as supplied (before any downscaling).
#[instrument(skip(image, config), fields(width = image.width(), height = image.height()))]
pub fn process(image: &Raster, config: &ScanConfig, auto_crop: bool) -> Result<Vec<Labeled>> {
    let prepared = prepare(image, config, auto_crop)?;
    let enhanced = enhance(&prepared, config)?;
    info!(
        out_w = enhanced.width(),
        out_h = enhanced.height(),
        "Image processed"
    );

    Ok(vec![
        Labeled::new(ENHANCED_LABEL, enhanced),
        Labeled::new(ORIGINAL_LABEL, image.clone()),
    ])
}

/// Everything before enhancement: validate, cap the size, optionally crop
/// to the detected document, then deskew.
///
/// A missing or unusable outline is not an error; the full frame is kept.
pub fn prepare(image: &Raster, config: &ScanConfig, auto_crop: bool) -> Result<Raster> {
    config.validate()?;
    image.ensure_non_empty()?;

    let working = ImageProcessor::from_raster(image.clone())
        .fit_within(config.max_dimension)
        .into_raster();

    let (working, rectified) = if auto_crop {
        crop_to_document(working, config)?
    } else {
        (working, false)
    };

    Ok(deskew(working, config, rectified))
}

/// Detect and rectify, falling back to `image` when nothing usable is found.
/// The flag reports whether rectification happened.
fn crop_to_document(image: Raster, config: &ScanConfig) -> Result<(Raster, bool)> {
    let quad = match detect(&image, config) {
        Detection::Found(quad) => quad,
        Detection::NotFound => {
            warn!("No document outline detected; continuing with the full frame");
            return Ok((image, false));
        }
    };

    match rectify(&image, &quad, config.border_fill) {
        Ok(flat) => Ok((flat, true)),
        Err(err) if err.is_geometric() => {
            warn!(%err, "Rectification failed; continuing with the full frame");
            Ok((image, false))
        }
        Err(err) => Err(err),
    }
}

// -- Auto mode ----------------------------------------------------------------

/// Load `path`, run the pipeline with auto-crop, and replace the file with
/// the enhanced image in its original format.
///
/// The result is written to a temporary file in the same directory and then
/// renamed over the original, so the file is never left half-written. The
/// temporary is removed on every failure path.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn auto_process_file(path: impl AsRef<Path>, config: &ScanConfig) -> Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path).map_err(|err| {
        ScanError::ImageError(format!(
            "cannot determine image format of {}: {}",
            path.display(),
            err
        ))
    })?;

    let image = Raster::load(path)?;
    let prepared = prepare(&image, config, true)?;
    let enhanced = enhance(&prepared, config)?;
    let encoded = ImageProcessor::from_raster(enhanced).encode(format)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".flatscan-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(&encoded)?;
    temp.as_file().sync_all()?;
    debug!(temp = %temp.path().display(), bytes = encoded.len(), "Encoded result staged");

    temp.persist(path).map_err(|err| ScanError::Io(err.error))?;
    info!(bytes = encoded.len(), "Image rewritten in place");
    Ok(())
}

// -- Batches ------------------------------------------------------------------

/// [`process`] every image in parallel. Results keep the input order and a
/// failure affects only its own entry.
#[instrument(skip_all, fields(count = images.len(), auto_crop = auto_crop))]
pub fn process_batch(
    images: &[Raster],
    config: &ScanConfig,
    auto_crop: bool,
) -> Vec<Result<Vec<Labeled>>> {
    let results: Vec<_> = images
        .par_iter()
        .map(|image| process(image, config, auto_crop))
        .collect();
    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(failed, "Batch complete");
    results
}

/// [`auto_process_file`] every path in parallel, pairing each path with its
/// outcome.
#[instrument(skip_all, fields(count = paths.len()))]
pub fn auto_process_files<P>(paths: &[P], config: &ScanConfig) -> Vec<(PathBuf, Result<()>)>
where
    P: AsRef<Path> + Sync,
{
    paths
        .par_iter()
        .map(|path| {
            let path = path.as_ref();
            let outcome = auto_process_file(path, config);
            if let Err(err) = &outcome {
                warn!(path = %path.display(), %err, "Auto processing failed");
            }
            (path.to_path_buf(), outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn fast_config() -> ScanConfig {
        ScanConfig {
            noise_reduction: false,
            ..Default::default()
        }
    }

    fn page_on_desk() -> Raster {
        Raster::Rgb(RgbImage::from_fn(240, 200, |x, y| {
            if (50..190).contains(&x) && (40..170).contains(&y) {
                Rgb([235, 232, 225])
            } else {
                Rgb([45, 40, 38])
            }
        }))
    }

    #[test]
    fn labels_enhanced_then_original() {
        let input = page_on_desk();
        let out = process(&input, &fast_config(), false).expect("process");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label, ENHANCED_LABEL);
        assert_eq!(out[1].label, ORIGINAL_LABEL);
        assert_eq!(out[1].image, input);
    }

    #[test]
    fn auto_crop_shrinks_to_page() {
        let out = process(&page_on_desk(), &fast_config(), true).expect("process");
        let (w, h) = out[0].image.dimensions();
        assert!(w < 240 && h < 200, "expected a crop, got {w}x{h}");
        assert!(w >= 130 && h >= 120, "crop too tight: {w}x{h}");
    }

    #[test]
    fn no_document_keeps_frame_size() {
        let blank = Raster::Gray(GrayImage::from_pixel(90, 70, Luma([180])));
        let out = process(&blank, &fast_config(), true).expect("process");
        assert_eq!(out[0].image.dimensions(), (90, 70));
    }

    #[test]
    fn original_is_pre_downscale() {
        let input = Raster::Gray(GrayImage::from_pixel(400, 100, Luma([128])));
        let config = ScanConfig {
            max_dimension: 100,
            ..fast_config()
        };
        let out = process(&input, &config, false).expect("process");
        assert_eq!(out[0].image.dimensions(), (100, 25));
        assert_eq!(out[1].image.dimensions(), (400, 100));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ScanConfig {
            gamma: 0.0,
            ..Default::default()
        };
        let err = process(&page_on_desk(), &config, true).unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(_)));
    }

    #[test]
    fn empty_image_is_rejected() {
        let err = process(&Raster::Gray(GrayImage::new(0, 3)), &fast_config(), false).unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(_)));
    }

    #[test]
    fn batch_keeps_order_and_isolates_failures() {
        let images = vec![
            page_on_desk(),
            Raster::Gray(GrayImage::new(0, 0)),
            Raster::Gray(GrayImage::from_pixel(30, 20, Luma([90]))),
        ];
        let results = process_batch(&images, &fast_config(), false);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        let third = results[2].as_ref().expect("third image");
        assert_eq!(third[0].image.dimensions(), (30, 20));
    }

    #[test]
    fn auto_mode_rejects_unknown_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.unknown");
        std::fs::write(&path, b"data").expect("write");
        let err = auto_process_file(&path, &fast_config()).unwrap_err();
        assert!(matches!(err, ScanError::ImageError(_)));
        assert_eq!(std::fs::read(&path).expect("read"), b"data");
    }
}
