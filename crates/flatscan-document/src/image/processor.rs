// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — size-cap, rotate, and encode rasters. Operates on
// in-memory images using the `image` and `imageproc` crates.

use std::path::Path;

use flatscan_core::error::{Result, ScanError};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Luma, Rgb};
use imageproc::geometric_transformations::{self, Interpolation};
use tracing::{debug, info, instrument};

use crate::raster::Raster;

/// Chainable helper around a single in-memory raster.
///
/// Each transformation consumes `self` and returns a new `ImageProcessor`
/// wrapping the result.
///
/// ```ignore
/// let png = ImageProcessor::from_raster(Raster::load("photo.jpg")?)
///     .fit_within(2000)
///     .rotate(-3.0)
///     .to_png_bytes()?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: Raster,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    pub fn from_raster(image: Raster) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn into_raster(self) -> Raster {
        self.image
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Shrink so the larger side is exactly `max_dimension`, keeping the
    /// aspect ratio. Images already within the bound are returned as is;
    /// nothing is ever upscaled. Uses Lanczos3 filtering.
    #[instrument(skip(self))]
    pub fn fit_within(self, max_dimension: u32) -> Self {
        let (width, height) = self.image.dimensions();
        let larger = width.max(height);
        if larger <= max_dimension || max_dimension == 0 {
            return self;
        }

        let scale = f64::from(max_dimension) / f64::from(larger);
        let shrink = |side: u32| {
            if side == larger {
                max_dimension
            } else {
                ((f64::from(side) * scale).round() as u32).clamp(1, max_dimension)
            }
        };
        let (new_w, new_h) = (shrink(width), shrink(height));
        info!(from_w = width, from_h = height, new_w, new_h, "Downscaling image");

        let image = match self.image {
            Raster::Rgb(img) => {
                Raster::Rgb(imageops::resize(&img, new_w, new_h, FilterType::Lanczos3))
            }
            Raster::Gray(img) => {
                Raster::Gray(imageops::resize(&img, new_w, new_h, FilterType::Lanczos3))
            }
        };
        Self { image }
    }

    /// Rotate clockwise by `degrees`.
    ///
    /// Multiples of 90 degrees are lossless and swap the dimensions as
    /// needed. Any other angle rotates about the centre with bilinear
    /// interpolation, keeps the canvas size, and fills uncovered corners
    /// with white.
    #[instrument(skip(self))]
    pub fn rotate(self, degrees: f32) -> Self {
        let normalised = degrees.rem_euclid(360.0);
        let near = |target: f32| (normalised - target).abs() < 0.01;

        let image = if near(0.0) || near(360.0) {
            return self;
        } else if near(90.0) {
            match self.image {
                Raster::Rgb(img) => Raster::Rgb(imageops::rotate90(&img)),
                Raster::Gray(img) => Raster::Gray(imageops::rotate90(&img)),
            }
        } else if near(180.0) {
            match self.image {
                Raster::Rgb(img) => Raster::Rgb(imageops::rotate180(&img)),
                Raster::Gray(img) => Raster::Gray(imageops::rotate180(&img)),
            }
        } else if near(270.0) {
            match self.image {
                Raster::Rgb(img) => Raster::Rgb(imageops::rotate270(&img)),
                Raster::Gray(img) => Raster::Gray(imageops::rotate270(&img)),
            }
        } else {
            let radians = degrees.to_radians();
            match self.image {
                Raster::Rgb(img) => Raster::Rgb(geometric_transformations::rotate_about_center(
                    &img,
                    radians,
                    Interpolation::Bilinear,
                    Rgb([255, 255, 255]),
                )),
                Raster::Gray(img) => Raster::Gray(geometric_transformations::rotate_about_center(
                    &img,
                    radians,
                    Interpolation::Bilinear,
                    Luma([255]),
                )),
            }
        };

        debug!(degrees, "Rotation applied");
        Self { image }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        self.encode(ImageFormat::Png)
    }

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
        self.image
            .to_dynamic()
            .write_with_encoder(encoder)
            .map_err(|err| ScanError::ImageError(format!("JPEG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Encode into `format`, returning the raw bytes.
    pub fn encode(&self, format: ImageFormat) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image
            .to_dynamic()
            .write_to(&mut cursor, format)
            .map_err(|err| {
                ScanError::ImageError(format!("{:?} encoding failed: {}", format, err))
            })?;
        Ok(buffer)
    }

    /// Write the image to a file. The format is inferred from the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.image.to_dynamic().save(path.as_ref()).map_err(|err| {
            ScanError::ImageError(format!(
                "failed to save image to {}: {}",
                path.as_ref().display(),
                err
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage};

    #[test]
    fn fit_within_caps_larger_side() {
        let img = Raster::Rgb(RgbImage::new(3000, 4000));
        let out = ImageProcessor::from_raster(img).fit_within(2000).into_raster();
        assert_eq!(out.dimensions(), (1500, 2000));
    }

    #[test]
    fn fit_within_never_upscales() {
        let img = Raster::Gray(GrayImage::new(300, 200));
        let out = ImageProcessor::from_raster(img.clone()).fit_within(2000).into_raster();
        assert_eq!(out, img);
    }

    #[test]
    fn fit_within_keeps_thin_images_visible() {
        let img = Raster::Gray(GrayImage::new(5000, 2));
        let out = ImageProcessor::from_raster(img).fit_within(100).into_raster();
        assert_eq!(out.dimensions(), (100, 1));
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let img = Raster::Gray(GrayImage::new(30, 20));
        let out = ImageProcessor::from_raster(img).rotate(90.0).into_raster();
        assert_eq!(out.dimensions(), (20, 30));
    }

    #[test]
    fn small_rotation_keeps_canvas_and_fills_white() {
        let img = Raster::Rgb(RgbImage::from_pixel(40, 40, Rgb([0, 0, 0])));
        let out = ImageProcessor::from_raster(img).rotate(30.0).into_raster();
        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(&out.as_raw()[..3], &[255, 255, 255]);
    }

    #[test]
    fn zero_rotation_is_a_no_op() {
        let img = Raster::Gray(GrayImage::from_fn(8, 6, |x, y| Luma([(x * y) as u8])));
        let out = ImageProcessor::from_raster(img.clone()).rotate(360.0).into_raster();
        assert_eq!(out, img);
    }

    #[test]
    fn png_round_trip_preserves_pixels() {
        let img = Raster::Gray(GrayImage::from_fn(8, 6, |x, y| Luma([(x * 20 + y) as u8])));
        let bytes = ImageProcessor::from_raster(img.clone())
            .to_png_bytes()
            .expect("encode");
        assert_eq!(Raster::from_bytes(&bytes).expect("decode"), img);
    }

    #[test]
    fn jpeg_encoding_produces_jpeg_magic() {
        let img = Raster::Rgb(RgbImage::from_pixel(16, 16, Rgb([120, 60, 30])));
        let bytes = ImageProcessor::from_raster(img).to_jpeg_bytes(90).expect("encode");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
