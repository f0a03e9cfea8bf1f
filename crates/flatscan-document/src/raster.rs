// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster model — the 8-bit RGB or grayscale buffer every pipeline stage
// consumes and produces.

use flatscan_core::error::{Result, ScanError};
use image::{DynamicImage, GrayImage, RgbImage};
use tracing::{debug, instrument};

use crate::scan::color;

/// An owned 8-bit image, either three-channel RGB or single-channel gray.
///
/// Pipeline stages take `&Raster` and return a fresh `Raster`; nothing
/// mutates a buffer the caller still holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Raster {
    Rgb(RgbImage),
    Gray(GrayImage),
}

impl Raster {
    // -- Construction ---------------------------------------------------------

    /// Convert a decoded image into a raster.
    ///
    /// Alpha channels are dropped. 16-bit and floating-point layouts, and
    /// images with a zero dimension, are rejected as `InvalidInput`.
    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        let raster = match image {
            DynamicImage::ImageLuma8(gray) => Self::Gray(gray),
            DynamicImage::ImageRgb8(rgb) => Self::Rgb(rgb),
            luma_alpha @ DynamicImage::ImageLumaA8(_) => Self::Gray(luma_alpha.to_luma8()),
            rgba @ DynamicImage::ImageRgba8(_) => Self::Rgb(rgba.to_rgb8()),
            other => {
                return Err(ScanError::InvalidInput(format!(
                    "unsupported pixel layout {:?}; expected 8-bit gray or RGB",
                    other.color()
                )));
            }
        };
        raster.ensure_non_empty()?;
        Ok(raster)
    }

    /// Decode a raster from encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(data).map_err(|err| {
            ScanError::ImageError(format!("failed to decode image: {}", err))
        })?;
        Self::from_dynamic(image)
    }

    /// Load a raster from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let image = image::open(path.as_ref()).map_err(|err| {
            ScanError::ImageError(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = image.width(), height = image.height(), "Raster loaded");
        Self::from_dynamic(image)
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        match self {
            Self::Rgb(img) => img.width(),
            Self::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Rgb(img) => img.height(),
            Self::Gray(img) => img.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// Samples per pixel: 3 for RGB, 1 for gray.
    pub fn channels(&self) -> usize {
        match self {
            Self::Rgb(_) => 3,
            Self::Gray(_) => 1,
        }
    }

    pub fn is_gray(&self) -> bool {
        matches!(self, Self::Gray(_))
    }

    /// Raw interleaved samples.
    pub fn as_raw(&self) -> &[u8] {
        match self {
            Self::Rgb(img) => img.as_raw(),
            Self::Gray(img) => img.as_raw(),
        }
    }

    /// Fail with `InvalidInput` if either dimension is zero.
    pub fn ensure_non_empty(&self) -> Result<()> {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidInput(format!(
                "image is empty ({}x{})",
                width, height
            )));
        }
        Ok(())
    }

    // -- Conversion -----------------------------------------------------------

    /// Single-channel luma copy (ITU-R 601 weights for RGB).
    pub fn to_gray(&self) -> GrayImage {
        match self {
            Self::Rgb(img) => color::rgb_to_gray(img),
            Self::Gray(img) => img.clone(),
        }
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        self.clone().into_dynamic()
    }

    pub fn into_dynamic(self) -> DynamicImage {
        match self {
            Self::Rgb(img) => DynamicImage::ImageRgb8(img),
            Self::Gray(img) => DynamicImage::ImageLuma8(img),
        }
    }
}

impl From<RgbImage> for Raster {
    fn from(image: RgbImage) -> Self {
        Self::Rgb(image)
    }
}

impl From<GrayImage> for Raster {
    fn from(image: GrayImage) -> Self {
        Self::Gray(image)
    }
}

/// A named pipeline output, e.g. `("Enhanced", image)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Labeled {
    pub label: String,
    pub image: Raster,
}

impl Labeled {
    pub fn new(label: impl Into<String>, image: Raster) -> Self {
        Self {
            label: label.into(),
            image,
        }
    }
}
