// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Color-space and sample helpers shared by the enhancement stages:
// clamp-then-convert, ITU-R 601 luma, channel split/merge, and an
// 8-bit-luminance CIE L*a*b* round trip.

use std::sync::OnceLock;

use flatscan_core::error::{Result, ScanError};
use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

/// Round and clamp a floating-point sample into `[0, 255]`. NaN maps to 0.
#[inline]
pub fn clamp_u8(value: f32) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

/// ITU-R 601 luma of an RGB sample.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b)
}

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Luma([clamp_u8(luma(r, g, b))])
    })
}

/// Split an RGB image into three single-channel planes.
pub fn split_channels(image: &RgbImage) -> [GrayImage; 3] {
    let plane = |c: usize| {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            Luma([image.get_pixel(x, y).0[c]])
        })
    };
    [plane(0), plane(1), plane(2)]
}

/// Inverse of [`split_channels`]. The planes must share dimensions.
pub fn merge_channels(planes: &[GrayImage; 3]) -> Result<RgbImage> {
    let (width, height) = planes[0].dimensions();
    if planes.iter().any(|p| p.dimensions() != (width, height)) {
        return Err(ScanError::ProcessingFailure(
            "channel planes have mismatched dimensions".to_string(),
        ));
    }
    Ok(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            planes[0].get_pixel(x, y).0[0],
            planes[1].get_pixel(x, y).0[0],
            planes[2].get_pixel(x, y).0[0],
        ])
    }))
}

// -- CIE L*a*b* -----------------------------------------------------------------

// D65 reference white.
const WHITE_X: f32 = 0.950_456;
const WHITE_Z: f32 = 1.088_754;

const EPSILON: f32 = 0.008_856;
const KAPPA: f32 = 903.3;

/// An image in L*a*b* with luminance quantised to 8 bits (L* scaled from
/// 0..100 to 0..255) and chrominance kept at full precision.
pub struct LabImage {
    pub lightness: GrayImage,
    pub a: Vec<f32>,
    pub b: Vec<f32>,
}

fn srgb_to_linear_table() -> &'static [f32; 256] {
    static TABLE: OnceLock<[f32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0.0f32; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let c = i as f32 / 255.0;
            *entry = if c <= 0.040_45 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            };
        }
        table
    })
}

fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    let encoded = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    encoded * 255.0
}

fn lab_f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        7.787 * t + 16.0 / 116.0
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > EPSILON {
        cube
    } else {
        (f - 16.0 / 116.0) / 7.787
    }
}

pub fn rgb_to_lab(image: &RgbImage) -> Result<LabImage> {
    let table = srgb_to_linear_table();
    let (width, height) = image.dimensions();
    let len = (width as usize) * (height as usize);
    let mut lightness = Vec::with_capacity(len);
    let mut a = Vec::with_capacity(len);
    let mut b = Vec::with_capacity(len);

    for pixel in image.pixels() {
        let Rgb([r, g, bl]) = *pixel;
        let (r, g, bl) = (table[r as usize], table[g as usize], table[bl as usize]);

        let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * bl) / WHITE_X;
        let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * bl;
        let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * bl) / WHITE_Z;

        let (fx, fy, fz) = (lab_f(x), lab_f(y), lab_f(z));
        let l = if y > EPSILON { 116.0 * fy - 16.0 } else { KAPPA * y };

        lightness.push(clamp_u8(l * 255.0 / 100.0));
        a.push(500.0 * (fx - fy));
        b.push(200.0 * (fy - fz));
    }

    let lightness = ImageBuffer::from_raw(width, height, lightness).ok_or_else(|| {
        ScanError::ProcessingFailure("L*a*b* conversion produced a short buffer".to_string())
    })?;
    Ok(LabImage { lightness, a, b })
}

pub fn lab_to_rgb(lab: &LabImage) -> Result<RgbImage> {
    let (width, height) = lab.lightness.dimensions();
    let len = (width as usize) * (height as usize);
    if lab.a.len() != len || lab.b.len() != len {
        return Err(ScanError::ProcessingFailure(format!(
            "L*a*b* planes disagree: {} luminance samples, {} / {} chroma samples",
            len,
            lab.a.len(),
            lab.b.len()
        )));
    }

    let mut samples = Vec::with_capacity(len * 3);
    for ((l8, a), b) in lab.lightness.as_raw().iter().zip(&lab.a).zip(&lab.b) {
        let l = f32::from(*l8) * 100.0 / 255.0;
        let fy = (l + 16.0) / 116.0;
        let fx = fy + a / 500.0;
        let fz = fy - b / 200.0;

        let y = if l > KAPPA * EPSILON {
            fy * fy * fy
        } else {
            l / KAPPA
        };
        let x = lab_f_inv(fx) * WHITE_X;
        let z = lab_f_inv(fz) * WHITE_Z;

        let r = 3.240_479 * x - 1.537_150 * y - 0.498_535 * z;
        let g = -0.969_256 * x + 1.875_992 * y + 0.041_556 * z;
        let bl = 0.055_648 * x - 0.204_043 * y + 1.057_311 * z;

        samples.push(clamp_u8(linear_to_srgb(r)));
        samples.push(clamp_u8(linear_to_srgb(g)));
        samples.push(clamp_u8(linear_to_srgb(bl)));
    }

    ImageBuffer::from_raw(width, height, samples).ok_or_else(|| {
        ScanError::ProcessingFailure("L*a*b* conversion produced a short buffer".to_string())
    })
}
