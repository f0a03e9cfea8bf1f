// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan enhancement chain — denoising, color balance, global tone
// adjustments, CLAHE, shadow suppression, monochrome conversion, and
// edge/detail boosting for rectified document images.

use flatscan_core::config::{ColorBalance, ScanConfig};
use flatscan_core::error::{Result, ScanError};
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::filter::{gaussian_blur_f32, laplacian_filter};
use tracing::{debug, info, instrument};

use crate::raster::Raster;
use crate::scan::clahe::clahe;
use crate::scan::color::{self, clamp_u8, lab_to_rgb, rgb_to_lab};

/// Window radius of the bilateral denoiser (5x5 neighbourhood).
const DENOISE_RADIUS: isize = 2;
/// Smallest color sigma; below it the filter is already the identity.
const MIN_COLOR_SIGMA: f32 = 1e-3;
/// Spatial sigma of the bilateral denoiser, in pixels.
const DENOISE_SPATIAL_SIGMA: f32 = 2.0;
/// Color sigma per unit of `denoise_strength`.
const DENOISE_COLOR_SCALE: f32 = 1.5;

/// The illumination estimate is computed on a copy no larger than this.
const SHADOW_WORKING_SIZE: f32 = 256.0;
/// Blur radius of the illumination estimate, at working size.
const SHADOW_SIGMA: f32 = 8.0;

/// Blur used as the base layer of the detail boost.
const DETAIL_SIGMA: f32 = 1.0;

/// Runs the enhancement stages over a working image.
///
/// Every stage consumes `self` and returns a new `ScanEnhancer`, so stages
/// chain. [`enhance`] runs them all in the canonical order; calling the
/// stages individually is useful for previews and tests.
///
/// ```ignore
/// let enhanced = ScanEnhancer::new(raster, &config)
///     .denoise()?
///     .balance_colors()
///     .adjust_globals()?
///     .equalize_local_contrast()?
///     .monochrome()
///     .boost_edges()?
///     .into_raster();
/// ```
pub struct ScanEnhancer<'a> {
    /// The working image.
    image: Raster,
    /// Parameters for this request.
    config: &'a ScanConfig,
}

/// Run the full enhancement chain in its fixed order:
///
/// 1. Edge-preserving denoise
/// 2. Per-channel color balance
/// 3. Contrast, brightness, sharpness, saturation, gamma
/// 4. CLAHE on luminance, then
/// 5. shadow suppression on the same luminance
/// 6. Optional monochrome collapse
/// 7. Laplacian edge boost and unsharp detail boost
///
/// Every stage clamps and rounds back to 8 bits. The input is not modified.
#[instrument(skip(image, config), fields(width = image.width(), height = image.height()))]
pub fn enhance(image: &Raster, config: &ScanConfig) -> Result<Raster> {
    config.validate()?;
    image.ensure_non_empty()?;
    info!(channels = image.channels(), "Running enhancement chain");

    let enhanced = ScanEnhancer::new(image.clone(), config)
        .denoise()?
        .balance_colors()
        .adjust_globals()?
        .equalize_local_contrast()?
        .monochrome()
        .boost_edges()?
        .into_raster();

    debug!("Enhancement chain complete");
    Ok(enhanced)
}

impl<'a> ScanEnhancer<'a> {
    // -- Construction ---------------------------------------------------------

    pub fn new(image: Raster, config: &'a ScanConfig) -> Self {
        Self { image, config }
    }

    // -- Accessors ------------------------------------------------------------

    /// Consume the enhancer and return the working image.
    pub fn into_raster(self) -> Raster {
        self.image
    }

    fn with_image(self, image: Raster) -> Self {
        Self {
            image,
            config: self.config,
        }
    }

    // -- Stage 1: denoise -----------------------------------------------------

    /// Bilateral filter across all channels jointly, so color edges
    /// survive while sensor noise in flat regions is averaged out.
    #[instrument(skip(self))]
    pub fn denoise(self) -> Result<Self> {
        let strength = self.config.denoise_strength;
        if !self.config.noise_reduction || strength <= 0.0 {
            debug!("Denoise disabled");
            return Ok(self);
        }
        debug!(strength, "Denoising");

        let (width, height) = self.image.dimensions();
        let samples = bilateral_filter(
            self.image.as_raw(),
            width as usize,
            height as usize,
            self.image.channels(),
            strength,
        );
        let image = rebuild(&self.image, samples)?;
        Ok(self.with_image(image))
    }

    // -- Stage 2: color balance -----------------------------------------------

    /// Scale each RGB channel by its gain. Grayscale images pass through.
    #[instrument(skip(self))]
    pub fn balance_colors(self) -> Self {
        let Self { image, config } = self;
        let balance = config.color_balance;
        if balance.is_neutral() {
            return Self { image, config };
        }
        let image = match image {
            Raster::Rgb(rgb) => {
                debug!(?balance, "Applying color balance");
                Raster::Rgb(apply_gains(rgb, &balance))
            }
            gray @ Raster::Gray(_) => {
                debug!("Color balance skipped for grayscale input");
                gray
            }
        };
        Self { image, config }
    }

    // -- Stage 3: global tone -------------------------------------------------

    /// Contrast, brightness, sharpness, and saturation as interpolations
    /// between the image and a degenerate version of it (factor 0 yields
    /// the degenerate image, 1 the original, above 1 extrapolates), then
    /// gamma.
    #[instrument(skip(self))]
    pub fn adjust_globals(self) -> Result<Self> {
        let config = self.config;
        let mut image = self.image;

        if config.contrast != 1.0 {
            image = adjust_contrast(&image, config.contrast)?;
        }
        if config.brightness != 1.0 {
            image = map_samples(&image, |v| clamp_u8(f32::from(v) * config.brightness))?;
        }
        if config.sharpness != 1.0 {
            image = adjust_sharpness(&image, config.sharpness)?;
        }
        if config.saturation != 1.0 {
            image = adjust_saturation(image, config.saturation);
        }
        if config.gamma != 1.0 {
            let lut = gamma_table(config.gamma);
            image = map_samples(&image, |v| lut[v as usize])?;
        }
        debug!(
            contrast = config.contrast,
            brightness = config.brightness,
            sharpness = config.sharpness,
            saturation = config.saturation,
            gamma = config.gamma,
            "Global adjustments applied"
        );

        Ok(Self { image, config })
    }

    // -- Stages 4 + 5: CLAHE and shadow suppression ---------------------------

    /// Equalize luminance locally and flatten uneven illumination.
    ///
    /// RGB images go through L*a*b*: only L* is touched and the chroma
    /// planes are carried through at full precision. Skipped entirely when
    /// both the clip limit and shadow weight are zero, so a neutral
    /// configuration does not pay for a color-space round trip.
    #[instrument(skip(self))]
    pub fn equalize_local_contrast(self) -> Result<Self> {
        let config = self.config;
        if config.clahe_clip_limit <= 0.0 && config.shadow_reduction <= 0.0 {
            debug!("Local contrast and shadow suppression disabled");
            return Ok(self);
        }

        let image = match self.image {
            Raster::Gray(gray) => Raster::Gray(process_luminance(&gray, config)),
            Raster::Rgb(rgb) => {
                let mut lab = rgb_to_lab(&rgb)?;
                lab.lightness = process_luminance(&lab.lightness, config);
                Raster::Rgb(lab_to_rgb(&lab)?)
            }
        };
        Ok(Self { image, config })
    }

    // -- Stage 6: monochrome ----------------------------------------------------

    /// Collapse to one channel when `bw_mode` is set.
    #[instrument(skip(self))]
    pub fn monochrome(self) -> Self {
        if !self.config.bw_mode || self.image.is_gray() {
            return self;
        }
        debug!("Converting to monochrome");
        let gray = self.image.to_gray();
        self.with_image(Raster::Gray(gray))
    }

    // -- Stage 7: edges and detail ----------------------------------------------

    /// Add the positive Laplacian response weighted by
    /// `edge_enhancement - 1`, then apply the unsharp detail factor.
    #[instrument(skip(self))]
    pub fn boost_edges(self) -> Result<Self> {
        let config = self.config;
        let edge_weight = config.edge_enhancement - 1.0;
        let detail = config.detail_enhancement;
        if edge_weight <= 0.0 && detail == 1.0 {
            return Ok(self);
        }
        debug!(edge_weight, detail, "Boosting edges and detail");

        let per_plane = |plane: GrayImage| {
            let plane = if edge_weight > 0.0 {
                add_laplacian(&plane, edge_weight)
            } else {
                plane
            };
            if detail != 1.0 {
                unsharp(&plane, detail)
            } else {
                plane
            }
        };

        let image = match self.image {
            Raster::Gray(gray) => Raster::Gray(per_plane(gray)),
            Raster::Rgb(rgb) => {
                let [r, g, b] = color::split_channels(&rgb);
                Raster::Rgb(color::merge_channels(&[per_plane(r), per_plane(g), per_plane(b)])?)
            }
        };
        Ok(Self { image, config })
    }
}

// -- Sample plumbing ----------------------------------------------------------

/// Wrap interleaved samples in the same variant and size as `like`.
fn rebuild(like: &Raster, samples: Vec<u8>) -> Result<Raster> {
    let (width, height) = like.dimensions();
    let len = samples.len();
    match like {
        Raster::Rgb(_) => ImageBuffer::from_raw(width, height, samples).map(Raster::Rgb),
        Raster::Gray(_) => ImageBuffer::from_raw(width, height, samples).map(Raster::Gray),
    }
    .ok_or_else(|| {
        ScanError::ProcessingFailure(format!(
            "{} samples do not fill a {}x{}x{} image",
            len,
            width,
            height,
            like.channels()
        ))
    })
}

fn map_samples(image: &Raster, f: impl Fn(u8) -> u8) -> Result<Raster> {
    rebuild(image, image.as_raw().iter().map(|&v| f(v)).collect())
}

fn mean_luma(image: &Raster) -> f32 {
    let gray = image.to_gray();
    let total: u64 = gray.as_raw().iter().map(|&v| u64::from(v)).sum();
    (total as f64 / gray.as_raw().len().max(1) as f64) as f32
}

// -- Stage helpers ------------------------------------------------------------

fn bilateral_filter(
    samples: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    strength: f32,
) -> Vec<u8> {
    let sigma_color = (DENOISE_COLOR_SCALE * strength).max(MIN_COLOR_SIGMA);
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let spatial_coeff = -0.5 / (DENOISE_SPATIAL_SIGMA * DENOISE_SPATIAL_SIGMA);

    let mut kernel = Vec::new();
    for dy in -DENOISE_RADIUS..=DENOISE_RADIUS {
        for dx in -DENOISE_RADIUS..=DENOISE_RADIUS {
            let weight = ((dx * dx + dy * dy) as f32 * spatial_coeff).exp();
            kernel.push((dx, dy, weight));
        }
    }
    let max_distance = 255 * 255 * channels;
    let color_weight: Vec<f32> = (0..=max_distance)
        .map(|d| (d as f32 * color_coeff).exp())
        .collect();

    let mut out = vec![0u8; samples.len()];
    let mut acc = vec![0.0f32; channels];
    for y in 0..height {
        for x in 0..width {
            let centre = (y * width + x) * channels;
            acc.fill(0.0);
            let mut total = 0.0f32;

            for &(dx, dy, spatial) in &kernel {
                let nx = x as isize + dx;
                let ny = y as isize + dy;
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let idx = (ny as usize * width + nx as usize) * channels;
                let distance: usize = (0..channels)
                    .map(|c| {
                        let d = i32::from(samples[idx + c]) - i32::from(samples[centre + c]);
                        (d * d) as usize
                    })
                    .sum();
                let weight = spatial * color_weight[distance];
                for c in 0..channels {
                    acc[c] += weight * f32::from(samples[idx + c]);
                }
                total += weight;
            }

            // The centre pixel always contributes weight 1.
            for c in 0..channels {
                out[centre + c] = clamp_u8(acc[c] / total);
            }
        }
    }
    out
}

fn apply_gains(mut rgb: image::RgbImage, balance: &ColorBalance) -> image::RgbImage {
    let gains = [balance.red, balance.green, balance.blue];
    for pixel in rgb.pixels_mut() {
        for (sample, gain) in pixel.0.iter_mut().zip(gains) {
            *sample = clamp_u8(f32::from(*sample) * gain);
        }
    }
    rgb
}

/// Blend with a uniform image at the rounded mean luma.
fn adjust_contrast(image: &Raster, factor: f32) -> Result<Raster> {
    let mean = mean_luma(image).round();
    map_samples(image, |v| clamp_u8(mean + factor * (f32::from(v) - mean)))
}

/// Blend with the 3x3 smoothing filter `[1 1 1; 1 5 1; 1 1 1] / 13`.
/// Border pixels have no full neighbourhood and are left as they are.
fn adjust_sharpness(image: &Raster, factor: f32) -> Result<Raster> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let channels = image.channels();
    if width < 3 || height < 3 {
        return Ok(image.clone());
    }
    let src = image.as_raw();
    let mut out = src.to_vec();

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            for c in 0..channels {
                let at = |xx: usize, yy: usize| u32::from(src[(yy * width + xx) * channels + c]);
                let mut sum = 0u32;
                for yy in y - 1..=y + 1 {
                    for xx in x - 1..=x + 1 {
                        sum += at(xx, yy);
                    }
                }
                let centre = at(x, y);
                sum += 4 * centre;
                let smooth = f32::from(clamp_u8(sum as f32 / 13.0));
                out[(y * width + x) * channels + c] =
                    clamp_u8(smooth + factor * (centre as f32 - smooth));
            }
        }
    }
    rebuild(image, out)
}

/// Blend each RGB pixel with its luma gray. Gray images have no chroma.
fn adjust_saturation(image: Raster, factor: f32) -> Raster {
    match image {
        Raster::Rgb(mut rgb) => {
            for pixel in rgb.pixels_mut() {
                let [r, g, b] = pixel.0;
                let gray = f32::from(clamp_u8(color::luma(r, g, b)));
                for sample in pixel.0.iter_mut() {
                    *sample = clamp_u8(gray + factor * (f32::from(*sample) - gray));
                }
            }
            Raster::Rgb(rgb)
        }
        gray @ Raster::Gray(_) => gray,
    }
}

fn gamma_table(gamma: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = clamp_u8(255.0 * (i as f32 / 255.0).powf(1.0 / gamma));
    }
    lut
}

fn process_luminance(lightness: &GrayImage, config: &ScanConfig) -> GrayImage {
    let equalized = clahe(lightness, config.clahe_grid_size, config.clahe_clip_limit);
    if config.shadow_reduction > 0.0 {
        suppress_shadows(&equalized, config.shadow_reduction)
    } else {
        equalized
    }
}

/// `L' = L - w * (background - mean(background))`, where the background is
/// a heavy blur of `L`. Slow illumination gradients are pulled towards the
/// mean while text-scale detail is kept.
pub(crate) fn suppress_shadows(lightness: &GrayImage, weight: f32) -> GrayImage {
    let background = estimate_illumination(lightness);
    let total: u64 = background.as_raw().iter().map(|&v| u64::from(v)).sum();
    let mean = (total as f64 / background.as_raw().len().max(1) as f64) as f32;

    GrayImage::from_fn(lightness.width(), lightness.height(), |x, y| {
        let value = f32::from(lightness.get_pixel(x, y).0[0]);
        let bg = f32::from(background.get_pixel(x, y).0[0]);
        Luma([clamp_u8(value - weight * (bg - mean))])
    })
}

/// Blur at reduced resolution and scale back up; a full-resolution blur
/// of this radius would dominate the chain's runtime.
fn estimate_illumination(lightness: &GrayImage) -> GrayImage {
    let (width, height) = lightness.dimensions();
    let scale = (SHADOW_WORKING_SIZE / width.max(height) as f32).min(1.0);
    let small_w = ((width as f32 * scale).round() as u32).max(1);
    let small_h = ((height as f32 * scale).round() as u32).max(1);

    let small = imageops::resize(lightness, small_w, small_h, FilterType::Triangle);
    let blurred = gaussian_blur_f32(&small, SHADOW_SIGMA);
    imageops::resize(&blurred, width, height, FilterType::Triangle)
}

/// Add the positive part of the 4-neighbour Laplacian. Negative responses
/// saturate to zero, as with an unsigned 8-bit Laplacian.
fn add_laplacian(plane: &GrayImage, weight: f32) -> GrayImage {
    let laplacian = laplacian_filter(plane);
    GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
        let edge = f32::from(laplacian.get_pixel(x, y).0[0].clamp(0, 255));
        let value = f32::from(plane.get_pixel(x, y).0[0]);
        Luma([clamp_u8(value + weight * edge)])
    })
}

/// `blur + detail * (plane - blur)`: above 1 sharpens, below 1 softens.
fn unsharp(plane: &GrayImage, detail: f32) -> GrayImage {
    let blurred = gaussian_blur_f32(plane, DETAIL_SIGMA);
    GrayImage::from_fn(plane.width(), plane.height(), |x, y| {
        let value = f32::from(plane.get_pixel(x, y).0[0]);
        let base = f32::from(blurred.get_pixel(x, y).0[0]);
        Luma([clamp_u8(base + detail * (value - base))])
    })
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn neutral_config() -> ScanConfig {
        ScanConfig {
            contrast: 1.0,
            brightness: 1.0,
            sharpness: 1.0,
            saturation: 1.0,
            gamma: 1.0,
            clahe_clip_limit: 0.0,
            shadow_reduction: 0.0,
            edge_enhancement: 1.0,
            detail_enhancement: 1.0,
            noise_reduction: false,
            bw_mode: false,
            ..Default::default()
        }
    }

    fn document_like(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x / 6 + y / 9) % 5 == 0 {
                Rgb([30, 35, 40])
            } else {
                let shade = 180 + ((x + y) % 60) as u8;
                Rgb([shade, shade.saturating_sub(10), shade.saturating_sub(25)])
            }
        })
    }

    fn max_abs_diff(a: &Raster, b: &Raster) -> u8 {
        a.as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(x, y)| x.abs_diff(*y))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn neutral_config_is_identity() {
        let input = Raster::Rgb(document_like(64, 48));
        let output = enhance(&input, &neutral_config()).expect("enhance");
        assert_eq!(output.dimensions(), input.dimensions());
        assert_eq!(max_abs_diff(&input, &output), 0);
    }

    #[test]
    fn lab_stage_keeps_neutral_gray_neutral() {
        let config = ScanConfig {
            clahe_clip_limit: 3.0,
            ..neutral_config()
        };
        let input = Raster::Rgb(RgbImage::from_fn(64, 64, |x, _| {
            let v = (x * 3) as u8;
            Rgb([v, v, v])
        }));
        let output = enhance(&input, &config).expect("enhance");
        assert_eq!(output.dimensions(), input.dimensions());
        for px in output.as_raw().chunks(3) {
            let spread = px.iter().max().unwrap_or(&0) - px.iter().min().unwrap_or(&0);
            assert!(spread <= 2, "chroma leaked into {:?}", px);
        }
    }

    #[test]
    fn default_chain_keeps_dimensions_and_channels() {
        let input = Raster::Rgb(document_like(80, 60));
        let output = enhance(&input, &ScanConfig::default()).expect("enhance");
        assert_eq!(output.dimensions(), (80, 60));
        assert_eq!(output.channels(), 3);
    }

    #[test]
    fn extreme_factors_stay_in_range() {
        // Every sample is a u8, so this exercises the clamp paths: nothing
        // may panic on overflow and the extremes must saturate, not wrap.
        let config = ScanConfig {
            contrast: 4.0,
            brightness: 3.0,
            sharpness: 5.0,
            saturation: 4.0,
            gamma: 0.3,
            color_balance: ColorBalance { red: 2.5, green: 0.0, blue: 1.7 },
            edge_enhancement: 3.0,
            detail_enhancement: 3.0,
            shadow_reduction: 1.0,
            clahe_clip_limit: 10.0,
            ..Default::default()
        };
        let input = Raster::Rgb(document_like(40, 40));
        let output = enhance(&input, &config).expect("enhance");
        assert_eq!(output.dimensions(), (40, 40));
        // Saturated rather than wrapped.
        assert!(output.as_raw().iter().any(|&v| v == 255));
    }

    #[test]
    fn brightness_zero_yields_black() {
        let config = ScanConfig {
            brightness: 0.0,
            ..neutral_config()
        };
        let output = enhance(&Raster::Rgb(document_like(20, 20)), &config).expect("enhance");
        assert!(output.as_raw().iter().all(|&v| v == 0));
    }

    #[test]
    fn contrast_zero_yields_uniform_mean() {
        let config = ScanConfig {
            contrast: 0.0,
            ..neutral_config()
        };
        let input = Raster::Gray(GrayImage::from_fn(10, 10, |x, _| {
            Luma([if x < 5 { 0 } else { 200 }])
        }));
        let output = enhance(&input, &config).expect("enhance");
        assert!(output.as_raw().iter().all(|&v| v == 100));
    }

    #[test]
    fn saturation_zero_yields_gray_pixels() {
        let config = ScanConfig {
            saturation: 0.0,
            ..neutral_config()
        };
        let output = enhance(&Raster::Rgb(document_like(16, 16)), &config).expect("enhance");
        for px in output.as_raw().chunks(3) {
            assert!(px[0] == px[1] && px[1] == px[2]);
        }
    }

    #[test]
    fn color_balance_scales_single_channel() {
        let config = ScanConfig {
            color_balance: ColorBalance { red: 0.5, green: 1.0, blue: 2.0 },
            ..neutral_config()
        };
        let input = Raster::Rgb(RgbImage::from_pixel(4, 4, Rgb([100, 100, 200])));
        let output = enhance(&input, &config).expect("enhance");
        assert_eq!(&output.as_raw()[..3], &[50, 100, 255]);
    }

    #[test]
    fn bw_mode_collapses_to_one_channel() {
        let config = ScanConfig {
            bw_mode: true,
            ..ScanConfig::default()
        };
        let output = enhance(&Raster::Rgb(document_like(32, 32)), &config).expect("enhance");
        assert!(output.is_gray());
        assert_eq!(output.dimensions(), (32, 32));
    }

    #[test]
    fn gray_input_stays_gray() {
        let input = Raster::Gray(Raster::Rgb(document_like(30, 20)).to_gray());
        let output = enhance(&input, &ScanConfig::default()).expect("enhance");
        assert!(output.is_gray());
    }

    #[test]
    fn denoise_smooths_isolated_noise() {
        let mut img = GrayImage::from_pixel(15, 15, Luma([120]));
        img.put_pixel(7, 7, Luma([135]));
        let config = ScanConfig {
            noise_reduction: true,
            denoise_strength: 10.0,
            ..neutral_config()
        };
        let output = enhance(&Raster::Gray(img), &config).expect("enhance");
        let centre = output.as_raw()[7 * 15 + 7];
        assert!(centre < 135 && centre >= 120, "centre {}", centre);
    }

    #[test]
    fn denoise_preserves_strong_edges() {
        let img = GrayImage::from_fn(20, 10, |x, _| Luma([if x < 10 { 20 } else { 230 }]));
        let config = ScanConfig {
            noise_reduction: true,
            denoise_strength: 10.0,
            ..neutral_config()
        };
        let output = enhance(&Raster::Gray(img), &config).expect("enhance");
        assert!(output.as_raw()[9] <= 25);
        assert!(output.as_raw()[10] >= 225);
    }

    #[test]
    fn tiny_denoise_strength_leaves_pixels_alone() {
        let config = ScanConfig {
            noise_reduction: true,
            denoise_strength: 1e-20,
            ..neutral_config()
        };
        config.validate().expect("strength is in range");

        let flat = Raster::Gray(GrayImage::from_pixel(8, 8, Luma([120])));
        assert_eq!(enhance(&flat, &config).expect("enhance"), flat);

        let textured = Raster::Rgb(document_like(16, 16));
        let output = enhance(&textured, &config).expect("enhance");
        assert_eq!(max_abs_diff(&textured, &output), 0);
    }

    #[test]
    fn short_sample_buffer_is_a_processing_failure() {
        let like = Raster::Rgb(RgbImage::new(4, 4));
        let err = rebuild(&like, vec![0; 4 * 4 * 3 - 1]).unwrap_err();
        assert!(matches!(err, ScanError::ProcessingFailure(_)));
    }

    #[test]
    fn edge_boost_brightens_dark_side_of_step() {
        let img = GrayImage::from_fn(12, 12, |x, _| Luma([if x < 6 { 40 } else { 200 }]));
        let config = ScanConfig {
            edge_enhancement: 1.5,
            ..neutral_config()
        };
        let output = enhance(&Raster::Gray(img), &config).expect("enhance");
        // Laplacian at x=5 is 200 - 40 = 160; half of that is added.
        assert_eq!(output.as_raw()[6 * 12 + 5], 120);
        // Flat regions are untouched.
        assert_eq!(output.as_raw()[6 * 12 + 1], 40);
    }

    #[test]
    fn shadow_suppression_flattens_gradient() {
        let lit = GrayImage::from_fn(200, 100, |x, _| Luma([(80 + x / 2) as u8]));
        let flattened = suppress_shadows(&lit, 1.0);
        let spread = |img: &GrayImage| {
            let left = img.get_pixel(10, 50).0[0] as i32;
            let right = img.get_pixel(189, 50).0[0] as i32;
            (right - left).abs()
        };
        assert!(spread(&flattened) < spread(&lit) / 2);
    }

    #[test]
    fn gamma_table_endpoints_are_fixed() {
        let lut = gamma_table(2.2);
        assert_eq!(lut[0], 0);
        assert_eq!(lut[255], 255);
        assert!(lut[128] > 128);
    }

    #[test]
    fn empty_raster_is_invalid_input() {
        let err = enhance(&Raster::Gray(GrayImage::new(0, 0)), &ScanConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::InvalidInput(_)));
    }

    #[test]
    fn input_is_not_mutated() {
        let input = Raster::Rgb(document_like(24, 24));
        let snapshot = input.clone();
        let _ = enhance(&input, &ScanConfig::default()).expect("enhance");
        assert_eq!(input, snapshot);
    }
}
