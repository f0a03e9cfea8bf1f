// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// How the corner detector turns the blurred grayscale frame into a binary
/// edge map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgePolicy {
    /// Gradient magnitude with hysteresis (`canny_low` / `canny_high`).
    #[default]
    Canny,
    /// Inverted local-mean threshold: pixels darker than their
    /// neighbourhood become edge pixels.
    AdaptiveThreshold,
    /// Union of both maps.
    Combined,
}

/// Value used by the rectifier for destination pixels whose source
/// position falls outside the input image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderFill {
    /// Fill every channel with a constant sample.
    Constant(u8),
    /// Repeat the nearest edge pixel.
    Replicate,
}

impl Default for BorderFill {
    fn default() -> Self {
        Self::Constant(0)
    }
}

/// Per-channel linear gains applied during color balancing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorBalance {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

impl ColorBalance {
    pub fn is_neutral(&self) -> bool {
        self.red == 1.0 && self.green == 1.0 && self.blue == 1.0
    }
}

impl Default for ColorBalance {
    fn default() -> Self {
        Self {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
        }
    }
}

/// Parameters for a single processing request.
///
/// Built once per request (usually `ScanConfig { contrast: 1.2,
/// ..Default::default() }` or a partial JSON document) and passed by
/// reference through the pipeline, which never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    // -- Global enhancement factors (1.0 = unchanged) --
    /// Contrast factor.
    pub contrast: f32,
    /// Brightness factor.
    pub brightness: f32,
    /// Sharpness factor.
    pub sharpness: f32,
    /// Saturation factor.
    pub saturation: f32,
    /// Gamma applied after the global factors.
    pub gamma: f32,
    /// Per-channel gains.
    pub color_balance: ColorBalance,

    // -- Local contrast --
    /// CLAHE clip limit. Zero disables the local-contrast stage.
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid as (columns, rows).
    pub clahe_grid_size: (u32, u32),
    /// Weight of the illumination-flattening blend, in [0, 1].
    pub shadow_reduction: f32,

    // -- Detail --
    /// Laplacian edge boost; values above 1.0 enable it.
    pub edge_enhancement: f32,
    /// Unsharp detail factor; 1.0 disables it, below 1.0 softens.
    pub detail_enhancement: f32,

    // -- Denoising --
    /// Whether the edge-preserving denoiser runs.
    pub noise_reduction: bool,
    /// Denoiser strength; larger values smooth stronger color differences.
    pub denoise_strength: f32,

    // -- Output --
    /// Collapse the output to grayscale.
    pub bw_mode: bool,

    // -- Geometry / detection --
    /// Canny lower hysteresis threshold.
    pub canny_low: f32,
    /// Canny upper hysteresis threshold.
    pub canny_high: f32,
    /// Gaussian kernel size used before edge detection (odd).
    pub gaussian_kernel: u32,
    /// Edge map construction used by the detector.
    pub edge_policy: EdgePolicy,
    /// Smallest contour area the detector accepts, as a fraction of the
    /// frame area.
    pub min_contour_area_ratio: f64,
    /// Fill used by the rectifier outside the source image.
    pub border_fill: BorderFill,
    /// Larger image dimension is capped to this many pixels before
    /// processing.
    pub max_dimension: u32,
    /// Estimate and undo small text-line skew when the image was not
    /// rectified.
    pub auto_rotate: bool,
    /// Explicit clockwise rotation in degrees; overrides `auto_rotate`
    /// when non-zero.
    pub deskew_angle: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            contrast: 1.6,
            brightness: 1.5,
            sharpness: 1.4,
            saturation: 1.2,
            gamma: 1.0,
            color_balance: ColorBalance::default(),
            clahe_clip_limit: 3.0,
            clahe_grid_size: (8, 8),
            shadow_reduction: 0.25,
            edge_enhancement: 1.0,
            detail_enhancement: 1.0,
            noise_reduction: true,
            denoise_strength: 10.0,
            bw_mode: false,
            canny_low: 50.0,
            canny_high: 150.0,
            gaussian_kernel: 3,
            edge_policy: EdgePolicy::Canny,
            min_contour_area_ratio: 0.02,
            border_fill: BorderFill::default(),
            max_dimension: 2000,
            auto_rotate: true,
            deskew_angle: 0.0,
        }
    }
}

impl ScanConfig {
    /// Parse a (possibly partial) JSON document. Missing fields take their
    /// defaults; the result is validated.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every parameter against its documented range.
    pub fn validate(&self) -> Result<()> {
        let factors = [
            ("contrast", self.contrast),
            ("brightness", self.brightness),
            ("sharpness", self.sharpness),
            ("saturation", self.saturation),
            ("clahe_clip_limit", self.clahe_clip_limit),
            ("edge_enhancement", self.edge_enhancement),
            ("detail_enhancement", self.detail_enhancement),
            ("denoise_strength", self.denoise_strength),
            ("color_balance.red", self.color_balance.red),
            ("color_balance.green", self.color_balance.green),
            ("color_balance.blue", self.color_balance.blue),
        ];
        for (name, value) in factors {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{name} must be a finite value >= 0, got {value}")));
            }
        }

        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(invalid(format!("gamma must be > 0, got {}", self.gamma)));
        }
        if !(0.0..=1.0).contains(&self.shadow_reduction) {
            return Err(invalid(format!(
                "shadow_reduction must lie in [0, 1], got {}",
                self.shadow_reduction
            )));
        }
        if self.clahe_grid_size.0 == 0 || self.clahe_grid_size.1 == 0 {
            return Err(invalid(format!(
                "clahe_grid_size must be at least 1x1, got {:?}",
                self.clahe_grid_size
            )));
        }
        if !self.canny_low.is_finite()
            || !self.canny_high.is_finite()
            || self.canny_low < 0.0
            || self.canny_low > self.canny_high
        {
            return Err(invalid(format!(
                "canny thresholds must satisfy 0 <= low <= high, got {} / {}",
                self.canny_low, self.canny_high
            )));
        }
        if self.gaussian_kernel == 0 || self.gaussian_kernel % 2 == 0 {
            return Err(invalid(format!(
                "gaussian_kernel must be odd and >= 1, got {}",
                self.gaussian_kernel
            )));
        }
        if !(0.0..=1.0).contains(&self.min_contour_area_ratio) {
            return Err(invalid(format!(
                "min_contour_area_ratio must lie in [0, 1], got {}",
                self.min_contour_area_ratio
            )));
        }
        if self.max_dimension == 0 {
            return Err(invalid("max_dimension must be >= 1".to_string()));
        }
        if !(-45.0..=45.0).contains(&self.deskew_angle) {
            return Err(invalid(format!(
                "deskew_angle must lie in [-45, 45], got {}",
                self.deskew_angle
            )));
        }
        Ok(())
    }

    /// Gaussian sigma equivalent to the configured kernel size.
    pub fn gaussian_sigma(&self) -> f32 {
        kernel_sigma(self.gaussian_kernel)
    }
}

/// Sigma OpenCV derives for a Gaussian kernel of size `ksize` when no sigma
/// is given.
pub fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn invalid(message: String) -> ScanError {
    ScanError::InvalidInput(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_dimension, 2000);
        assert_eq!(config.clahe_grid_size, (8, 8));
        assert!(config.noise_reduction);
        assert!(!config.bw_mode);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = ScanConfig::from_json_str(
            r#"{ "contrast": 1.1, "bw_mode": true, "color_balance": { "red": 1.3 } }"#,
        )
        .expect("valid partial config");

        assert_eq!(config.contrast, 1.1);
        assert!(config.bw_mode);
        assert_eq!(config.color_balance.red, 1.3);
        assert_eq!(config.color_balance.green, 1.0);
        assert_eq!(config.brightness, ScanConfig::default().brightness);
    }

    #[test]
    fn enum_fields_use_snake_case() {
        let config = ScanConfig::from_json_str(
            r#"{ "edge_policy": "adaptive_threshold", "border_fill": "replicate" }"#,
        )
        .expect("valid config");
        assert_eq!(config.edge_policy, EdgePolicy::AdaptiveThreshold);
        assert_eq!(config.border_fill, BorderFill::Replicate);

        let config = ScanConfig::from_json_str(r#"{ "border_fill": { "constant": 255 } }"#)
            .expect("valid config");
        assert_eq!(config.border_fill, BorderFill::Constant(255));
    }

    #[test]
    fn json_round_trips() {
        let config = ScanConfig {
            sharpness: 2.0,
            edge_policy: EdgePolicy::Combined,
            ..Default::default()
        };
        let json = config.to_json_pretty().expect("serialize");
        let parsed = ScanConfig::from_json_str(&json).expect("parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases = [
            ScanConfig { contrast: -0.1, ..Default::default() },
            ScanConfig { gamma: 0.0, ..Default::default() },
            ScanConfig { shadow_reduction: 1.5, ..Default::default() },
            ScanConfig { clahe_grid_size: (0, 8), ..Default::default() },
            ScanConfig { canny_low: 200.0, canny_high: 100.0, ..Default::default() },
            ScanConfig { gaussian_kernel: 4, ..Default::default() },
            ScanConfig { max_dimension: 0, ..Default::default() },
            ScanConfig { deskew_angle: 90.0, ..Default::default() },
            ScanConfig { saturation: f32::NAN, ..Default::default() },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ScanError::InvalidInput(_))),
                "expected rejection for {config:?}"
            );
        }
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = ScanConfig::from_json_str("{ contrast: }").unwrap_err();
        assert!(matches!(err, ScanError::Serialization(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "max_dimension": 1200 }}"#).expect("write");
        let config = ScanConfig::load(file.path()).expect("load");
        assert_eq!(config.max_dimension, 1200);
    }

    #[test]
    fn kernel_sigma_matches_opencv_rule() {
        assert!((kernel_sigma(3) - 0.8).abs() < 1e-6);
        assert!((kernel_sigma(5) - 1.1).abs() < 1e-6);
    }
}
