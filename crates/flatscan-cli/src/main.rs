// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Flatscan — command-line document scanner
//
// Entry point. Initialises logging, parses the command line, and hands the
// work to flatscan-document.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use flatscan_core::{ScanConfig, ScanError};
use flatscan_document::{
    ENHANCED_LABEL, ImageProcessor, ORIGINAL_LABEL, Raster, auto_process_files, detect, process,
};

#[derive(Parser)]
#[command(name = "flatscan")]
#[command(version, about = "Flatten and clean up photographed documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop, flatten, and enhance one image into a new file
    Process {
        /// Input image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file (defaults to <INPUT>_scanned.<ext>)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Also write the unmodified input here
        #[arg(long, value_name = "FILE")]
        original: Option<PathBuf>,

        /// Skip document detection and perspective correction
        #[arg(long)]
        no_crop: bool,

        #[command(flatten)]
        settings: Settings,
    },

    /// Enhance images in place, replacing each file
    Auto {
        /// Image files to rewrite
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        settings: Settings,
    },

    /// Print the detected document corners as JSON
    Detect {
        /// Input image
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        settings: Settings,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        settings: Settings,
    },
}

/// Configuration file plus per-field overrides shared by every command.
#[derive(Args)]
struct Settings {
    /// JSON configuration file; missing fields take their defaults
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Produce a grayscale result
    #[arg(long)]
    bw: bool,

    /// Disable the edge-preserving denoiser
    #[arg(long)]
    no_denoise: bool,

    /// Disable automatic skew correction
    #[arg(long)]
    no_rotate: bool,

    /// Contrast factor (1.0 = unchanged)
    #[arg(long, value_name = "FLOAT")]
    contrast: Option<f32>,

    /// Brightness factor (1.0 = unchanged)
    #[arg(long, value_name = "FLOAT")]
    brightness: Option<f32>,

    /// Sharpness factor (1.0 = unchanged)
    #[arg(long, value_name = "FLOAT")]
    sharpness: Option<f32>,

    /// Saturation factor (1.0 = unchanged)
    #[arg(long, value_name = "FLOAT")]
    saturation: Option<f32>,

    /// Gamma (1.0 = unchanged)
    #[arg(long, value_name = "FLOAT")]
    gamma: Option<f32>,

    /// CLAHE clip limit (0 disables local contrast)
    #[arg(long, value_name = "FLOAT")]
    clahe_clip: Option<f32>,

    /// Shadow suppression weight in [0, 1]
    #[arg(long, value_name = "FLOAT")]
    shadow: Option<f32>,

    /// Cap on the larger image side before processing
    #[arg(long, value_name = "PIXELS")]
    max_dimension: Option<u32>,

    /// Explicit clockwise rotation in degrees
    #[arg(long, value_name = "DEGREES", allow_hyphen_values = true)]
    deskew_angle: Option<f32>,
}

impl Settings {
    /// Load the configuration file (if any), apply the overrides, and
    /// validate the result.
    fn resolve(&self) -> Result<ScanConfig, ScanError> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::load(path)?,
            None => ScanConfig::default(),
        };

        if self.bw {
            config.bw_mode = true;
        }
        if self.no_denoise {
            config.noise_reduction = false;
        }
        if self.no_rotate {
            config.auto_rotate = false;
        }
        let overrides = [
            (self.contrast, &mut config.contrast),
            (self.brightness, &mut config.brightness),
            (self.sharpness, &mut config.sharpness),
            (self.saturation, &mut config.saturation),
            (self.gamma, &mut config.gamma),
            (self.clahe_clip, &mut config.clahe_clip_limit),
            (self.shadow, &mut config.shadow_reduction),
            (self.deskew_angle, &mut config.deskew_angle),
        ];
        for (value, field) in overrides {
            if let Some(value) = value {
                *field = value;
            }
        }
        if let Some(max_dimension) = self.max_dimension {
            config.max_dimension = max_dimension;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "flatscan failed");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<(), ScanError> {
    match command {
        Commands::Process {
            input,
            out,
            original,
            no_crop,
            settings,
        } => {
            let config = settings.resolve()?;
            let image = Raster::load(&input)?;
            let outputs = process(&image, &config, !no_crop)?;

            let out = out.unwrap_or_else(|| default_output_path(&input));
            for labeled in outputs {
                let target = match labeled.label.as_str() {
                    ENHANCED_LABEL => Some(&out),
                    ORIGINAL_LABEL => original.as_ref(),
                    _ => None,
                };
                if let Some(target) = target {
                    ImageProcessor::from_raster(labeled.image).save(target)?;
                    tracing::info!(label = %labeled.label, path = %target.display(), "Saved");
                }
            }
            Ok(())
        }

        Commands::Auto { files, settings } => {
            let config = settings.resolve()?;
            let results = auto_process_files(&files, &config);
            let failed = results.iter().filter(|(_, outcome)| outcome.is_err()).count();
            for (path, outcome) in &results {
                match outcome {
                    Ok(()) => tracing::info!(path = %path.display(), "Rewritten"),
                    Err(err) => tracing::error!(path = %path.display(), error = %err, "Failed"),
                }
            }
            if failed > 0 {
                return Err(ScanError::ProcessingFailure(format!(
                    "{} of {} files failed",
                    failed,
                    results.len()
                )));
            }
            Ok(())
        }

        Commands::Detect { input, settings } => {
            let config = settings.resolve()?;
            let image = Raster::load(&input)?;
            let detection = detect(&image, &config);
            println!("{}", serde_json::to_string_pretty(&detection)?);
            Ok(())
        }

        Commands::Config { settings } => {
            let config = settings.resolve()?;
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

/// `scans/page.jpg` becomes `scans/page_scanned.jpg`.
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scan".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{}_scanned.{}", stem, ext.to_string_lossy()),
        None => format!("{}_scanned.png", stem),
    };
    input.with_file_name(name)
}
