// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Flatscan.

use thiserror::Error;

/// Top-level error type for all Flatscan operations.
///
/// A detector that finds no document is not an error; see
/// [`crate::types::Detection::NotFound`].
#[derive(Debug, Error)]
pub enum ScanError {
    // -- Input --
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // -- Geometry --
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    // -- Processing --
    #[error("processing failed: {0}")]
    ProcessingFailure(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScanError {
    /// Whether the orchestrator may recover from this error by skipping
    /// rectification and enhancing the unrectified image instead.
    pub fn is_geometric(&self) -> bool {
        matches!(self, Self::InvalidGeometry(_) | Self::DegenerateGeometry(_))
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScanError>;
