// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline — corner detection, perspective rectification, deskew,
// the enhancement chain, and the orchestrator that ties them together.

pub mod clahe;
pub mod color;
pub mod deskew;
pub mod detect;
pub mod enhance;
pub mod pipeline;
pub mod rectify;

pub use deskew::{deskew, estimate_skew};
pub use detect::detect;
pub use enhance::{ScanEnhancer, enhance};
pub use pipeline::{
    ENHANCED_LABEL, ORIGINAL_LABEL, auto_process_file, auto_process_files, prepare, process,
    process_batch,
};
pub use rectify::rectify;
