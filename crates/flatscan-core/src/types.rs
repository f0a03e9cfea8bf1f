// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core geometric domain types for the Flatscan pipeline.

use serde::{Deserialize, Serialize};

/// An (x, y) position in floating-point image coordinates.
///
/// The origin is the top-left pixel; y grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(f64::from(x), f64::from(y))
    }
}

/// Exactly four points describing a document outline.
///
/// Quads produced by the detector and consumed by the rectifier are in
/// canonical order: top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub [Point; 4]);

impl Quad {
    pub const fn new(points: [Point; 4]) -> Self {
        Self(points)
    }

    /// The axis-aligned `width` x `height` pixel rectangle
    /// `[(0,0), (W-1,0), (W-1,H-1), (0,H-1)]`.
    pub fn rectangle(width: u32, height: u32) -> Self {
        let right = f64::from(width.saturating_sub(1));
        let bottom = f64::from(height.saturating_sub(1));
        Self([
            Point::new(0.0, 0.0),
            Point::new(right, 0.0),
            Point::new(right, bottom),
            Point::new(0.0, bottom),
        ])
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }

    pub fn top_left(&self) -> Point {
        self.0[0]
    }

    pub fn top_right(&self) -> Point {
        self.0[1]
    }

    pub fn bottom_right(&self) -> Point {
        self.0[2]
    }

    pub fn bottom_left(&self) -> Point {
        self.0[3]
    }

    /// Axis-aligned bounds as `(min_x, min_y, max_x, max_y)`.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.0.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), p| {
                (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
            },
        )
    }
}

/// Outcome of corner detection.
///
/// Not finding a document is an expected result, so it is a variant here
/// rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Detection {
    Found(Quad),
    NotFound,
}

impl Detection {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn quad(&self) -> Option<&Quad> {
        match self {
            Self::Found(quad) => Some(quad),
            Self::NotFound => None,
        }
    }
}

impl From<Option<Quad>> for Detection {
    fn from(quad: Option<Quad>) -> Self {
        quad.map_or(Self::NotFound, Self::Found)
    }
}
