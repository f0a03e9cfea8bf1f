// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometry utilities — canonical corner ordering, homography estimation,
// rectified output dimensions, and the polygon helpers the corner detector
// builds on (area, perimeter, convex hull, Douglas-Peucker, minimum-area
// rectangle).

use std::cmp::Ordering;

use flatscan_core::error::{Result, ScanError};
use flatscan_core::types::{Point, Quad};
use imageproc::geometric_transformations::Projection;

/// Points closer than this are treated as the same point.
const COINCIDENT_EPSILON: f64 = 1e-9;

/// Triangles whose area is below this fraction of the squared extent of the
/// quad count as collinear.
const COLLINEAR_RATIO: f64 = 1e-6;

// -- Corner ordering ----------------------------------------------------------

/// Order four points as top-left, top-right, bottom-right, bottom-left.
///
/// Top-left minimises `x + y`, bottom-right maximises it; top-right
/// minimises `y - x`, bottom-left maximises it. When those extremes collide
/// (e.g. a square rotated by exactly 45 degrees) the points are ordered
/// clockwise around their centroid instead, starting from the top-left
/// candidate.
pub fn order_points(points: &[Point]) -> Result<Quad> {
    if points.iter().any(|p| !p.is_finite()) {
        return Err(ScanError::InvalidGeometry(
            "corner coordinates must be finite".to_string(),
        ));
    }

    let distinct = distinct_points(points);
    if distinct.len() != 4 {
        return Err(ScanError::InvalidGeometry(format!(
            "expected exactly 4 distinct points, got {}",
            distinct.len()
        )));
    }

    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.y - p.x;

    let top_left = arg_extreme(&distinct, sum, Ordering::Less);
    let bottom_right = arg_extreme(&distinct, sum, Ordering::Greater);
    let top_right = arg_extreme(&distinct, diff, Ordering::Less);
    let bottom_left = arg_extreme(&distinct, diff, Ordering::Greater);

    let mut slots = [top_left, top_right, bottom_right, bottom_left];
    let mut seen = slots;
    seen.sort_unstable();
    if seen.windows(2).any(|w| w[0] == w[1]) {
        slots = clockwise_from_top_left(&distinct);
    }

    Ok(Quad::new(slots.map(|i| distinct[i])))
}

fn distinct_points(points: &[Point]) -> Vec<Point> {
    let mut distinct: Vec<Point> = Vec::with_capacity(points.len());
    for point in points {
        if distinct
            .iter()
            .all(|p| p.distance(point) > COINCIDENT_EPSILON)
        {
            distinct.push(*point);
        }
    }
    distinct
}

/// Index of the first point whose key is extreme in the `wanted` direction.
fn arg_extreme(points: &[Point], key: impl Fn(&Point) -> f64, wanted: Ordering) -> usize {
    let mut best = 0;
    for i in 1..points.len() {
        if key(&points[i]).partial_cmp(&key(&points[best])) == Some(wanted) {
            best = i;
        }
    }
    best
}

fn clockwise_from_top_left(points: &[Point]) -> [usize; 4] {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / points.len() as f64;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / points.len() as f64;

    // With y pointing down, increasing atan2 runs clockwise on screen.
    let mut order = [0usize, 1, 2, 3];
    order.sort_by(|&a, &b| {
        let angle_a = (points[a].y - cy).atan2(points[a].x - cx);
        let angle_b = (points[b].y - cy).atan2(points[b].x - cx);
        angle_a.partial_cmp(&angle_b).unwrap_or(Ordering::Equal)
    });

    let start = (0..4)
        .min_by(|&a, &b| {
            let pa = points[order[a]];
            let pb = points[order[b]];
            (pa.x + pa.y)
                .partial_cmp(&(pb.x + pb.y))
                .unwrap_or(Ordering::Equal)
                .then(pa.y.partial_cmp(&pb.y).unwrap_or(Ordering::Equal))
        })
        .unwrap_or(0);
    order.rotate_left(start);
    order
}

// -- Homography ---------------------------------------------------------------

/// A projective transform between two quads.
#[derive(Debug, Clone, Copy)]
pub struct Homography {
    projection: Projection,
}

impl Homography {
    /// Map a point through the transform. Returns `None` for points sent to
    /// infinity.
    pub fn apply(&self, point: Point) -> Option<Point> {
        let (x, y) = self.projection * (point.x as f32, point.y as f32);
        let mapped = Point::new(f64::from(x), f64::from(y));
        mapped.is_finite().then_some(mapped)
    }

    pub fn inverse(&self) -> Self {
        Self {
            projection: self.projection.invert(),
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }
}

/// Compute the projective transform mapping `src` onto `dst`, corner for
/// corner.
///
/// Fails with `DegenerateGeometry` when three corners of either quad are
/// (nearly) collinear or coincident, or when no invertible transform fits
/// the correspondences.
pub fn compute_homography(src: &Quad, dst: &Quad) -> Result<Homography> {
    ensure_non_degenerate(src, "source")?;
    ensure_non_degenerate(dst, "destination")?;

    let control = |quad: &Quad| (*quad.points()).map(|p| (p.x as f32, p.y as f32));
    let projection =
        Projection::from_control_points(control(src), control(dst)).ok_or_else(|| {
            ScanError::DegenerateGeometry("no invertible transform fits the corners".to_string())
        })?;
    Ok(Homography { projection })
}

fn ensure_non_degenerate(quad: &Quad, role: &str) -> Result<()> {
    let points = quad.points();
    if points.iter().any(|p| !p.is_finite()) {
        return Err(ScanError::DegenerateGeometry(format!(
            "{role} quad has non-finite coordinates"
        )));
    }

    let (min_x, min_y, max_x, max_y) = quad.bounds();
    let extent = (max_x - min_x).max(max_y - min_y);
    if extent <= COINCIDENT_EPSILON {
        return Err(ScanError::DegenerateGeometry(format!(
            "{role} quad collapses to a point"
        )));
    }

    let tolerance = COLLINEAR_RATIO * extent * extent;
    for skip in 0..4 {
        let tri: Vec<&Point> = (0..4).filter(|&i| i != skip).map(|i| &points[i]).collect();
        let area = triangle_area(tri[0], tri[1], tri[2]);
        if area <= tolerance {
            return Err(ScanError::DegenerateGeometry(format!(
                "{role} quad has collinear or coincident corners"
            )));
        }
    }
    Ok(())
}

// -- Output dimensions ----------------------------------------------------------

/// Pixel size of the rectified output for a canonically ordered quad.
///
/// Width is the longer of the top and bottom edges, height the longer of
/// the left and right edges; both are floored and at least 1.
pub fn target_dimensions(quad: &Quad) -> (u32, u32) {
    let width = quad
        .top_left()
        .distance(&quad.top_right())
        .max(quad.bottom_left().distance(&quad.bottom_right()));
    let height = quad
        .top_left()
        .distance(&quad.bottom_left())
        .max(quad.top_right().distance(&quad.bottom_right()));
    (to_pixels(width), to_pixels(height))
}

fn to_pixels(length: f64) -> u32 {
    if length.is_finite() {
        (length.floor() as u32).max(1)
    } else {
        1
    }
}

// -- Polygon helpers ----------------------------------------------------------

fn cross(origin: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - origin.x) * (b.y - origin.y) - (a.y - origin.y) * (b.x - origin.x)
}

fn triangle_area(a: &Point, b: &Point, c: &Point) -> f64 {
    cross(a, b, c).abs() / 2.0
}

/// Unsigned polygon area via the shoelace formula.
pub fn shoelace_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            points[i].x * points[j].y - points[j].x * points[i].y
        })
        .sum();
    twice.abs() / 2.0
}

/// Perimeter of a closed polygon.
pub fn arc_length(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| points[i].distance(&points[(i + 1) % n])).sum()
}

/// Convex hull by Andrew's monotone chain, counter-clockwise in a y-up
/// frame (clockwise on screen). Collinear points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| {
        a.x.partial_cmp(&b.x)
            .unwrap_or(Ordering::Equal)
            .then(a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
    });
    sorted.dedup_by(|a, b| a.distance(b) <= COINCIDENT_EPSILON);
    if sorted.len() < 3 {
        return sorted;
    }

    let reversed: Vec<Point> = sorted.iter().rev().copied().collect();
    let mut hull: Vec<Point> = Vec::with_capacity(sorted.len() * 2);
    for pass in [sorted.as_slice(), reversed.as_slice()] {
        let floor = hull.len();
        for point in pass {
            while hull.len() >= floor + 2
                && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], point) <= 0.0
            {
                hull.pop();
            }
            hull.push(*point);
        }
        hull.pop();
    }
    hull
}

/// Simplify a closed curve with the Douglas-Peucker algorithm.
///
/// The curve is split at its first point and the point farthest from it,
/// and each half is simplified independently so the result stays closed.
pub fn approximate_polygon(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n <= 3 {
        return points.to_vec();
    }

    let far = (1..n)
        .max_by(|&a, &b| {
            points[0]
                .distance(&points[a])
                .partial_cmp(&points[0].distance(&points[b]))
                .unwrap_or(Ordering::Equal)
        })
        .unwrap_or(0);
    if points[0].distance(&points[far]) <= COINCIDENT_EPSILON {
        return vec![points[0]];
    }

    let mut keep = vec![false; n];
    let first_half: Vec<usize> = (0..=far).collect();
    let second_half: Vec<usize> = (far..n).chain(std::iter::once(0)).collect();
    douglas_peucker(points, &first_half, epsilon, &mut keep);
    douglas_peucker(points, &second_half, epsilon, &mut keep);

    keep.iter()
        .zip(points)
        .filter_map(|(&kept, point)| kept.then_some(*point))
        .collect()
}

/// Mark the points of `chain` (indices into `points`) that survive
/// simplification. Iterative to keep stack usage flat on long contours.
fn douglas_peucker(points: &[Point], chain: &[usize], epsilon: f64, keep: &mut [bool]) {
    let last = chain.len() - 1;
    keep[chain[0]] = true;
    keep[chain[last]] = true;

    let mut stack = vec![(0usize, last)];
    while let Some((start, end)) = stack.pop() {
        if end - start <= 1 {
            continue;
        }
        let a = &points[chain[start]];
        let b = &points[chain[end]];

        let mut max_dist = 0.0;
        let mut max_index = start;
        for i in (start + 1)..end {
            let dist = line_distance(&points[chain[i]], a, b);
            if dist > max_dist {
                max_dist = dist;
                max_index = i;
            }
        }

        if max_dist > epsilon {
            keep[chain[max_index]] = true;
            stack.push((start, max_index));
            stack.push((max_index, end));
        }
    }
}

/// Perpendicular distance from `point` to the line through `a` and `b`.
fn line_distance(point: &Point, a: &Point, b: &Point) -> f64 {
    let length = a.distance(b);
    if length <= COINCIDENT_EPSILON {
        return point.distance(a);
    }
    cross(a, b, point).abs() / length
}

/// Minimum-area enclosing rectangle by rotating calipers over the convex
/// hull. Returns `None` when the points span no area.
pub fn min_area_rect(points: &[Point]) -> Option<[Point; 4]> {
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return None;
    }

    let n = hull.len();
    let mut best: Option<(f64, [Point; 4])> = None;
    for i in 0..n {
        let origin = hull[i];
        let next = hull[(i + 1) % n];
        let length = origin.distance(&next);
        if length <= COINCIDENT_EPSILON {
            continue;
        }
        // Edge direction and its perpendicular.
        let (ux, uy) = ((next.x - origin.x) / length, (next.y - origin.y) / length);
        let (vx, vy) = (-uy, ux);

        let (mut min_u, mut max_u) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f64::INFINITY, f64::NEG_INFINITY);
        for p in &hull {
            let (dx, dy) = (p.x - origin.x, p.y - origin.y);
            let pu = dx * ux + dy * uy;
            let pv = dx * vx + dy * vy;
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }

        let area = (max_u - min_u) * (max_v - min_v);
        if best.as_ref().is_none_or(|(best_area, _)| area < *best_area) {
            let corner = |u: f64, v: f64| {
                Point::new(origin.x + u * ux + v * vx, origin.y + u * uy + v * vy)
            };
            best = Some((
                area,
                [
                    corner(min_u, min_v),
                    corner(max_u, min_v),
                    corner(max_u, max_v),
                    corner(min_u, max_v),
                ],
            ));
        }
    }

    best.and_then(|(area, corners)| (area > COINCIDENT_EPSILON).then_some(corners))
}

// -- Tests --------------------------------------------------------------------
