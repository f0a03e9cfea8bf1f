// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification — warp the region inside a quadrilateral into
// an axis-aligned, top-down rectangle.

use flatscan_core::config::BorderFill;
use flatscan_core::error::Result;
use flatscan_core::types::Quad;
use image::{ImageBuffer, Luma, Pixel, Rgb};
use imageproc::geometric_transformations::{Interpolation, warp_into_with};
use tracing::{debug, info, instrument};

use crate::geometry::{Homography, compute_homography, order_points, target_dimensions};
use crate::raster::Raster;
use crate::scan::color::clamp_u8;

/// How far inside the last row and column clamped samples are placed, so
/// bilinear interpolation still has a right and bottom neighbour.
const EDGE_INSET: f32 = 1e-3;

/// Warp `quad` (in any corner order) to a flat rectangle.
///
/// 1. Order the corners TL, TR, BR, BL
/// 2. Size the output from the longer of each pair of opposite edges
/// 3. Map the quad onto `(0,0), (W-1,0), (W-1,H-1), (0,H-1)`
/// 4. Sample every output pixel bilinearly through the inverse transform
///
/// Samples that fall outside the source take the value dictated by `fill`.
/// Collinear, coincident, or otherwise unusable corners are reported as
/// `InvalidGeometry` or `DegenerateGeometry`.
#[instrument(skip(image, quad), fields(width = image.width(), height = image.height()))]
pub fn rectify(image: &Raster, quad: &Quad, fill: BorderFill) -> Result<Raster> {
    image.ensure_non_empty()?;

    let ordered = order_points(quad.points())?;
    let (out_w, out_h) = target_dimensions(&ordered);
    let to_source = compute_homography(&ordered, &Quad::rectangle(out_w, out_h))?.inverse();
    debug!(out_w, out_h, "Rectification transform ready");

    let rectified = match image {
        Raster::Rgb(img) => {
            let warped = warp::<Rgb<f32>>(&widen(img), &to_source, out_w, out_h, fill);
            Raster::Rgb(narrow(&warped))
        }
        Raster::Gray(img) => {
            let warped = warp::<Luma<f32>>(&widen(img), &to_source, out_w, out_h, fill);
            Raster::Gray(narrow(&warped))
        }
    };

    info!(out_w, out_h, "Perspective rectified");
    Ok(rectified)
}

/// Fill a `width x height` buffer by pulling each pixel from `src` through
/// `to_source`.
///
/// Source positions within half a pixel of the image are clamped onto it.
/// Anything further out takes the constant fill, or is clamped as well
/// under [`BorderFill::Replicate`].
fn warp<Q>(
    src: &ImageBuffer<Q, Vec<f32>>,
    to_source: &Homography,
    width: u32,
    height: u32,
    fill: BorderFill,
) -> ImageBuffer<Q, Vec<f32>>
where
    Q: Pixel<Subpixel = f32> + Send + Sync,
{
    let (src_w, src_h) = src.dimensions();
    let max_x = (src_w as f32 - 1.0 - EDGE_INSET).max(0.0);
    let max_y = (src_h as f32 - 1.0 - EDGE_INSET).max(0.0);
    let (limit_x, limit_y) = (src_w as f32 - 0.5, src_h as f32 - 0.5);

    // Bilinear sampling needs two rows and two columns.
    let interpolation = if src_w > 1 && src_h > 1 {
        Interpolation::Bilinear
    } else {
        Interpolation::Nearest
    };

    let (default_sample, replicate) = match fill {
        BorderFill::Constant(value) => (f32::from(value), false),
        BorderFill::Replicate => (0.0, true),
    };
    let samples = vec![default_sample; usize::from(Q::CHANNEL_COUNT)];
    let default = *Q::from_slice(&samples);

    let projection = *to_source.projection();
    let mapping = move |x: f32, y: f32| {
        let (sx, sy) = projection * (x, y);
        let near = sx >= -0.5 && sy >= -0.5 && sx < limit_x && sy < limit_y;
        if replicate || near {
            (sx.clamp(0.0, max_x), sy.clamp(0.0, max_y))
        } else {
            (sx, sy)
        }
    };

    let mut out = ImageBuffer::new(width, height);
    warp_into_with(src, mapping, interpolation, default, &mut out);
    out
}

/// Copy 8-bit samples into an f32 buffer of the same layout, so
/// interpolation rounds once at the end instead of truncating per blend.
fn widen<P, Q>(src: &ImageBuffer<P, Vec<u8>>) -> ImageBuffer<Q, Vec<f32>>
where
    P: Pixel<Subpixel = u8>,
    Q: Pixel<Subpixel = f32>,
{
    let mut out = ImageBuffer::new(src.width(), src.height());
    for (dst, &sample) in out.iter_mut().zip(src.as_raw()) {
        *dst = f32::from(sample);
    }
    out
}

fn narrow<Q, P>(src: &ImageBuffer<Q, Vec<f32>>) -> ImageBuffer<P, Vec<u8>>
where
    Q: Pixel<Subpixel = f32>,
    P: Pixel<Subpixel = u8>,
{
    let mut out = ImageBuffer::new(src.width(), src.height());
    for (dst, &sample) in out.iter_mut().zip(src.as_raw()) {
        *dst = clamp_u8(sample);
    }
    out
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flatscan_core::error::ScanError;
    use flatscan_core::types::Point;
    use image::{GrayImage, RgbImage};

    fn page_value(u: f64, v: f64) -> f64 {
        20.0 + 150.0 * u + 80.0 * v
    }

    fn skewed_quad() -> Quad {
        Quad::new([
            Point::new(30.0, 20.0),
            Point::new(170.0, 35.0),
            Point::new(160.0, 140.0),
            Point::new(40.0, 130.0),
        ])
    }

    fn unit_square() -> Quad {
        Quad::new([
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ])
    }

    /// A 200x160 photo of a smooth page seen in perspective.
    fn photographed_page() -> GrayImage {
        let to_page = compute_homography(&skewed_quad(), &unit_square()).expect("homography");
        GrayImage::from_fn(200, 160, |x, y| {
            match to_page.apply(Point::new(f64::from(x), f64::from(y))) {
                Some(p) if (0.0..=1.0).contains(&p.x) && (0.0..=1.0).contains(&p.y) => {
                    Luma([page_value(p.x, p.y).round() as u8])
                }
                _ => Luma([0]),
            }
        })
    }

    #[test]
    fn recovers_page_from_perspective() {
        let photo = Raster::Gray(photographed_page());
        let flat = rectify(&photo, &skewed_quad(), BorderFill::Constant(0)).expect("rectify");
        let (w, h) = flat.dimensions();
        assert_eq!((w, h), (140, 110));

        let Raster::Gray(flat) = flat else {
            panic!("gray input must stay gray");
        };
        for j in 3..h - 3 {
            for i in 3..w - 3 {
                let expected = page_value(
                    f64::from(i) / f64::from(w - 1),
                    f64::from(j) / f64::from(h - 1),
                );
                let actual = f64::from(flat.get_pixel(i, j).0[0]);
                assert!(
                    (actual - expected).abs() <= 3.0,
                    "pixel ({i}, {j}) = {actual}, expected {expected:.1}"
                );
            }
        }
    }

    #[test]
    fn corner_order_does_not_matter() {
        let photo = Raster::Gray(photographed_page());
        let q = skewed_quad();
        let shuffled = Quad::new([q.0[2], q.0[0], q.0[3], q.0[1]]);
        let a = rectify(&photo, &q, BorderFill::Constant(0)).expect("ordered");
        let b = rectify(&photo, &shuffled, BorderFill::Constant(0)).expect("shuffled");
        assert_eq!(a, b);
    }

    #[test]
    fn rgb_stays_rgb() {
        let img = Raster::Rgb(RgbImage::from_pixel(50, 40, Rgb([10, 200, 30])));
        let quad = Quad::new([
            Point::new(5.0, 5.0),
            Point::new(45.0, 5.0),
            Point::new(45.0, 35.0),
            Point::new(5.0, 35.0),
        ]);
        let out = rectify(&img, &quad, BorderFill::Constant(0)).expect("rectify");
        assert_eq!(out.channels(), 3);
        assert_eq!(out.dimensions(), (40, 30));
        assert!(out.as_raw().chunks(3).all(|px| px == [10, 200, 30]));
    }

    #[test]
    fn full_frame_quad_reproduces_ramp() {
        let (w, h) = (120, 90);
        let ramp = RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 2) as u8, (y * 2) as u8, ((x + y) % 256) as u8])
        });
        let quad = Quad::rectangle(w, h);

        let out = rectify(&Raster::Rgb(ramp.clone()), &quad, BorderFill::Constant(0))
            .expect("rectify");
        assert_eq!(out.dimensions(), target_dimensions(&quad));
        assert_eq!(out.dimensions(), (w - 1, h - 1));

        let Raster::Rgb(out) = out else {
            panic!("rgb input must stay rgb");
        };
        let (out_w, out_h) = out.dimensions();
        // The output is one pixel smaller, so it samples the ramp at a
        // scale of (w - 1) / (out_w - 1).
        let sx = f64::from(w - 1) / f64::from(out_w - 1);
        let sy = f64::from(h - 1) / f64::from(out_h - 1);
        let mut worst = 0.0f64;
        for (i, j, px) in out.enumerate_pixels() {
            let (x, y) = (f64::from(i) * sx, f64::from(j) * sy);
            let expected = [2.0 * x, 2.0 * y];
            for (c, e) in expected.iter().enumerate() {
                worst = worst.max((f64::from(px.0[c]) - e).abs());
            }
        }
        assert!(worst <= 1.0, "max error {worst}");
        assert_eq!(out.get_pixel(out_w - 1, out_h - 1).0[..2], [238, 178]);
    }

    #[test]
    fn constant_fill_outside_source() {
        let img = Raster::Gray(GrayImage::from_pixel(20, 20, Luma([100])));
        let quad = Quad::new([
            Point::new(-10.0, -10.0),
            Point::new(29.0, -10.0),
            Point::new(29.0, 29.0),
            Point::new(-10.0, 29.0),
        ]);
        let out = rectify(&img, &quad, BorderFill::Constant(7)).expect("rectify");
        assert_eq!(out.as_raw()[0], 7);
        let (w, h) = out.dimensions();
        assert_eq!(out.as_raw()[(h / 2 * w + w / 2) as usize], 100);
    }

    #[test]
    fn replicate_fill_extends_edges() {
        let img = Raster::Gray(GrayImage::from_fn(20, 20, |x, _| {
            Luma([if x < 10 { 50 } else { 150 }])
        }));
        let quad = Quad::new([
            Point::new(-10.0, -10.0),
            Point::new(29.0, -10.0),
            Point::new(29.0, 29.0),
            Point::new(-10.0, 29.0),
        ]);
        let out = rectify(&img, &quad, BorderFill::Replicate).expect("rectify");
        let (w, _) = out.dimensions();
        assert_eq!(out.as_raw()[0], 50);
        assert_eq!(out.as_raw()[(w - 1) as usize], 150);
    }

    #[test]
    fn collinear_corners_are_degenerate() {
        let img = Raster::Gray(GrayImage::from_pixel(20, 20, Luma([100])));
        let quad = Quad::new([
            Point::new(0.0, 0.0),
            Point::new(5.0, 5.0),
            Point::new(10.0, 10.0),
            Point::new(15.0, 15.0),
        ]);
        let err = rectify(&img, &quad, BorderFill::Constant(0)).unwrap_err();
        assert!(err.is_geometric(), "unexpected error {err}");
    }

    #[test]
    fn repeated_corners_are_invalid() {
        let img = Raster::Gray(GrayImage::from_pixel(20, 20, Luma([100])));
        let p = Point::new(3.0, 3.0);
        let quad = Quad::new([p, p, p, Point::new(10.0, 10.0)]);
        let err = rectify(&img, &quad, BorderFill::Constant(0)).unwrap_err();
        assert!(matches!(err, ScanError::InvalidGeometry(_)));
    }

    #[test]
    fn input_is_left_untouched() {
        let photo = Raster::Gray(photographed_page());
        let before = photo.clone();
        let _ = rectify(&photo, &skewed_quad(), BorderFill::Replicate).expect("rectify");
        assert_eq!(photo, before);
    }
}
