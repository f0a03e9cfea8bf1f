// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contrast-limited adaptive histogram equalization (CLAHE) on a single
// 8-bit channel.
//
// The image is cut into a grid of tiles. Each tile gets its own
// equalization lookup table built from a clipped histogram, and every
// output pixel is bilinearly interpolated between the tables of the four
// nearest tile centres, so tile seams do not show.

use image::GrayImage;

use super::color::clamp_u8;

const BINS: usize = 256;

/// Apply CLAHE with a `grid` of (columns, rows) tiles.
///
/// `clip_limit` is relative to a flat histogram: a bin may hold at most
/// `clip_limit * tile_area / 256` samples (never fewer than one) before
/// the excess is spread evenly over all bins. A zero or negative clip
/// limit leaves the image unchanged.
pub fn clahe(image: &GrayImage, grid: (u32, u32), clip_limit: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || clip_limit <= 0.0 {
        return image.clone();
    }

    let (tile_w, tiles_x) = tile_layout(width, grid.0);
    let (tile_h, tiles_y) = tile_layout(height, grid.1);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(image, x0, y0, x1, y1, clip_limit));
        }
    }
    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y).0[0] as usize;

        let (tx0, tx1, wx) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, wy) = neighbours(y, tile_h, tiles_y);

        let top = f32::from(lut_at(tx0, ty0)[value]) * (1.0 - wx)
            + f32::from(lut_at(tx1, ty0)[value]) * wx;
        let bottom = f32::from(lut_at(tx0, ty1)[value]) * (1.0 - wx)
            + f32::from(lut_at(tx1, ty1)[value]) * wx;

        image::Luma([clamp_u8(top * (1.0 - wy) + bottom * wy)])
    })
}

/// Tile edge length and resulting tile count along one axis. The count is
/// reduced when the requested grid is finer than the image allows, so no
/// tile is empty.
fn tile_layout(length: u32, requested: u32) -> (u32, u32) {
    let requested = requested.clamp(1, length);
    let tile = length.div_ceil(requested);
    (tile, length.div_ceil(tile))
}

/// The two tile indices whose centres bracket `pos`, and the weight of the
/// second one.
fn neighbours(pos: u32, tile: u32, tiles: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if f <= 0.0 {
        return (0, 0, 0.0);
    }
    let last = tiles - 1;
    let lower = (f.floor() as u32).min(last);
    if lower >= last {
        return (last, last, 0.0);
    }
    (lower, lower + 1, f - lower as f32)
}

fn tile_lut(image: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; BINS] {
    let mut hist = [0u32; BINS];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[image.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    let clip = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);
    clip_histogram(&mut hist, clip);

    let scale = 255.0 / area as f32;
    let mut lut = [0u8; BINS];
    let mut cumulative = 0u32;
    for (entry, count) in lut.iter_mut().zip(hist) {
        cumulative += count;
        *entry = clamp_u8(cumulative as f32 * scale);
    }
    lut
}

/// Clip every bin at `clip` and spread the excess: an equal share to every
/// bin, then the remainder one sample at a time at a regular stride.
fn clip_histogram(hist: &mut [u32; BINS], clip: u32) {
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    if excess == 0 {
        return;
    }

    let share = excess / BINS as u32;
    let mut remainder = excess % BINS as u32;
    for count in hist.iter_mut() {
        *count += share;
    }
    if remainder > 0 {
        let stride = (BINS as u32 / remainder).max(1) as usize;
        for count in hist.iter_mut().step_by(stride) {
            if remainder == 0 {
                break;
            }
            *count += 1;
            remainder -= 1;
        }
    }
}
