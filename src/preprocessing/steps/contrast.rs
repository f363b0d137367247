//! Contrast normalization: global histogram equalization and CLAHE.
//!
//! CLAHE on color input runs on the luma plane of a YCbCr split; chroma is
//! left untouched and the merge back to RGB clamps into the 8-bit gamut.

use crate::error::PrepError;
use crate::preprocessing::steps::Deadline;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;

/// Global histogram equalization. Output: Luma8.
pub fn equalize(image: DynamicImage) -> Result<DynamicImage, PrepError> {
    Ok(DynamicImage::ImageLuma8(equalize_histogram(&image.to_luma8())))
}

/// Contrast-limited adaptive histogram equalization.
///
/// `clip_limit` is relative to a flat histogram (OpenCV convention);
/// `tile_grid` is the number of tiles along each axis. Output keeps the
/// input's depth: Luma8 for single-channel input, Rgb8 otherwise.
pub fn clahe(
    image: DynamicImage,
    clip_limit: f32,
    tile_grid: u32,
) -> Result<DynamicImage, PrepError> {
    clahe_until(image, clip_limit, tile_grid, Deadline::unbounded())
}

/// [`clahe`] that gives up with `DeadlineExceeded` once `deadline` passes
pub fn clahe_until(
    image: DynamicImage,
    clip_limit: f32,
    tile_grid: u32,
    deadline: Deadline,
) -> Result<DynamicImage, PrepError> {
    if !(clip_limit.is_finite() && clip_limit > 0.0) {
        return Err(PrepError::InvalidRequest(format!(
            "CLAHE clip limit must be positive, got {}",
            clip_limit
        )));
    }
    if !(1..=64).contains(&tile_grid) {
        return Err(PrepError::InvalidRequest(format!(
            "CLAHE tile grid must be within 1..=64, got {}",
            tile_grid
        )));
    }

    Ok(match image {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(clahe_gray(&gray, clip_limit, tile_grid, deadline)?)
        }
        other => {
            let rgb = other.to_rgb8();
            DynamicImage::ImageRgb8(clahe_rgb(&rgb, clip_limit, tile_grid, deadline)?)
        }
    })
}

pub fn clahe_rgb(
    rgb: &RgbImage,
    clip_limit: f32,
    tile_grid: u32,
    deadline: Deadline,
) -> Result<RgbImage, PrepError> {
    let (luma, chroma) = split_ycbcr(rgb);
    let equalized = clahe_gray(&luma, clip_limit, tile_grid, deadline)?;
    Ok(merge_ycbcr(&equalized, &chroma))
}

/// Tiled CLAHE on one plane; `deadline` is checked per tile row and per
/// output row.
pub fn clahe_gray(
    gray: &GrayImage,
    clip_limit: f32,
    tile_grid: u32,
    deadline: Deadline,
) -> Result<GrayImage, PrepError> {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return Ok(gray.clone());
    }

    let tile_w = width.div_ceil(tile_grid).max(1);
    let tile_h = height.div_ceil(tile_grid).max(1);
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        deadline.check()?;
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(gray, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        deadline.check()?;
        let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);
        for x in 0..width {
            let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
            let v = gray.get_pixel(x, y).0[0] as usize;

            let top = lut_at(tx0, ty0)[v] * (1.0 - ax) + lut_at(tx1, ty0)[v] * ax;
            let bottom = lut_at(tx0, ty1)[v] * (1.0 - ax) + lut_at(tx1, ty1)[v] * ax;
            let value = top * (1.0 - ay) + bottom * ay;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    Ok(out)
}

/// The two tile centres bracketing `pos` and the weight of the second one
fn neighbours(pos: u32, tile: u32, count: u32) -> (u32, u32, f32) {
    let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
    let base = f.floor();
    let weight = f - base;
    let last = count as i64 - 1;
    let first = (base as i64).clamp(0, last) as u32;
    let second = (base as i64 + 1).clamp(0, last) as u32;
    (first, second, weight)
}

fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [f32; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let area = (x1 - x0) * (y1 - y0);

    // Clip the histogram and spread the excess evenly over all bins
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let mut lut = [0f32; 256];
    let scale = 255.0 / area as f32;
    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = cdf as f32 * scale;
    }
    lut
}

/// BT.601 full-range split into a luma plane and (Cb, Cr) pairs
fn split_ycbcr(rgb: &RgbImage) -> (GrayImage, Vec<(f32, f32)>) {
    let mut chroma = Vec::with_capacity((rgb.width() * rgb.height()) as usize);
    let luma = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0.map(f32::from);
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    });
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0.map(f32::from);
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        chroma.push((cb, cr));
    }
    (luma, chroma)
}

fn merge_ycbcr(luma: &GrayImage, chroma: &[(f32, f32)]) -> RgbImage {
    let width = luma.width();
    RgbImage::from_fn(width, luma.height(), |x, y| {
        let l = luma.get_pixel(x, y).0[0] as f32;
        let (cb, cr) = chroma[(y * width + x) as usize];
        let r = l + 1.402 * (cr - 128.0);
        let g = l - 0.344_136 * (cb - 128.0) - 0.714_136 * (cr - 128.0);
        let b = l + 1.772 * (cb - 128.0);
        Rgb([r, g, b].map(|c| c.round().clamp(0.0, 255.0) as u8))
    })
}
