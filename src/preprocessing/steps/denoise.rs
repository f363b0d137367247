use crate::error::PrepError;
use crate::preprocessing::steps::Deadline;
use image::{DynamicImage, Rgb, RgbImage};

/// Patch side used to compare neighbourhoods
const PATCH_RADIUS: i32 = 1;
/// Search window around each pixel
const SEARCH_RADIUS: i32 = 3;
/// Filter strength; larger values smooth more
const H: f32 = 10.0;
/// Number of smoothing passes
pub const PASSES: usize = 2;

/// Multi-pass non-local means smoothing on color images.
/// Meant for brightened low-light photos, where amplified sensor noise would
/// otherwise dominate. Output: Rgb8.
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PrepError> {
    apply_until(image, Deadline::unbounded())
}

/// [`apply`] that gives up with `DeadlineExceeded` once `deadline` passes.
/// The deadline is checked before every output row.
pub fn apply_until(image: DynamicImage, deadline: Deadline) -> Result<DynamicImage, PrepError> {
    let mut rgb = image.into_rgb8();
    for _ in 0..PASSES {
        rgb = non_local_means(&rgb, H, deadline)?;
    }
    Ok(DynamicImage::ImageRgb8(rgb))
}

/// Single NLM pass. Patch distance uses all three channels so colors are
/// averaged only with genuinely similar neighbourhoods.
pub fn non_local_means(img: &RgbImage, h: f32, deadline: Deadline) -> Result<RgbImage, PrepError> {
    let (width, height) = img.dimensions();
    let (w, hgt) = (width as i32, height as i32);
    let patch_area = ((2 * PATCH_RADIUS + 1).pow(2) * 3) as f32;
    let h2 = h * h;

    let at = |x: i32, y: i32| {
        img.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, hgt - 1) as u32).0
    };

    let mut out = RgbImage::new(width, height);
    for y in 0..hgt {
        deadline.check()?;
        for x in 0..w {
            let mut acc = [0f32; 3];
            let mut total = 0f32;

            for sy in (y - SEARCH_RADIUS).max(0)..=(y + SEARCH_RADIUS).min(hgt - 1) {
                for sx in (x - SEARCH_RADIUS).max(0)..=(x + SEARCH_RADIUS).min(w - 1) {
                    let mut dist = 0f32;
                    for py in -PATCH_RADIUS..=PATCH_RADIUS {
                        for px in -PATCH_RADIUS..=PATCH_RADIUS {
                            let a = at(x + px, y + py);
                            let b = at(sx + px, sy + py);
                            for c in 0..3 {
                                let d = a[c] as f32 - b[c] as f32;
                                dist += d * d;
                            }
                        }
                    }
                    let weight = (-(dist / patch_area) / h2).exp();
                    let p = at(sx, sy);
                    for c in 0..3 {
                        acc[c] += weight * p[c] as f32;
                    }
                    total += weight;
                }
            }

            let value = std::array::from_fn(|c| (acc[c] / total).round().clamp(0.0, 255.0) as u8);
            out.put_pixel(x as u32, y as u32, Rgb(value));
        }
    }
    Ok(out)
}
