use crate::error::PrepError;
use crate::preprocessing::steps::Deadline;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;

/// Foreground value of every binarized image
pub const FOREGROUND: u8 = 255;

/// Adaptive must find at least this share of Otsu's foreground to be kept
const FALLBACK_RATIO: f64 = 0.5;

/// Which binarization a fallback decision kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binarization {
    Adaptive,
    Otsu,
}

/// Local mean thresholding with inverted polarity.
///
/// A pixel becomes foreground (255) when it is not brighter than the mean of
/// its `block_size` x `block_size` neighbourhood minus `c`, so dark ink on a
/// light page comes out high. Output: Luma8, values 0 or 255.
pub fn adaptive(image: DynamicImage, block_size: u32, c: i32) -> Result<DynamicImage, PrepError> {
    adaptive_until(image, block_size, c, Deadline::unbounded())
}

/// [`adaptive`] that gives up with `DeadlineExceeded` once `deadline` passes
pub fn adaptive_until(
    image: DynamicImage,
    block_size: u32,
    c: i32,
    deadline: Deadline,
) -> Result<DynamicImage, PrepError> {
    validate_block_size(block_size)?;
    let gray = image.to_luma8();
    Ok(DynamicImage::ImageLuma8(adaptive_threshold(&gray, block_size, c, deadline)?))
}

/// Global Otsu binarization with inverted polarity. Output: Luma8, 0 or 255.
pub fn otsu(image: DynamicImage) -> Result<DynamicImage, PrepError> {
    Ok(DynamicImage::ImageLuma8(otsu_threshold(&image.to_luma8())))
}

/// Adaptive threshold that falls back to Otsu when the local pass finds too
/// little foreground. Output: Luma8, 0 or 255.
pub fn binarize(image: DynamicImage, block_size: u32, c: i32) -> Result<DynamicImage, PrepError> {
    binarize_until(image, block_size, c, Deadline::unbounded())
}

/// [`binarize`] that gives up with `DeadlineExceeded` once `deadline` passes
pub fn binarize_until(
    image: DynamicImage,
    block_size: u32,
    c: i32,
    deadline: Deadline,
) -> Result<DynamicImage, PrepError> {
    validate_block_size(block_size)?;
    let gray = image.to_luma8();
    let (binary, choice) = choose_binarization(
        adaptive_threshold(&gray, block_size, c, deadline)?,
        otsu_threshold(&gray),
    );
    tracing::debug!("Binarization kept {:?} output", choice);
    Ok(DynamicImage::ImageLuma8(binary))
}

/// Keep the adaptive result unless its foreground count is below half of
/// Otsu's foreground count.
pub fn choose_binarization(adaptive: GrayImage, otsu: GrayImage) -> (GrayImage, Binarization) {
    let adaptive_count = foreground_count(&adaptive) as f64;
    let otsu_count = foreground_count(&otsu) as f64;

    if adaptive_count < FALLBACK_RATIO * otsu_count {
        (otsu, Binarization::Otsu)
    } else {
        (adaptive, Binarization::Adaptive)
    }
}

pub fn foreground_count(img: &GrayImage) -> usize {
    img.pixels().filter(|p| p.0[0] != 0).count()
}

fn validate_block_size(block_size: u32) -> Result<(), PrepError> {
    if block_size < 3 || block_size % 2 == 0 {
        return Err(PrepError::InvalidRequest(format!(
            "adaptive threshold block size must be odd and >= 3, got {}",
            block_size
        )));
    }
    Ok(())
}

/// Mean adaptive thresholding over a clamped window; `deadline` is checked
/// before every row.
pub fn adaptive_threshold(
    img: &GrayImage,
    block_size: u32,
    c: i32,
    deadline: Deadline,
) -> Result<GrayImage, PrepError> {
    let (width, height) = img.dimensions();
    let half_window = block_size as i32 / 2;

    // Precompute integral image for constant-time window sums
    let integral = compute_integral_image(img);

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        deadline.check()?;
        let y1 = (y as i32 - half_window).max(0) as u32;
        let y2 = (y as i32 + half_window).min(height as i32 - 1) as u32;
        for x in 0..width {
            let x1 = (x as i32 - half_window).max(0) as u32;
            let x2 = (x as i32 + half_window).min(width as i32 - 1) as u32;

            let threshold = window_mean(&integral, x1, y1, x2, y2) - c as f64;

            let pixel = img.get_pixel(x, y).0[0] as f64;
            let value = if pixel > threshold { 0u8 } else { FOREGROUND };
            out.put_pixel(x, y, Luma([value]));
        }
    }
    Ok(out)
}

pub fn otsu_threshold(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        if img.get_pixel(x, y).0[0] > level {
            Luma([0u8])
        } else {
            Luma([FOREGROUND])
        }
    })
}

fn compute_integral_image(img: &GrayImage) -> Vec<Vec<f64>> {
    let (width, height) = img.dimensions();
    let mut integral = vec![vec![0.0f64; width as usize + 1]; height as usize + 1];

    for y in 0..height as usize {
        for x in 0..width as usize {
            let val = img.get_pixel(x as u32, y as u32).0[0] as f64;
            integral[y + 1][x + 1] =
                val + integral[y][x + 1] + integral[y + 1][x] - integral[y][x];
        }
    }

    integral
}

fn window_mean(integral: &[Vec<f64>], x1: u32, y1: u32, x2: u32, y2: u32) -> f64 {
    let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize + 1, y2 as usize + 1);
    let area = ((x2 - x1) * (y2 - y1)) as f64;
    let sum = integral[y2][x2] - integral[y1][x2] - integral[y2][x1] + integral[y1][x1];
    sum / area
}
