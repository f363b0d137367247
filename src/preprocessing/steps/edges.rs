use crate::error::PrepError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::edges::canny;

/// Minimum allowed hysteresis threshold
pub const MIN_THRESHOLD: f32 = 1.0;

/// Canny edge map: 255 on edges, 0 elsewhere. Output: Luma8.
pub fn apply(image: DynamicImage, low: f32, high: f32) -> Result<DynamicImage, PrepError> {
    Ok(DynamicImage::ImageLuma8(edge_map(&image.to_luma8(), low, high)))
}

/// Refine an already binarized image: its Canny edges are OR-ed into it
/// rather than replacing it. Output: Luma8.
pub fn union(image: DynamicImage, low: f32, high: f32) -> Result<DynamicImage, PrepError> {
    let binary = image.to_luma8();
    let edges = edge_map(&binary, low, high);
    Ok(DynamicImage::ImageLuma8(bitwise_or(&binary, &edges)))
}

/// Thresholds are clamped to `MIN_THRESHOLD` and `low <= high`
pub fn edge_map(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let high = high.max(MIN_THRESHOLD);
    let low = low.max(MIN_THRESHOLD).min(high);
    canny(gray, low, high)
}

pub fn bitwise_or(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y).0[0] | b.get_pixel(x, y).0[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_image() -> GrayImage {
        GrayImage::from_fn(30, 30, |x, y| {
            if (10..20).contains(&x) && (10..20).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_edge_map_finds_square_outline() {
        let edges = edge_map(&square_image(), 100.0, 200.0);
        assert!(edges.pixels().any(|p| p.0[0] == 255));
        // Far from the boundary there is no gradient
        assert_eq!(edges.get_pixel(2, 2).0[0], 0);
        assert_eq!(edges.get_pixel(15, 15).0[0], 0);
    }

    #[test]
    fn test_union_never_removes_foreground() {
        let binary = square_image();
        let result = union(DynamicImage::ImageLuma8(binary.clone()), 100.0, 200.0)
            .unwrap()
            .to_luma8();
        for (x, y, p) in binary.enumerate_pixels() {
            if p.0[0] == 255 {
                assert_eq!(result.get_pixel(x, y).0[0], 255);
            }
        }
    }

    #[test]
    fn test_inverted_thresholds_are_clamped() {
        let img = square_image();
        assert_eq!(edge_map(&img, 200.0, 100.0), edge_map(&img, 100.0, 100.0));
    }
}
