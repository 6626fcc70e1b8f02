//! Global Otsu thresholding over the intensity channel.

use image::{GrayImage, RgbImage};

/// Collapse an RGB image to a single intensity channel by averaging channels.
pub fn to_intensity(image: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let mean = (u16::from(r) + u16::from(g) + u16::from(b)) / 3;
        gray.put_pixel(x, y, image::Luma([mean as u8]));
    }
    gray
}

/// 256-bin intensity histogram.
pub fn histogram(image: &GrayImage) -> [u64; 256] {
    let mut hist = [0u64; 256];
    for pixel in image.pixels() {
        hist[pixel.0[0] as usize] += 1;
    }
    hist
}

/// Otsu's threshold: the level that maximizes between-class variance.
///
/// Pixels at or below the returned level belong to the lower (darker) class.
/// Adaptive separation matters here because illumination varies between
/// captures; there is no manually tuned level.
pub fn otsu_level(hist: &[u64; 256]) -> u8 {
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }

    let weighted_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut best_level = 0u8;
    let mut best_variance = f64::NEG_INFINITY;
    let mut background_count = 0u64;
    let mut background_sum = 0.0f64;

    for level in 0..256usize {
        background_count += hist[level];
        if background_count == 0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0 {
            break;
        }

        background_sum += level as f64 * hist[level] as f64;
        let w0 = background_count as f64;
        let w1 = foreground_count as f64;
        let mean0 = background_sum / w0;
        let mean1 = (weighted_total - background_sum) / w1;
        let variance = w0 * w1 * (mean0 - mean1) * (mean0 - mean1);

        if variance > best_variance {
            best_variance = variance;
            best_level = level as u8;
        }
    }

    best_level
}

/// Binary foreground mask: the complement of the Otsu-separated region.
/// Pixels at or below the threshold are treated as object (value 1).
pub fn foreground_mask(intensity: &GrayImage, level: u8) -> GrayImage {
    let mut mask = GrayImage::new(intensity.width(), intensity.height());
    for (x, y, pixel) in intensity.enumerate_pixels() {
        let value = if pixel.0[0] <= level { 1 } else { 0 };
        mask.put_pixel(x, y, image::Luma([value]));
    }
    mask
}

/// Apply the mask to the intensity image, zeroing background.
pub fn apply_mask(intensity: &GrayImage, mask: &GrayImage) -> GrayImage {
    let mut masked = GrayImage::new(intensity.width(), intensity.height());
    for (x, y, pixel) in intensity.enumerate_pixels() {
        let value = if mask.get_pixel(x, y).0[0] != 0 {
            pixel.0[0]
        } else {
            0
        };
        masked.put_pixel(x, y, image::Luma([value]));
    }
    masked
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn bimodal_image(dark: u8, light: u8) -> GrayImage {
        // Left half dark, right half light.
        let mut img = GrayImage::new(20, 10);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            pixel.0[0] = if x < 10 { dark } else { light };
        }
        img
    }

    #[test]
    fn test_to_intensity_averages_channels() {
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([30, 60, 90]));
        let gray = to_intensity(&img);
        assert_eq!(gray.get_pixel(0, 0).0[0], 60);
    }

    #[test]
    fn test_otsu_separates_bimodal() {
        let img = bimodal_image(10, 200);
        let level = otsu_level(&histogram(&img));
        assert!(level >= 10 && level < 200, "level {} outside modes", level);
    }

    #[test]
    fn test_otsu_uniform_image() {
        let img = bimodal_image(80, 80);
        let level = otsu_level(&histogram(&img));
        // Single class: every split is equally bad; the level must still be
        // a valid bin and must not classify nothing below the upper mode.
        assert!(level <= 80);
    }

    #[test]
    fn test_otsu_empty_histogram() {
        assert_eq!(otsu_level(&[0u64; 256]), 0);
    }

    #[test]
    fn test_foreground_is_dark_side() {
        let img = bimodal_image(10, 200);
        let level = otsu_level(&histogram(&img));
        let mask = foreground_mask(&img, level);
        assert_eq!(mask.get_pixel(0, 0).0[0], 1);
        assert_eq!(mask.get_pixel(19, 0).0[0], 0);
    }

    #[test]
    fn test_apply_mask_zeroes_background() {
        let img = bimodal_image(10, 200);
        let level = otsu_level(&histogram(&img));
        let mask = foreground_mask(&img, level);
        let masked = apply_mask(&img, &mask);
        assert_eq!(masked.get_pixel(0, 0).0[0], 10);
        assert_eq!(masked.get_pixel(19, 0).0[0], 0);
    }
}
