//! Shape-conformance analysis for captured part images.
//!
//! The pipeline is pure: intensity conversion, Otsu thresholding, foreground
//! masking, contour extraction, and a rectangularity score (foreground area
//! over bounding-box area). A part is defective when the score falls outside
//! the accepted band.

mod annotate;
mod contour;
mod threshold;

use std::path::Path;

use image::RgbImage;
use tracing::{error, info, warn};

pub use contour::{find_contours, largest_contour, BoundingBox, Contour};
pub use threshold::{foreground_mask, histogram, otsu_level, to_intensity};

/// Accepted rectangularity band. A perfect rectangle fills its bounding box
/// and scores near 1.0; irregular or partial shapes score lower. Calibrated
/// on the bench; recalibrate via `[analyzer]` config, not here.
pub const RECTANGULARITY_MIN: f64 = 0.70;
pub const RECTANGULARITY_MAX: f64 = 0.95;

/// Classification band for [`analyze_image`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub min: f64,
    pub max: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { min: RECTANGULARITY_MIN, max: RECTANGULARITY_MAX }
    }
}

/// Result of analyzing one frame. Produced once per frame, never mutated.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// `None` when no contour was found or the image could not be analyzed.
    pub rectangularity: Option<f64>,
    /// Annotated copy for operator review; `None` on the failure path.
    pub annotated: Option<RgbImage>,
    pub is_defective: bool,
}

impl Analysis {
    /// Fail-safe verdict: an unknown condition is treated as a reject.
    fn fail_safe() -> Self {
        Self { rectangularity: None, annotated: None, is_defective: true }
    }
}

/// Analyze an in-memory image for shape conformance.
///
/// A frame with no detectable contour is classified *not* defective and the
/// masked image is returned unchanged. That is an analysis result, distinct
/// from the decode-failure path in [`analyze_file`], which is an analysis
/// failure and rejects.
pub fn analyze_image(image: &RgbImage, thresholds: Thresholds) -> Analysis {
    let intensity = threshold::to_intensity(image);
    let level = threshold::otsu_level(&threshold::histogram(&intensity));
    let mask = threshold::foreground_mask(&intensity, level);
    let masked = threshold::apply_mask(&intensity, &mask);

    let contours = contour::find_contours(&mask);
    let Some(bbox) = contour::largest_contour(&contours).and_then(Contour::bounding_box) else {
        warn!("No contours found in the image");
        return Analysis {
            rectangularity: None,
            annotated: Some(annotate::gray_to_rgb(&masked)),
            is_defective: false,
        };
    };

    let object_area: u64 = mask.pixels().filter(|p| p.0[0] != 0).count() as u64;
    let rectangularity = object_area as f64 / bbox.area() as f64;

    let is_defective = rectangularity < thresholds.min || rectangularity > thresholds.max;
    info!(
        "Image analysis complete. Rectangularity: {:.4}, defective: {}",
        rectangularity, is_defective
    );

    Analysis {
        rectangularity: Some(rectangularity),
        annotated: Some(annotate::annotate(&masked, &bbox, rectangularity)),
        is_defective,
    }
}

/// Read and analyze a captured frame from disk.
///
/// Any failure to decode the file reports the fail-safe defective verdict.
pub fn analyze_file(path: &Path, thresholds: Thresholds) -> Analysis {
    info!("Analyzing image for defects: {:?}", path);
    match image::open(path) {
        Ok(img) => analyze_image(&img.to_rgb8(), thresholds),
        Err(e) => {
            error!("Error reading image {:?}: {}", path, e);
            Analysis::fail_safe()
        }
    }
}
