//! Pure calculation functions for rendition dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Default bound on the longer side of the overview rendition.
pub const DEFAULT_MAX_SIDE_LENGTH: u32 = 1024;

/// Calculate output dimensions that fit inside a `max_side` square while
/// preserving the source aspect ratio.
///
/// The longer source side is clamped to `max_side` (never enlarged) and the
/// shorter side is scaled by the same factor, rounded half away from zero.
/// A side that would round to zero is clamped to one pixel.
///
/// # Examples
/// ```
/// # use nitf_renditions::imaging::calculate_output_dimensions;
/// assert_eq!(calculate_output_dimensions(4000, 3000, 1024), (1024, 768));
/// assert_eq!(calculate_output_dimensions(3000, 4000, 1024), (768, 1024));
/// // Smaller sources are never upscaled
/// assert_eq!(calculate_output_dimensions(500, 400, 1024), (500, 400));
/// ```
pub fn calculate_output_dimensions(width: u32, height: u32, max_side: u32) -> (u32, u32) {
    if width >= height {
        let out_w = width.min(max_side);
        let out_h = scale_side(height, out_w, width);
        (out_w, out_h)
    } else {
        let out_h = height.min(max_side);
        let out_w = scale_side(width, out_h, height);
        (out_w, out_h)
    }
}

/// Scale `side` by `numerator / denominator`, rounded, at least 1.
fn scale_side(side: u32, numerator: u32, denominator: u32) -> u32 {
    let scaled = (side as f64 * numerator as f64 / denominator as f64).round();
    (scaled as u32).max(1)
}

/// Resolve the overview side bound, substituting the default for zero.
pub fn effective_max_side(configured: u32) -> u32 {
    if configured == 0 {
        log::debug!(
            "overview max side length must be positive, using default {}",
            DEFAULT_MAX_SIDE_LENGTH
        );
        DEFAULT_MAX_SIDE_LENGTH
    } else {
        configured
    }
}
