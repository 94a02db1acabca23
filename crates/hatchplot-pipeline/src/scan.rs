//! Row scanning: find dark runs and reduce each to its endpoints.
//!
//! Rows `0, s, 2s, ...` below the canvas height are scanned left to
//! right. Each maximal run of dark pixels becomes one [`Segment`] from
//! its first to its last dark column; interior pixels are dropped.
//! Output is ordered by row, then by column, and no state is carried
//! from one row to the next.

use std::num::NonZeroU32;

use image::{Rgb, RgbImage};
use tracing::debug;

use crate::types::{PipelineError, Segment};

/// ITU-R BT.709 luma weights for R, G, B, in units of 1/10000.
///
/// Integer weights summing to exactly 10000 keep the dark test exact:
/// pure white has luma 255 and is never below any threshold.
pub const LUMA_WEIGHTS: [u32; 3] = [2126, 7152, 722];

const LUMA_SCALE: u32 = 10_000;

/// Luma scaled by 10000, so `0..=2_550_000`.
fn scaled_luma(pixel: Rgb<u8>) -> u32 {
    let Rgb([r, g, b]) = pixel;
    LUMA_WEIGHTS[0] * u32::from(r) + LUMA_WEIGHTS[1] * u32::from(g) + LUMA_WEIGHTS[2] * u32::from(b)
}

/// BT.709 luma of an RGB pixel, in `0.0..=255.0`.
#[must_use]
pub fn luma(pixel: Rgb<u8>) -> f64 {
    f64::from(scaled_luma(pixel)) / f64::from(LUMA_SCALE)
}

/// Whether the pixel at `(x, y)` is darker than `threshold`.
///
/// Out-of-bounds reads count as white and are never dark.
#[must_use]
pub fn is_dark(image: &RgbImage, x: u32, y: u32, threshold: u8) -> bool {
    image
        .get_pixel_checked(x, y)
        .is_some_and(|p| scaled_luma(*p) < u32::from(threshold) * LUMA_SCALE)
}

/// Number of rows [`scan_runs`] visits for a canvas of `height` pixels.
#[must_use]
pub fn rows_scanned(height: u32, spacing: NonZeroU32) -> u32 {
    height.div_ceil(spacing.get())
}

/// Scan every `spacing`-th row and return one segment per dark run.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceExhaustion`] if the segment list
/// cannot grow.
pub fn scan_runs(
    image: &RgbImage,
    spacing: NonZeroU32,
    threshold: u8,
) -> Result<Vec<Segment>, PipelineError> {
    let mut segments = Vec::new();
    for y in (0..image.height()).step_by(spacing.get() as usize) {
        scan_row(image, y, threshold, &mut segments)?;
    }
    debug!(
        rows = rows_scanned(image.height(), spacing),
        runs = segments.len(),
        threshold,
        "scanned buffer"
    );
    Ok(segments)
}

/// Append the dark runs of row `y` to `out`, left to right.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceExhaustion`] if `out` cannot grow.
pub fn scan_row(
    image: &RgbImage,
    y: u32,
    threshold: u8,
    out: &mut Vec<Segment>,
) -> Result<(), PipelineError> {
    let mut run_start: Option<u32> = None;
    for x in 0..image.width() {
        match (is_dark(image, x, y, threshold), run_start) {
            (true, None) => run_start = Some(x),
            (false, Some(first)) => {
                push_segment(out, Segment::horizontal(y, first, x - 1))?;
                run_start = None;
            }
            _ => {}
        }
    }
    // A run touching the right edge closes at the last column.
    if let Some(first) = run_start {
        push_segment(out, Segment::horizontal(y, first, image.width() - 1))?;
    }
    Ok(())
}

fn push_segment(out: &mut Vec<Segment>, segment: Segment) -> Result<(), PipelineError> {
    out.try_reserve(1).map_err(|e| {
        PipelineError::ResourceExhaustion(format!(
            "cannot grow segment list past {} entries: {e}",
            out.len()
        ))
    })?;
    out.push(segment);
    Ok(())
}
