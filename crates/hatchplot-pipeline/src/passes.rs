//! Pass planning and per-pass scanning.
//!
//! `N` passes are spread evenly over a half-turn starting at the base
//! angle, so repeated passes cross-hatch instead of retracing each other.
//! Each pass rotates the shared scaled buffer, scans it, and converts the
//! resulting pixel-space segments to physical-space strokes.

use std::num::NonZeroU32;

use image::RgbImage;
use tracing::debug;

use crate::types::{Dimensions, Pass, PipelineError, Resolution, Segment};

/// Normalize an angle in degrees into `[0, 360)`.
#[must_use]
pub fn normalize_angle(angle_deg: f64) -> f64 {
    let a = angle_deg.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs.
    if a >= 360.0 { 0.0 } else { a }
}

/// Angles for `passes` passes: `base + p * 180 / passes`, normalized.
#[must_use]
pub fn pass_angles(base_angle_deg: f64, passes: NonZeroU32) -> Vec<f64> {
    let step = 180.0 / f64::from(passes.get());
    (0..passes.get())
        .map(|p| normalize_angle(f64::from(p).mul_add(step, base_angle_deg)))
        .collect()
}

/// Hatch line spacing in whole pixels, never less than one.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn line_spacing_px(line_spacing_mm: f64, resolution: Resolution) -> NonZeroU32 {
    let px = (line_spacing_mm * resolution.px_per_mm())
        .round()
        .clamp(1.0, f64::from(u32::MAX)) as u32;
    NonZeroU32::new(px).unwrap_or(NonZeroU32::MIN)
}

/// Pixel-space result of scanning one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassScan {
    /// Pass angle in degrees, normalized into `[0, 360)`.
    pub angle_deg: f64,
    /// Size of the rotated canvas.
    pub canvas: Dimensions,
    /// Dark runs, ordered by row then column.
    pub segments: Vec<Segment>,
}

impl PassScan {
    /// Convert every segment into a physical-space stroke.
    #[must_use]
    pub fn into_pass(self, resolution: Resolution) -> Pass {
        Pass {
            angle_deg: self.angle_deg,
            canvas: self.canvas,
            strokes: self
                .segments
                .iter()
                .map(|segment| segment.to_stroke(resolution))
                .collect(),
        }
    }
}

/// Rotate `scaled` to `angle_deg` and scan it.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceExhaustion`] if the rotated canvas or
/// the segment list cannot be allocated.
pub fn scan_pass(
    scaled: &RgbImage,
    angle_deg: f64,
    spacing: NonZeroU32,
    threshold: u8,
) -> Result<PassScan, PipelineError> {
    let rotated = crate::rotate::rotate(scaled, angle_deg)?;
    scan_rotated(&rotated, angle_deg, spacing, threshold)
}

/// Scan a canvas already rotated to `angle_deg`.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceExhaustion`] if the segment list
/// cannot be allocated.
pub fn scan_rotated(
    rotated: &RgbImage,
    angle_deg: f64,
    spacing: NonZeroU32,
    threshold: u8,
) -> Result<PassScan, PipelineError> {
    let segments = crate::scan::scan_runs(rotated, spacing, threshold)?;
    debug!(angle_deg, runs = segments.len(), "pass scanned");
    Ok(PassScan {
        angle_deg,
        canvas: Dimensions {
            width: rotated.width(),
            height: rotated.height(),
        },
        segments,
    })
}
