//! Rotation onto an expanded, white-padded canvas.
//!
//! The destination is sized to the rotated bounding box,
//! `ceil(W|cos| + H|sin|) x ceil(W|sin| + H|cos|)`, so the whole source
//! stays visible. The source is rotated about its own center and placed
//! at the canvas center; positive angles turn clockwise on screen (Y
//! down), like a 2D canvas `rotate`.
//!
//! Every destination pixel is inverse-mapped into the source and sampled
//! bilinearly. Neighbours that fall outside the source read as white.

use image::{Rgb, RgbImage};
use tracing::debug;

use crate::raster::{WHITE, white_canvas};
use crate::types::{Dimensions, PipelineError};

/// Trig values closer than this to 0 or +-1 are snapped to the exact
/// value.
const SNAP_EPSILON: f64 = 1e-12;

/// Sine and cosine of `angle_deg`, snapped so right angles are exact.
///
/// Without snapping `cos(90 deg)` is about `6e-17`, and the bounding box
/// of a 90 degree rotation would round up to one extra pixel.
#[must_use]
pub fn sin_cos_deg(angle_deg: f64) -> (f64, f64) {
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    (snap(sin), snap(cos))
}

fn snap(v: f64) -> f64 {
    if v.abs() < SNAP_EPSILON {
        0.0
    } else if (v.abs() - 1.0).abs() < SNAP_EPSILON {
        v.signum()
    } else {
        v
    }
}

/// Size of the canvas that holds `source` rotated by `angle_deg`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rotated_dimensions(source: Dimensions, angle_deg: f64) -> Dimensions {
    let (sin, cos) = sin_cos_deg(angle_deg);
    let w = f64::from(source.width);
    let h = f64::from(source.height);
    Dimensions {
        width: w.mul_add(cos.abs(), h * sin.abs()).ceil() as u32,
        height: w.mul_add(sin.abs(), h * cos.abs()).ceil() as u32,
    }
}

/// Rotate `source` by `angle_deg` onto a white canvas large enough to
/// hold it without clipping.
///
/// At 0 degrees the output equals the input pixel for pixel.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceExhaustion`] if the destination
/// canvas cannot be allocated.
pub fn rotate(source: &RgbImage, angle_deg: f64) -> Result<RgbImage, PipelineError> {
    let src_dims = Dimensions {
        width: source.width(),
        height: source.height(),
    };
    let dst_dims = rotated_dimensions(src_dims, angle_deg);
    let mut canvas = white_canvas(dst_dims)?;

    let (sin, cos) = sin_cos_deg(angle_deg);
    let src_cx = f64::from(src_dims.width) / 2.0;
    let src_cy = f64::from(src_dims.height) / 2.0;
    let dst_cx = f64::from(dst_dims.width) / 2.0;
    let dst_cy = f64::from(dst_dims.height) / 2.0;

    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        // Destination pixel center relative to the canvas center.
        let dx = f64::from(x) + 0.5 - dst_cx;
        let dy = f64::from(y) + 0.5 - dst_cy;
        // Inverse rotation back into source pixel coordinates.
        let sx = cos.mul_add(dx, sin * dy) + src_cx - 0.5;
        let sy = (-sin).mul_add(dx, cos * dy) + src_cy - 0.5;
        *pixel = sample_bilinear(source, sx, sy);
    }

    debug!(
        angle_deg,
        src_width = src_dims.width,
        src_height = src_dims.height,
        width = dst_dims.width,
        height = dst_dims.height,
        "rotated buffer"
    );
    Ok(canvas)
}

/// Read a pixel as floating-point channels, white outside the image.
fn texel(image: &RgbImage, x: i64, y: i64) -> [f64; 3] {
    let inside = u32::try_from(x)
        .ok()
        .zip(u32::try_from(y).ok())
        .and_then(|(x, y)| image.get_pixel_checked(x, y));
    let Rgb([r, g, b]) = inside.copied().unwrap_or(WHITE);
    [f64::from(r), f64::from(g), f64::from(b)]
}

/// Bilinear sample at a continuous source position.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (ix, iy) = (x0 as i64, y0 as i64);

    let p00 = texel(image, ix, iy);
    let p10 = texel(image, ix + 1, iy);
    let p01 = texel(image, ix, iy + 1);
    let p11 = texel(image, ix + 1, iy + 1);

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = p00[c].mul_add(1.0 - fx, p10[c] * fx);
        let bottom = p01[c].mul_add(1.0 - fx, p11[c] * fx);
        *value = top.mul_add(1.0 - fy, bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 17 % 256) as u8, (y * 29 % 256) as u8, ((x + y) * 5 % 256) as u8])
        })
    }

    #[test]
    fn zero_angle_keeps_dimensions() {
        assert_eq!(rotated_dimensions(dims(30, 20), 0.0), dims(30, 20));
    }

    #[test]
    fn right_angles_swap_dimensions_exactly() {
        assert_eq!(rotated_dimensions(dims(30, 20), 90.0), dims(20, 30));
        assert_eq!(rotated_dimensions(dims(30, 20), 180.0), dims(30, 20));
        assert_eq!(rotated_dimensions(dims(30, 20), 270.0), dims(20, 30));
    }

    #[test]
    fn forty_five_degrees_expands_canvas() {
        // 10 * (cos 45 + sin 45) = 14.142... -> 15.
        assert_eq!(rotated_dimensions(dims(10, 10), 45.0), dims(15, 15));
    }

    #[test]
    fn negative_angle_matches_positive_bounding_box() {
        assert_eq!(
            rotated_dimensions(dims(40, 10), -30.0),
            rotated_dimensions(dims(40, 10), 30.0),
        );
    }

    #[test]
    fn zero_angle_is_identity() {
        let src = gradient(7, 5);
        let out = rotate(&src, 0.0).unwrap();
        assert_eq!(out.dimensions(), src.dimensions());
        assert_eq!(out.as_raw(), src.as_raw());
    }

    #[test]
    fn full_turn_is_identity() {
        let src = gradient(6, 4);
        let out = rotate(&src, 360.0).unwrap();
        assert_eq!(out.as_raw(), src.as_raw());
    }

    #[test]
    fn half_turn_flips_both_axes() {
        let src = gradient(6, 4);
        let out = rotate(&src, 180.0).unwrap();
        assert_eq!(out.dimensions(), (6, 4));
        for (x, y, p) in src.enumerate_pixels() {
            assert_eq!(out.get_pixel(5 - x, 3 - y), p, "pixel ({x}, {y})");
        }
    }

    #[test]
    fn quarter_turn_is_clockwise() {
        // A dark pixel at the top-left of a 4x2 image ends up at the
        // top-right of the 2x4 result after a clockwise quarter turn.
        let mut src = RgbImage::from_pixel(4, 2, WHITE);
        src.put_pixel(0, 0, BLACK);
        let out = rotate(&src, 90.0).unwrap();
        assert_eq!(out.dimensions(), (2, 4));
        assert_eq!(*out.get_pixel(1, 0), BLACK);
        assert_eq!(*out.get_pixel(0, 0), WHITE);
    }

    #[test]
    fn padding_is_white() {
        let src = RgbImage::from_pixel(10, 10, BLACK);
        let out = rotate(&src, 45.0).unwrap();
        assert_eq!(out.dimensions(), (15, 15));
        // Canvas corners lie outside the rotated square.
        for (x, y) in [(0, 0), (14, 0), (0, 14), (14, 14)] {
            assert_eq!(*out.get_pixel(x, y), WHITE, "corner ({x}, {y})");
        }
        // The center stays dark.
        assert_eq!(*out.get_pixel(7, 7), BLACK);
    }

    #[test]
    fn sample_outside_source_is_white() {
        let src = RgbImage::from_pixel(2, 2, BLACK);
        assert_eq!(sample_bilinear(&src, -5.0, -5.0), WHITE);
        assert_eq!(sample_bilinear(&src, 10.0, 0.0), WHITE);
        assert_eq!(sample_bilinear(&src, 0.0, 0.0), BLACK);
    }
}
