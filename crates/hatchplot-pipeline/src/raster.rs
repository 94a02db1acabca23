//! Decoding and scaling the source image to the scan resolution.
//!
//! The target width is `round(width_mm * px_per_mm)` pixels (at least 1)
//! and the height follows from the source aspect ratio with the same
//! uniform scale factor. The scaled buffer is flattened onto white, so
//! transparent source pixels are never considered dark downstream.

use std::fmt;

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Dimensions, PipelineError, Resolution};

/// Pure white, the background of every buffer.
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Resampling filter used when scaling the source image.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
/// Thresholding downstream is tolerant of small differences, so the
/// choice mostly affects edge smoothness of the hatch lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl ResampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Decode raw image bytes.
///
/// Supports PNG, JPEG, BMP, and WebP formats (whatever the `image` crate
/// was built with).
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let image = image::load_from_memory(bytes)?;
    debug!(
        width = image.width(),
        height = image.height(),
        bytes = bytes.len(),
        "decoded source image"
    );
    Ok(image)
}

/// Compute the scaled pixel size for a source image.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] if the source has zero width
/// or zero height, or `width_mm` is not finite and positive.
/// Returns [`PipelineError::ResourceExhaustion`] if the target size does
/// not fit in `u32`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn target_dimensions(
    source: Dimensions,
    width_mm: f64,
    resolution: Resolution,
) -> Result<Dimensions, PipelineError> {
    if source.width == 0 || source.height == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "source image has no pixels ({}x{})",
            source.width, source.height
        )));
    }
    if !(width_mm.is_finite() && width_mm > 0.0) {
        return Err(PipelineError::InvalidInput(format!(
            "width_mm must be finite and > 0, got {width_mm}"
        )));
    }

    let width = (width_mm * resolution.px_per_mm()).round().max(1.0);
    let scale = width / f64::from(source.width);
    let height = (f64::from(source.height) * scale).round().max(1.0);

    if width > f64::from(u32::MAX) || height > f64::from(u32::MAX) {
        return Err(PipelineError::ResourceExhaustion(format!(
            "scaled image {width}x{height} exceeds the maximum buffer size"
        )));
    }

    Ok(Dimensions {
        width: width as u32,
        height: height as u32,
    })
}

/// Scale `image` to exactly `target` and flatten it onto white.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceExhaustion`] if the buffers needed
/// for scaling cannot be allocated.
pub fn rasterize(
    image: &DynamicImage,
    target: Dimensions,
    filter: ResampleFilter,
) -> Result<RgbImage, PipelineError> {
    let source = Dimensions {
        width: image.width(),
        height: image.height(),
    };
    reserve_scaling(source, target)?;

    let rgba = if image.width() == target.width && image.height() == target.height {
        image.to_rgba8()
    } else {
        image
            .resize_exact(target.width, target.height, filter.to_image_filter())
            .to_rgba8()
    };
    debug!(
        width = target.width,
        height = target.height,
        %filter,
        "scaled source image"
    );
    Ok(flatten_onto_white(&rgba))
}

/// Composite an RGBA image over an opaque white background.
#[must_use]
pub fn flatten_onto_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        Rgb([over_white(r, a), over_white(g, a), over_white(b, a)])
    })
}

#[allow(clippy::cast_possible_truncation)]
fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = u32::from(channel);
    let a = u32::from(alpha);
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

/// Allocate a `width x height` buffer filled with white.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceExhaustion`] if the size overflows or
/// the allocation fails.
pub fn white_canvas(dimensions: Dimensions) -> Result<RgbImage, PipelineError> {
    let len = buffer_len(dimensions, 3)?;
    let mut raw = Vec::new();
    raw.try_reserve_exact(len).map_err(|e| {
        PipelineError::ResourceExhaustion(format!(
            "cannot allocate {}x{} canvas: {e}",
            dimensions.width, dimensions.height
        ))
    })?;
    raw.resize(len, 255);
    RgbImage::from_raw(dimensions.width, dimensions.height, raw).ok_or_else(|| {
        PipelineError::ResourceExhaustion(format!(
            "canvas buffer does not match {}x{}",
            dimensions.width, dimensions.height
        ))
    })
}

/// Bytes per pixel of the `f32` RGBA buffers `image` resamples through.
const RESAMPLE_BYTES_PER_PX: u64 = 16;

/// Bytes per target pixel across the resized, RGBA8 and flattened RGB
/// buffers.
const OUTPUT_BYTES_PER_PX: u64 = RESAMPLE_BYTES_PER_PX + 4 + 3;

/// Check that every buffer [`rasterize`] allocates can be had.
///
/// Resizing goes through an `f32` intermediate scaled along one axis,
/// then the result is converted to RGBA8 and flattened to RGB. The worst
/// case of all of them together is reserved at once, so an impossible size
/// fails here rather than aborting inside `image`.
fn reserve_scaling(source: Dimensions, target: Dimensions) -> Result<(), PipelineError> {
    let too_large = || {
        PipelineError::ResourceExhaustion(format!(
            "scaling {}x{} to {}x{} exceeds addressable memory",
            source.width, source.height, target.width, target.height
        ))
    };

    let vertical_first = Dimensions {
        width: source.width,
        height: target.height,
    };
    let horizontal_first = Dimensions {
        width: target.width,
        height: source.height,
    };
    let intermediate = vertical_first
        .pixel_count()
        .max(horizontal_first.pixel_count())
        .checked_mul(RESAMPLE_BYTES_PER_PX)
        .ok_or_else(too_large)?;
    let len = target
        .pixel_count()
        .checked_mul(OUTPUT_BYTES_PER_PX)
        .and_then(|output| output.checked_add(intermediate))
        .filter(|&len| len <= isize::MAX as u64)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(too_large)?;

    let mut headroom: Vec<u8> = Vec::new();
    headroom.try_reserve_exact(len).map_err(|e| {
        PipelineError::ResourceExhaustion(format!(
            "cannot allocate {len} bytes to scale to {}x{}: {e}",
            target.width, target.height
        ))
    })
}

/// Byte length of a buffer, or `ResourceExhaustion` when it cannot be
/// addressed.
fn buffer_len(dimensions: Dimensions, channels: u64) -> Result<usize, PipelineError> {
    dimensions
        .pixel_count()
        .checked_mul(channels)
        .filter(|&len| len <= isize::MAX as u64)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| {
            PipelineError::ResourceExhaustion(format!(
                "{}x{} buffer exceeds addressable memory",
                dimensions.width, dimensions.height
            ))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn res(px_per_mm: f64) -> Resolution {
        Resolution::new(px_per_mm).unwrap()
    }

    fn dims(width: u32, height: u32) -> Dimensions {
        Dimensions { width, height }
    }

    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn default_filter_is_triangle() {
        assert_eq!(ResampleFilter::default(), ResampleFilter::Triangle);
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn valid_png_decodes() {
        let img = RgbaImage::from_pixel(17, 31, Rgba([10, 20, 30, 255]));
        let decoded = decode(&encode_png(&img)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (17, 31));
    }

    #[test]
    fn target_dimensions_follow_aspect_ratio() {
        // 100 mm at 2 px/mm = 200 px wide; 400x300 source scales by 0.5.
        let target = target_dimensions(dims(400, 300), 100.0, res(2.0)).unwrap();
        assert_eq!(target, dims(200, 150));
    }

    #[test]
    fn target_dimensions_round_to_nearest() {
        // 10.3 mm * 1 px/mm = 10.3 -> 10; 7 * 10/3 = 23.33 -> 23.
        let target = target_dimensions(dims(3, 7), 10.3, res(1.0)).unwrap();
        assert_eq!(target, dims(10, 23));
    }

    #[test]
    fn target_width_is_at_least_one_pixel() {
        let target = target_dimensions(dims(50, 50), 0.01, res(1.0)).unwrap();
        assert_eq!(target, dims(1, 1));
    }

    #[test]
    fn zero_width_source_is_invalid() {
        let result = target_dimensions(dims(0, 10), 10.0, res(1.0));
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn huge_target_is_resource_exhaustion() {
        let result = target_dimensions(dims(1, 1), 1e12, res(10.0));
        assert!(matches!(result, Err(PipelineError::ResourceExhaustion(_))));
    }

    #[test]
    fn target_height_is_at_least_one_pixel() {
        // 1000x1 drawn 10 px wide: 1 * 10/1000 = 0.01 rounds to 0, kept at 1.
        let target = target_dimensions(dims(1000, 1), 10.0, res(1.0)).unwrap();
        assert_eq!(target, dims(10, 1));
    }

    #[test]
    fn zero_height_source_is_invalid() {
        let result = target_dimensions(dims(10, 0), 10.0, res(1.0));
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn unaddressable_scaling_is_resource_exhaustion() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])));
        let result = rasterize(&img, dims(u32::MAX, u32::MAX), ResampleFilter::Triangle);
        assert!(matches!(result, Err(PipelineError::ResourceExhaustion(_))));
    }

    #[test]
    fn unallocatable_scaling_is_resource_exhaustion() {
        // 1e8 x 1e8 fits in usize but no allocator can provide it.
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])));
        let target = dims(100_000_000, 100_000_000);
        let result = rasterize(&img, target, ResampleFilter::Triangle);
        assert!(matches!(result, Err(PipelineError::ResourceExhaustion(_))));
    }

    #[test]
    fn rasterize_produces_exact_size() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255])));
        let out = rasterize(&img, dims(13, 7), ResampleFilter::Triangle).unwrap();
        assert_eq!(out.dimensions(), (13, 7));
    }

    #[test]
    fn rasterize_same_size_keeps_pixels() {
        let src = RgbaImage::from_fn(3, 2, |x, y| Rgba([(x * 40) as u8, (y * 90) as u8, 7, 255]));
        let out = rasterize(
            &DynamicImage::ImageRgba8(src.clone()),
            dims(3, 2),
            ResampleFilter::Lanczos3,
        )
        .unwrap();
        for (x, y, p) in src.enumerate_pixels() {
            assert_eq!(out.get_pixel(x, y).0, [p[0], p[1], p[2]]);
        }
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let rgba = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        let flat = flatten_onto_white(&rgba);
        assert!(flat.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn opaque_pixels_are_unchanged_by_flattening() {
        let rgba = RgbaImage::from_pixel(1, 1, Rgba([12, 200, 99, 255]));
        assert_eq!(flatten_onto_white(&rgba).get_pixel(0, 0).0, [12, 200, 99]);
    }

    #[test]
    fn white_canvas_is_white() {
        let canvas = white_canvas(dims(5, 4)).unwrap();
        assert_eq!(canvas.dimensions(), (5, 4));
        assert!(canvas.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn oversized_canvas_is_resource_exhaustion() {
        let result = white_canvas(dims(u32::MAX, u32::MAX));
        assert!(matches!(result, Err(PipelineError::ResourceExhaustion(_))));
    }
}
