//! hatchplot-pipeline: Pure raster-to-stroke pipeline (sans-IO).
//!
//! Converts a raster image into straight hatch strokes through:
//! decode -> scale -> (per pass) rotate -> scan dark runs ->
//! pixel-to-millimetre conversion -> merged [`PlotJob`].
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. File access and output
//! serialization live in `hatchplot-export` and the `hatchplot` binary.

use std::num::NonZeroU32;

use tracing::info;

pub mod diagnostics;
pub mod passes;
pub mod raster;
pub mod rotate;
pub mod scan;
pub mod types;

pub use raster::ResampleFilter;
pub use types::{
    Dimensions, DynamicImage, Pass, PipelineError, PixelPoint, PlotConfig, PlotJob, Point,
    Polyline, Resolution, RgbImage, Segment,
};

/// Run the full pipeline on encoded image bytes.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP) and a configuration and
/// produces a [`PlotJob`] holding every pass and the merged stroke list
/// in millimetres.
///
/// # Pipeline steps
///
/// 1. Validate the configuration
/// 2. Decode the image
/// 3. Scale to `width_mm * px_per_mm` pixels wide (once, shared)
/// 4. For each pass angle: rotate onto an expanded white canvas
/// 5. Scan every `line_spacing`-th row for dark runs
/// 6. Convert runs to 2-point strokes in millimetres and merge
///
/// An image with no dark pixels yields a job with zero strokes.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidInput`] if the configuration is
/// invalid or the image has no pixels, checked before any buffer is
/// allocated. Returns [`PipelineError::EmptyInput`] if `image_bytes` is
/// empty and [`PipelineError::ImageDecode`] if the format is
/// unrecognized. Returns [`PipelineError::ResourceExhaustion`] if a
/// buffer cannot be allocated.
pub fn process(image_bytes: &[u8], config: &PlotConfig) -> Result<PlotJob, PipelineError> {
    config.validate()?;
    let image = raster::decode(image_bytes)?;
    process_image(&image, config)
}

/// Run the pipeline on an already-decoded image.
///
/// # Errors
///
/// Same as [`process`], minus the decoding errors.
pub fn process_image(image: &DynamicImage, config: &PlotConfig) -> Result<PlotJob, PipelineError> {
    let plan = RunPlan::new(config)?;
    let (target, scaled) = plan.scale(image, config)?;

    let mut job_passes = Vec::new();
    for &angle_deg in &plan.angles {
        let scan = passes::scan_pass(&scaled, angle_deg, plan.spacing, config.threshold)?;
        job_passes.push(scan.into_pass(plan.resolution));
    }

    let job = PlotJob::new(target, plan.resolution, job_passes);
    info!(
        width = target.width,
        height = target.height,
        passes = job.passes().len(),
        strokes = job.strokes().len(),
        "extracted hatch strokes"
    );
    Ok(job)
}

/// Validated run parameters, derived once from a [`PlotConfig`].
pub(crate) struct RunPlan {
    pub(crate) resolution: Resolution,
    pub(crate) spacing: NonZeroU32,
    pub(crate) angles: Vec<f64>,
}

impl RunPlan {
    pub(crate) fn new(config: &PlotConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let resolution = Resolution::new(config.px_per_mm)?;
        let pass_count = NonZeroU32::new(config.passes)
            .ok_or_else(|| PipelineError::InvalidInput("passes must be at least 1".to_string()))?;
        Ok(Self {
            resolution,
            spacing: passes::line_spacing_px(config.line_spacing_mm, resolution),
            angles: passes::pass_angles(config.base_angle_deg, pass_count),
        })
    }

    /// Scale `image` to the configured width, returning the target size
    /// and the shared buffer every pass rotates.
    pub(crate) fn scale(
        &self,
        image: &DynamicImage,
        config: &PlotConfig,
    ) -> Result<(Dimensions, RgbImage), PipelineError> {
        let source = Dimensions {
            width: image.width(),
            height: image.height(),
        };
        let target = raster::target_dimensions(source, config.width_mm, self.resolution)?;
        let scaled = raster::rasterize(image, target, config.resample_filter)?;
        Ok((target, scaled))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

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

    fn black_square_config() -> PlotConfig {
        PlotConfig {
            width_mm: 10.0,
            px_per_mm: 1.0,
            line_spacing_mm: 2.0,
            threshold: 128,
            base_angle_deg: 0.0,
            passes: 1,
            ..PlotConfig::default()
        }
    }

    #[test]
    fn process_empty_input() {
        let result = process(&[], &PlotConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn process_corrupt_input() {
        let result = process(&[0xFF, 0x00], &PlotConfig::default());
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn invalid_config_is_reported_before_decoding() {
        let config = PlotConfig {
            line_spacing_mm: 0.0,
            ..PlotConfig::default()
        };
        assert!(matches!(
            process(&[], &config),
            Err(PipelineError::InvalidInput(_))
        ));
    }

    #[test]
    fn black_square_end_to_end() {
        let png = encode_png(&RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])));
        let job = process(&png, &black_square_config()).unwrap();

        assert_eq!(
            job.dimensions(),
            Dimensions {
                width: 10,
                height: 10
            }
        );
        assert_eq!(job.passes().len(), 1);
        assert_eq!(
            job.passes()[0].canvas,
            Dimensions {
                width: 10,
                height: 10
            }
        );

        let expected: Vec<Polyline> = [0.0, 2.0, 4.0, 6.0, 8.0]
            .iter()
            .map(|&y| Polyline::new(vec![Point::new(0.0, y), Point::new(9.0, y)]))
            .collect();
        assert_eq!(job.strokes(), expected.as_slice());
    }

    #[test]
    fn physical_coordinates_scale_with_resolution() {
        // Same 10x10 image drawn 10 mm wide at 2 px/mm: 20x20 pixels,
        // spacing 4 px, strokes span 0..=19 px = 0..=9.5 mm.
        let png = encode_png(&RgbaImage::from_pixel(10, 10, Rgba([0, 0, 0, 255])));
        let config = PlotConfig {
            px_per_mm: 2.0,
            ..black_square_config()
        };
        let job = process(&png, &config).unwrap();
        assert_eq!(job.strokes().len(), 5);
        for (i, stroke) in job.strokes().iter().enumerate() {
            let y = 2.0 * f64::from(u32::try_from(i).unwrap());
            assert_eq!(
                stroke.points(),
                &[Point::new(0.0, y), Point::new(9.5, y)]
            );
        }
    }

    #[test]
    fn oversized_drawing_is_resource_exhaustion() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255])));
        for width_mm in [1e8, 1e9] {
            let config = PlotConfig {
                width_mm,
                px_per_mm: 1.0,
                ..PlotConfig::default()
            };
            let result = process_image(&img, &config);
            assert!(
                matches!(result, Err(PipelineError::ResourceExhaustion(_))),
                "width {width_mm} mm: {result:?}",
            );
        }
    }

    #[test]
    fn blank_image_yields_empty_job() {
        let png = encode_png(&RgbaImage::from_pixel(16, 9, Rgba([255, 255, 255, 255])));
        let config = PlotConfig {
            passes: 4,
            ..black_square_config()
        };
        let job = process(&png, &config).unwrap();
        assert_eq!(job.passes().len(), 4);
        assert!(job.strokes().is_empty());
    }

    #[test]
    fn transparent_image_yields_empty_job() {
        let png = encode_png(&RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0])));
        let job = process(&png, &black_square_config()).unwrap();
        assert!(job.strokes().is_empty());
    }

    #[test]
    fn process_is_deterministic() {
        let img = RgbaImage::from_fn(37, 23, |x, y| {
            let v = ((x * 7 + y * 13) % 255) as u8;
            Rgba([v, v / 2, 255 - v, 255])
        });
        let png = encode_png(&img);
        let config = PlotConfig {
            width_mm: 30.0,
            px_per_mm: 1.5,
            line_spacing_mm: 1.0,
            base_angle_deg: 15.0,
            passes: 3,
            ..PlotConfig::default()
        };
        let a = process(&png, &config).unwrap();
        let b = process(&png, &config).unwrap();
        assert_eq!(a, b);
        assert!(!a.strokes().is_empty());
    }

    #[test]
    fn strokes_are_ordered_pass_by_pass() {
        let png = encode_png(&RgbaImage::from_pixel(12, 12, Rgba([0, 0, 0, 255])));
        let config = PlotConfig {
            width_mm: 12.0,
            passes: 2,
            ..black_square_config()
        };
        let job = process(&png, &config).unwrap();
        let angles: Vec<f64> = job.passes().iter().map(|p| p.angle_deg).collect();
        assert_eq!(angles, vec![0.0, 90.0]);

        let mut merged = Vec::new();
        for pass in job.passes() {
            // Within a pass: by row, then by start column.
            for pair in pass.strokes.windows(2) {
                let (a, b) = (pair[0].points()[0], pair[1].points()[0]);
                assert!(a.y < b.y || (a.y == b.y && a.x < b.x));
            }
            merged.extend(pass.strokes.iter().cloned());
        }
        assert_eq!(job.strokes(), merged.as_slice());
    }

    #[test]
    fn every_stroke_has_two_points_inside_its_canvas() {
        let img = RgbaImage::from_fn(40, 25, |x, y| {
            if (x / 5 + y / 5) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        let png = encode_png(&img);
        let config = PlotConfig {
            width_mm: 20.0,
            px_per_mm: 2.0,
            line_spacing_mm: 0.5,
            base_angle_deg: 10.0,
            passes: 5,
            ..PlotConfig::default()
        };
        let job = process(&png, &config).unwrap();
        let res = job.resolution();
        for pass in job.passes() {
            let (w, h) = (f64::from(pass.canvas.width), f64::from(pass.canvas.height));
            for stroke in &pass.strokes {
                assert_eq!(stroke.len(), 2);
                for p in stroke.points() {
                    let px = p.to_pixels(res);
                    assert!(px.x > -1e-9 && px.x < w, "x {} of {w}", px.x);
                    assert!(px.y > -1e-9 && px.y < h, "y {} of {h}", px.y);
                }
            }
        }
    }
}
