//! Raster preview of a plot job.
//!
//! Draws every stroke black on a white canvas the size of the job's
//! largest pass canvas, so a job can be inspected without a plotter.
//! Stroke endpoints sit on pixel centres, matching the scanned pixels
//! they came from.

use image::RgbaImage;
use tiny_skia::{Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform};
use tracing::debug;

use hatchplot_pipeline::{PlotJob, Point, Resolution};

/// Errors from [`render_preview`].
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// The canvas could not be allocated (zero-sized or too large).
    #[error("cannot allocate {width}x{height} preview canvas")]
    Canvas {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },
}

/// Preview rendering parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewOptions {
    /// Pen width in preview pixels.
    pub line_width_px: f64,
}

impl PreviewOptions {
    /// Default pen width: one scanned pixel.
    pub const DEFAULT_LINE_WIDTH_PX: f64 = 1.0;
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            line_width_px: Self::DEFAULT_LINE_WIDTH_PX,
        }
    }
}

/// Render `job` into an opaque RGBA image.
///
/// # Errors
///
/// Returns [`PreviewError::Canvas`] if the canvas cannot be allocated.
#[allow(clippy::cast_possible_truncation)]
pub fn render_preview(job: &PlotJob, options: &PreviewOptions) -> Result<RgbaImage, PreviewError> {
    let extent = job.canvas_extent();
    let canvas_error = || PreviewError::Canvas {
        width: extent.width,
        height: extent.height,
    };
    let mut pixmap = Pixmap::new(extent.width, extent.height).ok_or_else(canvas_error)?;
    pixmap.fill(Color::WHITE);

    let mut paint = Paint::default();
    paint.set_color_rgba8(0, 0, 0, 255);
    paint.anti_alias = true;

    let stroke = Stroke {
        width: options.line_width_px as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    let radius = (options.line_width_px / 2.0) as f32;
    let resolution = job.resolution();

    let mut dots = 0usize;
    for polyline in job.strokes() {
        let points = polyline.points();
        let Some(first) = points.first() else {
            continue;
        };
        let (x0, y0) = to_canvas(*first, resolution);

        if points.iter().all(|p| p == first) {
            // Zero-length stroke: stroking draws nothing, so fill a dot.
            if let Some(dot) = PathBuilder::from_circle(x0, y0, radius) {
                pixmap.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
                dots += 1;
            }
            continue;
        }

        let mut pb = PathBuilder::new();
        pb.move_to(x0, y0);
        for p in &points[1..] {
            let (x, y) = to_canvas(*p, resolution);
            pb.line_to(x, y);
        }
        if let Some(path) = pb.finish() {
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    debug!(
        width = extent.width,
        height = extent.height,
        strokes = job.strokes().len(),
        dots,
        "rendered preview"
    );

    // The canvas is fully opaque, so premultiplied and straight RGBA agree.
    RgbaImage::from_raw(extent.width, extent.height, pixmap.data().to_vec())
        .ok_or_else(canvas_error)
}

/// Physical point to preview pixel coordinates, at the pixel centre.
#[allow(clippy::cast_possible_truncation)]
fn to_canvas(point: Point, resolution: Resolution) -> (f32, f32) {
    let px = point.to_pixels(resolution);
    ((px.x + 0.5) as f32, (px.y + 0.5) as f32)
}
