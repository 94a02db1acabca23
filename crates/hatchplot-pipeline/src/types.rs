//! Shared types for the hatchplot stroke-extraction pipeline.
//!
//! Two coordinate spaces flow through the pipeline:
//!
//! - **Pixel space** ([`PixelPoint`]): local to one pass's rotated canvas,
//!   origin top-left, Y increasing downward.
//! - **Physical space** ([`Point`]): millimetres, same orientation.
//!
//! They are distinct types so a value cannot cross from one space to the
//! other except through [`PixelPoint::to_physical`] (and the inverse
//! [`Point::to_pixels`] used by preview rendering).

use serde::{Deserialize, Serialize};

use crate::raster::ResampleFilter;

/// Re-export `RgbImage` so downstream crates can reference the
/// intermediate raster buffers without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `DynamicImage`, the decoded source image type.
pub use image::DynamicImage;

/// A 2D point in pixel space (rotated-canvas-local).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    /// Column (pixels from the left edge of the canvas).
    pub x: f64,
    /// Row (pixels from the top edge of the canvas).
    pub y: f64,
}

impl PixelPoint {
    /// Create a new pixel-space point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Convert to physical space by dividing by the resolution.
    ///
    /// This is the one place pixel coordinates become millimetres.
    #[must_use]
    pub fn to_physical(self, resolution: Resolution) -> Point {
        let mm_per_px = resolution.mm_per_px();
        Point::new(self.x * mm_per_px, self.y * mm_per_px)
    }
}

/// A 2D point in physical space (millimetres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (mm from the left edge).
    pub x: f64,
    /// Vertical position (mm from the top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Map back to pixel space at the given resolution.
    #[must_use]
    pub fn to_pixels(self, resolution: Resolution) -> PixelPoint {
        PixelPoint::new(
            self.x * resolution.px_per_mm(),
            self.y * resolution.px_per_mm(),
        )
    }
}

/// Scanning resolution: pixels per millimetre.
///
/// Always finite and strictly positive. Deserialization goes through
/// [`Resolution::new`] so invalid values are rejected there too.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Resolution(f64);

impl Resolution {
    /// Create a resolution from a pixels-per-millimetre ratio.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if `px_per_mm` is not
    /// finite or not strictly positive.
    pub fn new(px_per_mm: f64) -> Result<Self, PipelineError> {
        if px_per_mm.is_finite() && px_per_mm > 0.0 {
            Ok(Self(px_per_mm))
        } else {
            Err(PipelineError::InvalidInput(format!(
                "px_per_mm must be finite and > 0, got {px_per_mm}"
            )))
        }
    }

    /// Pixels per millimetre.
    #[must_use]
    pub const fn px_per_mm(self) -> f64 {
        self.0
    }

    /// Millimetres per pixel.
    #[must_use]
    pub fn mm_per_px(self) -> f64 {
        self.0.recip()
    }
}

impl TryFrom<f64> for Resolution {
    type Error = PipelineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Resolution> for f64 {
    fn from(resolution: Resolution) -> Self {
        resolution.0
    }
}

/// One dark run collapsed to its two extreme pixels.
///
/// Both endpoints share the scan row, so `start.y == end.y` and
/// `start.x <= end.x`. A single dark pixel gives `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    start: PixelPoint,
    end: PixelPoint,
}

impl Segment {
    /// Create a horizontal segment on row `y` spanning columns
    /// `first..=last`.
    #[must_use]
    pub fn horizontal(y: u32, first: u32, last: u32) -> Self {
        debug_assert!(first <= last, "run start {first} after end {last}");
        let y = f64::from(y);
        Self {
            start: PixelPoint::new(f64::from(first), y),
            end: PixelPoint::new(f64::from(last), y),
        }
    }

    /// First dark pixel of the run.
    #[must_use]
    pub const fn start(&self) -> PixelPoint {
        self.start
    }

    /// Last dark pixel of the run.
    #[must_use]
    pub const fn end(&self) -> PixelPoint {
        self.end
    }

    /// Whether the run was a single pixel.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    /// Convert to a 2-point physical-space stroke.
    #[must_use]
    pub fn to_stroke(&self, resolution: Resolution) -> Polyline {
        Polyline::new(vec![
            self.start.to_physical(resolution),
            self.end.to_physical(resolution),
        ])
    }
}

/// A sequence of connected points drawn without lifting the pen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the first point, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Point> {
        self.0.first()
    }

    /// Returns the last point, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Point> {
        self.0.last()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Configuration for one conversion run.
///
/// Fields are public so callers can build a config with struct-update
/// syntax; [`PlotConfig::validate`] checks every invariant and is called
/// by [`crate::process`] before any buffer is allocated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Target drawing width in millimetres. The height follows from the
    /// source aspect ratio.
    pub width_mm: f64,

    /// Scanning resolution in pixels per millimetre.
    pub px_per_mm: f64,

    /// Distance between hatch lines in millimetres.
    pub line_spacing_mm: f64,

    /// Brightness threshold. A pixel is dark when its BT.709 luma is
    /// strictly below this value, so `0` never marks anything.
    pub threshold: u8,

    /// Angle of the first pass in degrees. Any finite value; normalized
    /// into `[0, 360)`.
    pub base_angle_deg: f64,

    /// Number of passes. Pass angles are spread evenly over a half-turn.
    pub passes: u32,

    /// Resampling filter used when scaling the source image.
    pub resample_filter: ResampleFilter,
}

impl PlotConfig {
    /// Default drawing width in millimetres.
    pub const DEFAULT_WIDTH_MM: f64 = 100.0;
    /// Default scanning resolution in pixels per millimetre.
    pub const DEFAULT_PX_PER_MM: f64 = 5.0;
    /// Default hatch line spacing in millimetres.
    pub const DEFAULT_LINE_SPACING_MM: f64 = 1.0;
    /// Default brightness threshold.
    pub const DEFAULT_THRESHOLD: u8 = 128;
    /// Default first-pass angle in degrees.
    pub const DEFAULT_BASE_ANGLE_DEG: f64 = 0.0;
    /// Default pass count.
    pub const DEFAULT_PASSES: u32 = 1;
    /// Default resampling filter.
    pub const DEFAULT_RESAMPLE_FILTER: ResampleFilter = ResampleFilter::Triangle;

    /// Check every parameter invariant.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] naming the first offending
    /// field: non-finite or non-positive `width_mm`, `px_per_mm` or
    /// `line_spacing_mm`, a non-finite `base_angle_deg`, or `passes == 0`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        positive("width_mm", self.width_mm)?;
        positive("px_per_mm", self.px_per_mm)?;
        positive("line_spacing_mm", self.line_spacing_mm)?;
        if !self.base_angle_deg.is_finite() {
            return Err(PipelineError::InvalidInput(format!(
                "base_angle_deg must be finite, got {}",
                self.base_angle_deg
            )));
        }
        if self.passes == 0 {
            return Err(PipelineError::InvalidInput(
                "passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PipelineError::InvalidInput(format!(
            "{name} must be finite and > 0, got {value}"
        )))
    }
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width_mm: Self::DEFAULT_WIDTH_MM,
            px_per_mm: Self::DEFAULT_PX_PER_MM,
            line_spacing_mm: Self::DEFAULT_LINE_SPACING_MM,
            threshold: Self::DEFAULT_THRESHOLD,
            base_angle_deg: Self::DEFAULT_BASE_ANGLE_DEG,
            passes: Self::DEFAULT_PASSES,
            resample_filter: Self::DEFAULT_RESAMPLE_FILTER,
        }
    }
}

/// One raster-scan sweep at a single angle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    /// Pass angle in degrees, normalized into `[0, 360)`.
    pub angle_deg: f64,

    /// Size of this pass's rotated canvas in pixels.
    ///
    /// Stroke coordinates are relative to this canvas's top-left corner,
    /// so each pass has its own origin.
    pub canvas: Dimensions,

    /// Strokes in physical space, ordered by scan row then start column.
    pub strokes: Vec<Polyline>,
}

/// The complete output of one conversion run.
///
/// Built once by [`crate::process`] and read-only afterwards: fields are
/// private and only exposed through accessors. Deserializing rebuilds the
/// merged stroke list from the passes, so it always matches them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlotJobParts")]
pub struct PlotJob {
    dimensions: Dimensions,
    resolution: Resolution,
    passes: Vec<Pass>,
    strokes: Vec<Polyline>,
}

/// The stored parts of a [`PlotJob`]; `strokes` is derived.
#[derive(Deserialize)]
struct PlotJobParts {
    dimensions: Dimensions,
    resolution: Resolution,
    passes: Vec<Pass>,
}

impl From<PlotJobParts> for PlotJob {
    fn from(parts: PlotJobParts) -> Self {
        Self::new(parts.dimensions, parts.resolution, parts.passes)
    }
}

impl PlotJob {
    /// Assemble a job from its passes, merging their strokes in pass
    /// order.
    #[must_use]
    pub fn new(dimensions: Dimensions, resolution: Resolution, passes: Vec<Pass>) -> Self {
        let strokes = passes
            .iter()
            .flat_map(|pass| pass.strokes.iter().cloned())
            .collect();
        Self {
            dimensions,
            resolution,
            passes,
            strokes,
        }
    }

    /// Scaled (pre-rotation) image size in pixels.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Resolution the job was scanned at.
    #[must_use]
    pub const fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Passes in generation order.
    #[must_use]
    pub fn passes(&self) -> &[Pass] {
        &self.passes
    }

    /// All strokes, pass by pass, in physical space.
    #[must_use]
    pub fn strokes(&self) -> &[Polyline] {
        &self.strokes
    }

    /// Largest canvas across all passes, in pixels.
    ///
    /// Falls back to the scaled image size when there are no passes.
    #[must_use]
    pub fn canvas_extent(&self) -> Dimensions {
        self.passes
            .iter()
            .map(|pass| pass.canvas)
            .reduce(|a, b| Dimensions {
                width: a.width.max(b.width),
                height: a.height.max(b.height),
            })
            .unwrap_or(self.dimensions)
    }

    /// [`canvas_extent`](Self::canvas_extent) in millimetres, as
    /// `(width, height)`.
    #[must_use]
    pub fn extent_mm(&self) -> (f64, f64) {
        let extent = self.canvas_extent();
        let mm_per_px = self.resolution.mm_per_px();
        (
            f64::from(extent.width) * mm_per_px,
            f64::from(extent.height) * mm_per_px,
        )
    }
}

/// Errors that can occur during pipeline processing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A parameter or the source image violates an input invariant.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A buffer or segment list could not be allocated.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),
}

/// Serde-compatible proxy for `PipelineError`.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    InvalidInput(String),
    ResourceExhaustion(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::InvalidInput(s) => PipelineErrorProxy::InvalidInput(s.clone()),
            Self::ResourceExhaustion(s) => PipelineErrorProxy::ResourceExhaustion(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            // The typed image error cannot be rebuilt; keep its message.
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidInput(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::InvalidInput(s) => Self::InvalidInput(s),
            PipelineErrorProxy::ResourceExhaustion(s) => Self::ResourceExhaustion(s),
        })
    }
}
