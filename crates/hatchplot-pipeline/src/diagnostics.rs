//! Pipeline diagnostics: timing and counts for each stage.
//!
//! [`process_with_diagnostics`] runs the same stages as
//! [`crate::process`] while recording per-stage durations and metrics.
//! Time is read through the [`Clock`] trait so this crate stays free of
//! platform time sources; the CLI supplies an `Instant`-backed clock.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::RunPlan;
use crate::passes::scan_rotated;
use crate::raster::decode;
use crate::rotate::rotate;
use crate::scan::rows_scanned;
use crate::types::{Dimensions, PipelineError, PlotConfig, PlotJob};

/// Source of monotonic time.
pub trait Clock {
    /// Opaque timestamp type.
    type Instant;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Image decoding.
    pub decode: StageDiagnostics,
    /// Scaling to the target resolution.
    pub rasterize: StageDiagnostics,
    /// One entry per pass, in generation order.
    pub passes: Vec<PassDiagnostics>,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassDiagnostics {
    /// Rotation onto the expanded canvas.
    pub rotate: StageDiagnostics,
    /// Row scanning.
    pub scan: StageDiagnostics,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        /// Decoded image width in pixels.
        width: u32,
        /// Decoded image height in pixels.
        height: u32,
    },
    /// Scaling metrics.
    Rasterize {
        /// Scaled width in pixels.
        width: u32,
        /// Scaled height in pixels.
        height: u32,
        /// Resampling filter name.
        filter: String,
    },
    /// Rotation metrics.
    Rotate {
        /// Pass angle in degrees.
        angle_deg: f64,
        /// Rotated canvas width in pixels.
        canvas_width: u32,
        /// Rotated canvas height in pixels.
        canvas_height: u32,
    },
    /// Row scanning metrics.
    Scan {
        /// Row spacing in pixels.
        spacing_px: u32,
        /// Number of rows visited.
        rows: u32,
        /// Number of dark runs found.
        runs: usize,
        /// Runs that were a single pixel wide.
        degenerate_runs: usize,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Scaled image width in pixels.
    pub target_width: u32,
    /// Scaled image height in pixels.
    pub target_height: u32,
    /// Number of passes.
    pub pass_count: usize,
    /// Strokes in the final job.
    pub stroke_count: usize,
}

/// Run the pipeline on encoded image bytes, collecting diagnostics.
///
/// Produces the same [`PlotJob`] as [`crate::process`].
///
/// # Errors
///
/// Same as [`crate::process`].
pub fn process_with_diagnostics<C: Clock>(
    image_bytes: &[u8],
    config: &PlotConfig,
    clock: &C,
) -> Result<(PlotJob, PipelineDiagnostics), PipelineError> {
    let plan = RunPlan::new(config)?;
    let total_start = clock.now();

    let start = clock.now();
    let image = decode(image_bytes)?;
    let source = Dimensions {
        width: image.width(),
        height: image.height(),
    };
    let decode_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Decode {
            input_bytes: image_bytes.len(),
            width: source.width,
            height: source.height,
        },
    };

    let start = clock.now();
    let (target, scaled) = plan.scale(&image, config)?;
    let rasterize_diag = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: StageMetrics::Rasterize {
            width: target.width,
            height: target.height,
            filter: config.resample_filter.to_string(),
        },
    };

    let mut job_passes = Vec::new();
    let mut pass_diags = Vec::new();
    for &angle_deg in &plan.angles {
        let start = clock.now();
        let rotated = rotate(&scaled, angle_deg)?;
        let rotate_diag = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Rotate {
                angle_deg,
                canvas_width: rotated.width(),
                canvas_height: rotated.height(),
            },
        };

        let start = clock.now();
        let scan = scan_rotated(&rotated, angle_deg, plan.spacing, config.threshold)?;
        let scan_diag = StageDiagnostics {
            duration: clock.elapsed(&start),
            metrics: StageMetrics::Scan {
                spacing_px: plan.spacing.get(),
                rows: rows_scanned(scan.canvas.height, plan.spacing),
                runs: scan.segments.len(),
                degenerate_runs: scan.segments.iter().filter(|s| s.is_degenerate()).count(),
            },
        };

        job_passes.push(scan.into_pass(plan.resolution));
        pass_diags.push(PassDiagnostics {
            rotate: rotate_diag,
            scan: scan_diag,
        });
    }

    let job = PlotJob::new(target, plan.resolution, job_passes);
    let diagnostics = PipelineDiagnostics {
        decode: decode_diag,
        rasterize: rasterize_diag,
        passes: pass_diags,
        total_duration: clock.elapsed(&total_start),
        summary: PipelineSummary {
            image_width: source.width,
            image_height: source.height,
            target_width: target.width,
            target_height: target.height,
            pass_count: job.passes().len(),
            stroke_count: job.strokes().len(),
        },
    };
    info!(
        passes = diagnostics.summary.pass_count,
        strokes = diagnostics.summary.stroke_count,
        total_ms = duration_ms(diagnostics.total_duration),
        "pipeline finished"
    );
    Ok((job, diagnostics))
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} -> {}x{} px",
            self.summary.image_width,
            self.summary.image_height,
            self.summary.target_width,
            self.summary.target_height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let mut stages: Vec<(String, &StageDiagnostics)> = vec![
            ("Decode".to_string(), &self.decode),
            ("Rasterize".to_string(), &self.rasterize),
        ];
        for (i, pass) in self.passes.iter().enumerate() {
            stages.push((format!("Pass {} Rotate", i + 1), &pass.rotate));
            stages.push((format!("Pass {} Scan", i + 1), &pass.scan));
        }

        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Passes: {}  |  Strokes: {}",
            self.summary.pass_count, self.summary.stroke_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Rasterize {
            width,
            height,
            filter,
        } => format!("{width}x{height} ({filter})"),
        StageMetrics::Rotate {
            angle_deg,
            canvas_width,
            canvas_height,
        } => format!("{angle_deg:.2} deg -> {canvas_width}x{canvas_height}"),
        StageMetrics::Scan {
            spacing_px,
            rows,
            runs,
            degenerate_runs,
        } => format!("every {spacing_px}px, {rows} rows, {runs} runs ({degenerate_runs} dots)"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn black_png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]));
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

    fn config() -> PlotConfig {
        PlotConfig {
            width_mm: 10.0,
            px_per_mm: 1.0,
            line_spacing_mm: 2.0,
            threshold: 128,
            base_angle_deg: 0.0,
            passes: 2,
            ..PlotConfig::default()
        }
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn diagnostics_match_plain_process() {
        let png = black_png(10, 10);
        let clock = TickClock(Cell::new(0));
        let (job, diag) = process_with_diagnostics(&png, &config(), &clock).unwrap();
        let plain = crate::process(&png, &config()).unwrap();
        assert_eq!(job, plain);
        assert_eq!(diag.passes.len(), 2);
        assert_eq!(diag.summary.stroke_count, job.strokes().len());
        assert_eq!(
            job.passes().iter().map(|p| p.strokes.len()).sum::<usize>(),
            job.strokes().len(),
        );
        assert!(diag.total_duration > Duration::ZERO);
    }

    #[test]
    fn scan_metrics_count_runs() {
        let png = black_png(10, 10);
        let clock = TickClock(Cell::new(0));
        let (_, diag) = process_with_diagnostics(
            &png,
            &PlotConfig {
                passes: 1,
                ..config()
            },
            &clock,
        )
        .unwrap();
        assert!(
            matches!(
                diag.passes[0].scan.metrics,
                StageMetrics::Scan {
                    spacing_px: 2,
                    rows: 5,
                    runs: 5,
                    degenerate_runs: 0,
                }
            ),
            "unexpected metrics {:?}",
            diag.passes[0].scan.metrics,
        );
    }

    #[test]
    fn invalid_config_fails_before_decode() {
        let clock = TickClock(Cell::new(0));
        let bad = PlotConfig {
            passes: 0,
            ..config()
        };
        // Empty bytes would be EmptyInput if decode ran first.
        let result = process_with_diagnostics(&[], &bad, &clock);
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn report_lists_every_pass() {
        let png = black_png(6, 4);
        let clock = TickClock(Cell::new(0));
        let (_, diag) = process_with_diagnostics(&png, &config(), &clock).unwrap();
        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        assert!(report.contains("Pass 1 Rotate"));
        assert!(report.contains("Pass 2 Scan"));
        assert!(report.contains("Triangle"));
    }

    #[test]
    fn diagnostics_serialize_to_json() {
        let png = black_png(4, 4);
        let clock = TickClock(Cell::new(0));
        let (_, diag) = process_with_diagnostics(&png, &config(), &clock).unwrap();
        let json = serde_json::to_string(&diag).unwrap();
        let back: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary.pass_count, 2);
        assert_eq!(back.passes.len(), diag.passes.len());
    }
}
