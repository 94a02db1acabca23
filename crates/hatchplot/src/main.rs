//! hatchplot: convert a raster image into hatched pen-plotter G-code.
//!
//! Reads an image file, runs the hatching pipeline, and writes G-code.
//! Optionally also writes an SVG of the strokes, a PNG preview, and a
//! per-stage diagnostics report.
//!
//! # Usage
//!
//! ```text
//! hatchplot [OPTIONS] <IMAGE> --output <FILE.gcode>
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use hatchplot_export::{
    GcodeMetadata, GcodeOptions, Positioning, PreviewOptions, SvgMetadata, render_preview,
    to_gcode, to_svg,
};
use hatchplot_pipeline::diagnostics::{Clock, process_with_diagnostics};
use hatchplot_pipeline::{PlotConfig, PlotJob, ResampleFilter};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Convert a raster image into hatched pen-plotter G-code.
///
/// Dark regions of the image are filled with parallel hatch lines, one
/// set per pass, each pass rotated a further `180 / passes` degrees.
#[derive(Parser)]
#[command(name = "hatchplot", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// G-code output file.
    #[arg(short, long)]
    output: PathBuf,

    /// Drawing width in millimetres.
    #[arg(long, default_value_t = PlotConfig::DEFAULT_WIDTH_MM)]
    width: f64,

    /// Scanning resolution in pixels per millimetre.
    #[arg(long, default_value_t = PlotConfig::DEFAULT_PX_PER_MM)]
    resolution: f64,

    /// Distance between hatch lines in millimetres.
    #[arg(long, default_value_t = PlotConfig::DEFAULT_LINE_SPACING_MM)]
    line_spacing: f64,

    /// Luma threshold (0-255); darker pixels are drawn.
    #[arg(long, default_value_t = PlotConfig::DEFAULT_THRESHOLD)]
    threshold: u8,

    /// Angle of the first pass in degrees.
    #[arg(
        long,
        default_value_t = PlotConfig::DEFAULT_BASE_ANGLE_DEG,
        allow_negative_numbers = true
    )]
    angle: f64,

    /// Number of hatch passes.
    #[arg(
        long,
        default_value_t = PlotConfig::DEFAULT_PASSES,
        value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..)
    )]
    passes: u32,

    /// Resampling filter used when scaling the image.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_FILTER)]
    filter: Filter,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    #[arg(long, conflicts_with = "config")]
    config_json: Option<String>,

    /// File holding the pipeline config as JSON.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pen-up Z height in millimetres.
    #[arg(long, default_value_t = GcodeOptions::DEFAULT_PEN_UP_Z, allow_negative_numbers = true)]
    pen_up: f64,

    /// Pen-down Z height in millimetres.
    #[arg(long, default_value_t = GcodeOptions::DEFAULT_PEN_DOWN_Z, allow_negative_numbers = true)]
    pen_down: f64,

    /// Travel feed rate in mm/min.
    #[arg(long, default_value_t = GcodeOptions::DEFAULT_TRAVEL_FEED)]
    travel_feed: f64,

    /// Drawing feed rate in mm/min.
    #[arg(long, default_value_t = GcodeOptions::DEFAULT_DRAW_FEED)]
    draw_feed: f64,

    /// Emit relative (G91) instead of absolute (G90) coordinates.
    #[arg(long)]
    relative: bool,

    /// Omit the source and config comment header from the G-code.
    #[arg(long)]
    bare: bool,

    /// Also write an SVG of the strokes.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Also write a PNG preview of the strokes.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Print a per-stage diagnostics report to stdout.
    #[arg(long)]
    report: bool,

    /// Print the diagnostics as JSON instead of a text report.
    #[arg(long)]
    json: bool,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

impl From<Filter> for ResampleFilter {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Nearest => Self::Nearest,
            Filter::Triangle => Self::Triangle,
            Filter::CatmullRom => Self::CatmullRom,
            Filter::Gaussian => Self::Gaussian,
            Filter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Maps a [`ResampleFilter`] to the local CLI [`Filter`] enum.
const fn filter_from_pipeline(f: ResampleFilter) -> Filter {
    match f {
        ResampleFilter::Nearest => Filter::Nearest,
        ResampleFilter::Triangle => Filter::Triangle,
        ResampleFilter::CatmullRom => Filter::CatmullRom,
        ResampleFilter::Gaussian => Filter::Gaussian,
        ResampleFilter::Lanczos3 => Filter::Lanczos3,
    }
}

/// The CLI default filter, derived from [`PlotConfig::DEFAULT_RESAMPLE_FILTER`]
/// so the two cannot silently diverge.
const CLI_DEFAULT_FILTER: Filter = filter_from_pipeline(PlotConfig::DEFAULT_RESAMPLE_FILTER);

/// Build a [`PlotConfig`] from CLI arguments.
///
/// `--config-json` and `--config` take precedence over the individual
/// parameter flags.
fn config_from_cli(cli: &Cli) -> Result<PlotConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    if let Some(ref path) = cli.config {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&json)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }

    Ok(PlotConfig {
        width_mm: cli.width,
        px_per_mm: cli.resolution,
        line_spacing_mm: cli.line_spacing,
        threshold: cli.threshold,
        base_angle_deg: cli.angle,
        passes: cli.passes,
        resample_filter: cli.filter.into(),
    })
}

/// Build the machine motion parameters from CLI arguments.
const fn gcode_options_from_cli(cli: &Cli) -> GcodeOptions {
    GcodeOptions {
        pen_up_z: cli.pen_up,
        pen_down_z: cli.pen_down,
        travel_feed: cli.travel_feed,
        draw_feed: cli.draw_feed,
        positioning: if cli.relative {
            Positioning::Relative
        } else {
            Positioning::Absolute
        },
    }
}

/// One-line human-readable summary of the parameters.
fn describe(config: &PlotConfig) -> String {
    format!(
        "width={}mm resolution={}px/mm spacing={}mm threshold={} angle={} passes={} filter={}",
        config.width_mm,
        config.px_per_mm,
        config.line_spacing_mm,
        config.threshold,
        config.base_angle_deg,
        config.passes,
        config.resample_filter,
    )
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    let options = gcode_options_from_cli(cli);

    let image_bytes = std::fs::read(&cli.image_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.image_path.display()))?;
    info!(
        image = %cli.image_path.display(),
        bytes = image_bytes.len(),
        "loaded image"
    );

    let (job, diagnostics) = process_with_diagnostics(&image_bytes, &config, &StdClock)
        .map_err(|e| format!("Pipeline error: {e}"))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&diagnostics)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{json}");
    } else if cli.report {
        println!("{}", diagnostics.report());
    }

    let title = cli
        .image_path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    let description = describe(&config);
    let config_json = serde_json::to_string(&config)
        .map_err(|e| format!("Error serializing config: {e}"))?;

    let gcode_metadata = if cli.bare {
        GcodeMetadata::default()
    } else {
        GcodeMetadata {
            title: Some(title),
            description: Some(&description),
            config_json: Some(&config_json),
        }
    };
    let gcode = to_gcode(job.strokes(), &options, &gcode_metadata);
    write_output(&cli.output, gcode.as_bytes(), "G-code")?;

    if let Some(ref svg_path) = cli.svg {
        let metadata = SvgMetadata {
            title: Some(title),
            description: Some(&description),
            config_json: Some(&config_json),
        };
        let svg = to_svg(job.strokes(), job.extent_mm(), &metadata);
        write_output(svg_path, svg.as_bytes(), "SVG")?;
    }

    if let Some(ref preview_path) = cli.preview {
        write_preview(&job, preview_path)?;
    }

    Ok(())
}

fn write_output(path: &Path, contents: &[u8], kind: &str) -> Result<(), String> {
    std::fs::write(path, contents)
        .map_err(|e| format!("Error writing {kind} to {}: {e}", path.display()))?;
    info!(path = %path.display(), bytes = contents.len(), "{kind} written");
    Ok(())
}

fn write_preview(job: &PlotJob, path: &Path) -> Result<(), String> {
    let img = render_preview(job, &PreviewOptions::default())
        .map_err(|e| format!("Error rendering preview: {e}"))?;
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| format!("Error writing preview to {}: {e}", path.display()))?;
    info!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "preview written"
    );
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
