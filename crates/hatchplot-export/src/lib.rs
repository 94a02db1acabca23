//! hatchplot-export: Pure output serializers (sans-IO)
//!
//! Converts hatch strokes into output formats: G-code for the plotter,
//! SVG for vector inspection, and a raster preview image.

pub mod gcode;
pub mod preview;
pub mod svg;

pub use gcode::{GcodeMetadata, GcodeOptions, Positioning, to_gcode};
pub use preview::{PreviewError, PreviewOptions, render_preview};
pub use svg::{SvgMetadata, build_path_data, to_svg};
