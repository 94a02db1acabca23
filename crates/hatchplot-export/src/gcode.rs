//! G-code export serializer.
//!
//! Turns an ordered list of strokes (millimetres, Y down, origin at the
//! canvas top-left) into motion instructions for a two-axis plotter whose
//! Z axis lifts the pen.
//!
//! ```text
//! G21                     units: millimetres
//! G90                     absolute positioning (G91 for relative)
//! G0 Z<up>                pen up
//! G0 F<travel>            travel feed rate
//! G0 X<x> Y<y> F<travel>  per stroke: travel to the first point
//! G1 Z<down>              pen down
//! G1 F<draw>              draw feed rate
//! G1 X<x> Y<y>            one per remaining point
//! G0 Z<up> F<travel>      pen up, travel feed restored
//! ```
//!
//! All numbers have three decimals. Empty strokes are skipped; a stroke
//! whose points coincide still produces its (zero-length) draw move.
//!
//! In relative mode every coordinate, including Z, is a delta from the
//! previous position, and the job is assumed to start at `X0 Y0 Z0`.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::fmt::{self, Write};

use hatchplot_pipeline::Polyline;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How coordinates in the output are interpreted by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Positioning {
    /// Coordinates are absolute positions (`G90`).
    #[default]
    Absolute,
    /// Coordinates are offsets from the current position (`G91`).
    Relative,
}

impl Positioning {
    /// The G-code word selecting this mode.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Absolute => "G90",
            Self::Relative => "G91",
        }
    }
}

/// Machine motion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcodeOptions {
    /// Z height with the pen lifted (mm).
    pub pen_up_z: f64,
    /// Z height with the pen touching the medium (mm).
    pub pen_down_z: f64,
    /// Feed rate for pen-up travel (mm/min).
    pub travel_feed: f64,
    /// Feed rate while drawing (mm/min).
    pub draw_feed: f64,
    /// Absolute or relative coordinates.
    pub positioning: Positioning,
}

impl GcodeOptions {
    /// Default pen-up height in millimetres.
    pub const DEFAULT_PEN_UP_Z: f64 = 5.0;
    /// Default pen-down height in millimetres.
    pub const DEFAULT_PEN_DOWN_Z: f64 = 0.0;
    /// Default travel feed rate in mm/min.
    pub const DEFAULT_TRAVEL_FEED: f64 = 3000.0;
    /// Default drawing feed rate in mm/min.
    pub const DEFAULT_DRAW_FEED: f64 = 1500.0;
}

impl Default for GcodeOptions {
    fn default() -> Self {
        Self {
            pen_up_z: Self::DEFAULT_PEN_UP_Z,
            pen_down_z: Self::DEFAULT_PEN_DOWN_Z,
            travel_feed: Self::DEFAULT_TRAVEL_FEED,
            draw_feed: Self::DEFAULT_DRAW_FEED,
            positioning: Positioning::default(),
        }
    }
}

/// Metadata to embed as `;` comment lines at the top of the file.
///
/// All fields are optional. With every field `None` the output starts
/// directly with `G21`.
#[derive(Debug, Clone, Default)]
pub struct GcodeMetadata<'a> {
    /// Source image filename: emitted as `; Source: <filename>`.
    pub title: Option<&'a str>,

    /// Human-readable parameters: emitted as `; <line>`.
    pub description: Option<&'a str>,

    /// Full `PlotConfig` JSON: emitted as `; Config: <json>`.
    pub config_json: Option<&'a str>,
}

/// A coordinate formatted with three decimals, never as `-0.000`.
#[derive(Clone, Copy)]
struct Num(f64);

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = round3(self.0);
        // Adding zero turns -0.0 into 0.0.
        write!(f, "{:.3}", v + 0.0)
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Tracks the machine position so relative mode can emit deltas.
struct Head {
    positioning: Positioning,
    x: f64,
    y: f64,
    z: f64,
}

impl Head {
    const fn new(positioning: Positioning) -> Self {
        Self {
            positioning,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Coordinates to print for a move to `(x, y)`.
    fn xy(&mut self, x: f64, y: f64) -> (Num, Num) {
        match self.positioning {
            Positioning::Absolute => (Num(x), Num(y)),
            Positioning::Relative => {
                // Advance by the printed (rounded) delta so rounding never
                // accumulates.
                let dx = round3(x - self.x);
                let dy = round3(y - self.y);
                self.x += dx;
                self.y += dy;
                (Num(dx), Num(dy))
            }
        }
    }

    /// Coordinate to print for a move to height `z`.
    fn z(&mut self, z: f64) -> Num {
        match self.positioning {
            Positioning::Absolute => Num(z),
            Positioning::Relative => {
                let dz = round3(z - self.z);
                self.z += dz;
                Num(dz)
            }
        }
    }
}

/// Serialize strokes into a G-code program.
///
/// # Examples
///
/// ```
/// use hatchplot_pipeline::{Point, Polyline};
/// use hatchplot_export::gcode::{GcodeMetadata, GcodeOptions, to_gcode};
///
/// let strokes = vec![Polyline::new(vec![Point::new(0.0, 2.0), Point::new(9.0, 2.0)])];
/// let gcode = to_gcode(&strokes, &GcodeOptions::default(), &GcodeMetadata::default());
/// assert!(gcode.starts_with("G21\nG90\n"));
/// assert!(gcode.contains("G1 X9.000 Y2.000\n"));
/// ```
#[must_use]
pub fn to_gcode(
    strokes: &[Polyline],
    options: &GcodeOptions,
    metadata: &GcodeMetadata<'_>,
) -> String {
    let mut out = String::new();

    // --- Metadata header ---
    if let Some(title) = metadata.title {
        for line in title.lines() {
            let _ = writeln!(out, "; Source: {line}");
        }
    }
    if let Some(description) = metadata.description {
        for line in description.lines() {
            let _ = writeln!(out, "; {line}");
        }
    }
    if let Some(config_json) = metadata.config_json {
        for line in config_json.lines() {
            let _ = writeln!(out, "; Config: {line}");
        }
    }

    let travel = Num(options.travel_feed);
    let draw = Num(options.draw_feed);
    let mut head = Head::new(options.positioning);

    // --- Preamble ---
    let _ = writeln!(out, "G21");
    let _ = writeln!(out, "{}", options.positioning.code());
    let _ = writeln!(out, "G0 Z{}", head.z(options.pen_up_z));
    let _ = writeln!(out, "G0 F{travel}");

    // --- Strokes ---
    let mut emitted = 0usize;
    for stroke in strokes {
        let Some((first, rest)) = stroke.points().split_first() else {
            continue;
        };
        let (x, y) = head.xy(first.x, first.y);
        let _ = writeln!(out, "G0 X{x} Y{y} F{travel}");
        let _ = writeln!(out, "G1 Z{}", head.z(options.pen_down_z));
        let _ = writeln!(out, "G1 F{draw}");
        for point in rest {
            let (x, y) = head.xy(point.x, point.y);
            let _ = writeln!(out, "G1 X{x} Y{y}");
        }
        let _ = writeln!(out, "G0 Z{} F{travel}", head.z(options.pen_up_z));
        emitted += 1;
    }

    debug!(
        strokes = emitted,
        skipped = strokes.len() - emitted,
        bytes = out.len(),
        "serialized G-code"
    );
    out
}
