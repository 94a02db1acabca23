//! SVG export serializer.
//!
//! Converts strokes into an SVG string with one `<path>` element per
//! stroke, using the [`svg`] crate for document construction, XML
//! escaping, and path data formatting.
//!
//! Stroke coordinates are already in millimetres, so the document's
//! `width`/`height` carry an `mm` unit and the `viewBox` maps one user
//! unit to one millimetre. Paths use round caps so zero-length strokes
//! (single dark pixels) still render as dots.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Path, Title};
use svg::node::{Node, Text, Value};

use hatchplot_pipeline::Polyline;

/// Pen width drawn in the document, in millimetres.
pub const DEFAULT_STROKE_WIDTH_MM: f64 = 0.3;

/// Metadata to embed in the SVG document.
///
/// All fields are optional. When present, `<title>`, `<desc>` and
/// `<metadata>` elements are emitted immediately after the opening
/// `<svg>` tag.
///
/// Text values are XML-escaped automatically by the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title: emitted as `<title>`.
    ///
    /// Typically the source image filename.
    pub title: Option<&'a str>,

    /// Document description: emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized `PlotConfig` JSON: emitted inside `<metadata>` in a
    /// namespaced `<hatchplot:config>` element.
    pub config_json: Option<&'a str>,
}

/// Build an SVG path `d` attribute string from a stroke.
///
/// Uses `M` for the first point and `L` for subsequent points.
/// Returns an empty string for strokes with fewer than 2 points.
///
/// # Examples
///
/// ```
/// use hatchplot_pipeline::{Point, Polyline};
/// use hatchplot_export::build_path_data;
///
/// let stroke = Polyline::new(vec![Point::new(1.5, 2.0), Point::new(4.0, 2.0)]);
/// assert_eq!(build_path_data(&stroke), "M1.5,2 L4,2");
/// ```
#[must_use]
pub fn build_path_data(polyline: &Polyline) -> String {
    let Some((first, rest)) = polyline.points().split_first() else {
        return String::new();
    };
    if rest.is_empty() {
        return String::new();
    }

    let mut data = Data::new().move_to((first.x, first.y));
    for p in rest {
        data = data.line_to((p.x, p.y));
    }
    String::from(Value::from(data))
}

/// Serialize strokes into an SVG document `size_mm` wide and tall.
///
/// `size_mm` is `(width, height)` in millimetres, typically
/// [`PlotJob::extent_mm`](hatchplot_pipeline::PlotJob::extent_mm).
#[must_use]
pub fn to_svg(strokes: &[Polyline], size_mm: (f64, f64), metadata: &SvgMetadata<'_>) -> String {
    let (width, height) = size_mm;
    let mut doc = Document::new()
        .set("width", format!("{width}mm"))
        .set("height", format!("{height}mm"))
        .set("viewBox", (0, 0, width, height));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }

    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("hatchplot:config");
        config_el.assign("xmlns:hatchplot", "https://hatchplot.dev/ns/1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    for stroke in strokes {
        let d = build_path_data(stroke);
        if d.is_empty() {
            continue;
        }

        let path = Path::new()
            .set("d", d)
            .set("fill", "none")
            .set("stroke", "black")
            .set("stroke-width", DEFAULT_STROKE_WIDTH_MM)
            .set("stroke-linecap", "round");
        doc = doc.add(path);
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}
