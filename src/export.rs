// SVG output: a factory for per-shape markup nodes plus final document assembly
use std::fmt;
use std::path::Path as FsPath;

use svg::node::element::path::Data;
use svg::node::element::{Ellipse, Path, Rectangle};
use svg::node::Value;
use svg::Document;

use crate::error::Result;
use crate::geom::Point;

/// Export context handed to the optimizer. Nodes live in compute-size
/// coordinates; `scale` only affects the document's outer size.
#[derive(Clone, Debug, PartialEq)]
pub struct SvgExport {
    width: u32,
    height: u32,
    scale: f32,
}

impl SvgExport {
    pub fn new(width: u32, height: u32, scale: f32) -> Self {
        Self { width, height, scale }
    }

    /// context whose document's longest side is `view_size`
    pub fn with_view_size(width: u32, height: u32, view_size: u32) -> Self {
        let longest = width.max(height).max(1);
        Self::new(width, height, view_size as f32 / longest as f32)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// closed polyline `M x,y L x,y ... z`
    pub fn path(&self, points: &[Point]) -> ExportNode {
        let mut data = Data::new();
        for (i, &(x, y)) in points.iter().enumerate() {
            data = if i == 0 {
                data.move_to((x as f32, y as f32))
            } else {
                data.line_to((x as f32, y as f32))
            };
        }
        ExportNode::Path(Path::new().set("d", data.close()))
    }

    pub fn ellipse(&self, center: Point, rx: i32, ry: i32) -> ExportNode {
        ExportNode::Ellipse(
            Ellipse::new()
                .set("cx", center.0)
                .set("cy", center.1)
                .set("rx", rx)
                .set("ry", ry),
        )
    }

    pub fn rect(&self, x: f32, y: f32, width: f32, height: f32) -> ExportNode {
        ExportNode::Rect(
            Rectangle::new()
                .set("x", x)
                .set("y", y)
                .set("width", width)
                .set("height", height),
        )
    }

    /// Assemble the final document: background fill, then nodes in acceptance order.
    pub fn document<I>(&self, background: [u8; 3], nodes: I) -> Document
    where
        I: IntoIterator<Item = ExportNode>,
    {
        profiling::scope!("SvgExport::document");
        let background = Rectangle::new()
            .set("x", 0)
            .set("y", 0)
            .set("width", self.width)
            .set("height", self.height)
            .set("fill", rgb(background));

        let mut document = Document::new()
            .set("width", (self.width as f32 * self.scale).round())
            .set("height", (self.height as f32 * self.scale).round())
            .set("viewBox", format!("0 0 {} {}", self.width, self.height))
            .add(background);

        for node in nodes {
            document = node.add_to(document);
        }
        document
    }

    pub fn save(&self, path: impl AsRef<FsPath>, document: &Document) -> Result<()> {
        svg::save(path, document)?;
        Ok(())
    }
}

/// CSS `rgb()` colour string
#[inline]
pub fn rgb(color: [u8; 3]) -> String {
    format!("rgb({},{},{})", color[0], color[1], color[2])
}

/// one markup node produced by the export context
#[derive(Clone, Debug)]
pub enum ExportNode {
    Path(Path),
    Ellipse(Ellipse),
    Rect(Rectangle),
}

impl ExportNode {
    /// set an attribute on whichever element this is
    pub fn set<T, U>(self, name: T, value: U) -> Self
    where
        T: Into<String>,
        U: Into<Value>,
    {
        match self {
            ExportNode::Path(node) => ExportNode::Path(node.set(name, value)),
            ExportNode::Ellipse(node) => ExportNode::Ellipse(node.set(name, value)),
            ExportNode::Rect(node) => ExportNode::Rect(node.set(name, value)),
        }
    }

    fn add_to(self, document: Document) -> Document {
        match self {
            ExportNode::Path(node) => document.add(node),
            ExportNode::Ellipse(node) => document.add(node),
            ExportNode::Rect(node) => document.add(node),
        }
    }
}

impl fmt::Display for ExportNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportNode::Path(node) => fmt::Display::fmt(node, f),
            ExportNode::Ellipse(node) => fmt::Display::fmt(node, f),
            ExportNode::Rect(node) => fmt::Display::fmt(node, f),
        }
    }
}
