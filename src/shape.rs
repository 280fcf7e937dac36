use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::export::{ExportNode, SvgExport};
use crate::geom::{polar_offset, BBox, Point};
use crate::render::{Brush, Canvas};
use crate::settings::Settings;

/// max distance (px) of generated vertices from their anchor, and of a point move
const MAX_RADIUS: f64 = 20.0;

/// span of the signed edge shift / radius change; deltas fall in [-SPAN/2, SPAN/2)
const RESIZE_SPAN: f64 = 20.0;

/// Catalog entry for random sampling. Polygon carries its vertex count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Triangle,
    Rectangle,
    Ellipse,
    Debug,
    Polygon(usize),
}

impl FromStr for ShapeKind {
    type Err = String;

    /// Parse a shape kind (case-insensitive)
    ///
    /// Accepts: "triangle", "rectangle"/"rect", "ellipse", "debug", "polygon:N"
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "triangle" | "triangles" => Ok(ShapeKind::Triangle),
            "rectangle" | "rectangles" | "rect" => Ok(ShapeKind::Rectangle),
            "ellipse" | "ellipses" => Ok(ShapeKind::Ellipse),
            "debug" => Ok(ShapeKind::Debug),
            other => match other.strip_prefix("polygon:") {
                Some(count) => count
                    .parse::<usize>()
                    .map(ShapeKind::Polygon)
                    .map_err(|_| format!("Invalid polygon vertex count in '{}'", s)),
                None => Err(format!(
                    "Unknown shape type: '{}'. Valid options: triangle, rectangle, ellipse, debug, polygon:N",
                    s
                )),
            },
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeKind::Triangle => f.write_str("triangle"),
            ShapeKind::Rectangle => f.write_str("rectangle"),
            ShapeKind::Ellipse => f.write_str("ellipse"),
            ShapeKind::Debug => f.write_str("debug"),
            ShapeKind::Polygon(n) => write!(f, "polygon:{}", n),
        }
    }
}

/// geometry payload of each primitive
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Geometry {
    Polygon { points: Vec<Point> },
    Triangle { points: [Point; 3] },
    /// corners in order top-left, top-right, bottom-right, bottom-left
    Rectangle { points: [Point; 4] },
    Ellipse { center: Point, rx: i32, ry: i32 },
    /// 1.5px marker at the canvas origin; its bbox spans the whole canvas
    Debug { width: u32, height: u32 },
}

/// a geometric primitive with a cached bbox
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    geometry: Geometry,
    bbox: BBox,
}

impl Shape {
    /// pick a kind uniformly from the configured catalog and instantiate it on the canvas
    pub fn create<R: Rng + ?Sized>(settings: &Settings, rng: &mut R) -> Result<Self> {
        let kinds = &settings.shape_types;
        if kinds.is_empty() {
            return Err(Error::InvalidConfig("shape_types is empty".into()));
        }
        let kind = kinds[rng.random_range(0..kinds.len())];
        Self::new(kind, settings.width, settings.height, rng)
    }

    /// random instance of `kind` bounded by a width x height canvas
    pub fn new<R: Rng + ?Sized>(kind: ShapeKind, width: u32, height: u32, rng: &mut R) -> Result<Self> {
        profiling::scope!("Shape::new");
        if width == 0 || height == 0 {
            return Err(Error::InvalidConfig(format!("canvas must be non-empty, got {}x{}", width, height)));
        }

        let geometry = match kind {
            ShapeKind::Polygon(count) => {
                if count < 3 {
                    return Err(Error::InvalidConfig(format!("polygon needs at least 3 points, got {}", count)));
                }
                Geometry::Polygon { points: anchored_points(width, height, count, rng) }
            }
            ShapeKind::Triangle => {
                let p = anchored_points(width, height, 3, rng);
                Geometry::Triangle { points: [p[0], p[1], p[2]] }
            }
            ShapeKind::Rectangle => {
                let p1 = random_point(width, height, rng);
                let p2 = random_point(width, height, rng);
                Geometry::Rectangle { points: rect_corners(p1, p2) }
            }
            ShapeKind::Ellipse => Geometry::Ellipse {
                center: random_point(width, height, rng),
                rx: 1 + (rng.random::<f64>() * MAX_RADIUS) as i32,
                ry: 1 + (rng.random::<f64>() * MAX_RADIUS) as i32,
            },
            ShapeKind::Debug => Geometry::Debug { width, height },
        };

        Ok(Self::from_geometry(geometry))
    }

    /// wrap a geometry, computing its bbox
    pub fn from_geometry(geometry: Geometry) -> Self {
        let bbox = compute_bbox(&geometry);
        Self { geometry, bbox }
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn kind(&self) -> ShapeKind {
        match &self.geometry {
            Geometry::Polygon { points } => ShapeKind::Polygon(points.len()),
            Geometry::Triangle { .. } => ShapeKind::Triangle,
            Geometry::Rectangle { .. } => ShapeKind::Rectangle,
            Geometry::Ellipse { .. } => ShapeKind::Ellipse,
            Geometry::Debug { .. } => ShapeKind::Debug,
        }
    }

    /// Return a new shape of the same kind with exactly one random perturbation.
    pub fn mutate<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        profiling::scope!("Shape::mutate");
        let mut geometry = self.geometry.clone();

        match &mut geometry {
            Geometry::Polygon { points } => move_random_point(points, rng),
            Geometry::Triangle { points } => move_random_point(points, rng),
            Geometry::Rectangle { points } => {
                let amount = signed_delta(rng) as i32;
                match rng.random_range(0..4) {
                    0 => {
                        // left
                        points[0].0 += amount;
                        points[3].0 += amount;
                    }
                    1 => {
                        // top
                        points[0].1 += amount;
                        points[1].1 += amount;
                    }
                    2 => {
                        // right
                        points[1].0 += amount;
                        points[2].0 += amount;
                    }
                    _ => {
                        // bottom
                        points[2].1 += amount;
                        points[3].1 += amount;
                    }
                }
                // an edge pushed past its opposite flips the box; keep corner order canonical
                *points = rect_corners(points[0], points[2]);
            }
            Geometry::Ellipse { center, rx, ry } => match rng.random_range(0..3) {
                0 => {
                    let (dx, dy) = polar_offset(rng.random::<f64>() * TAU, rng.random::<f64>() * MAX_RADIUS);
                    center.0 += dx;
                    center.1 += dy;
                }
                1 => *rx = resize_radius(*rx, rng),
                _ => *ry = resize_radius(*ry, rng),
            },
            Geometry::Debug { .. } => {}
        }

        Self::from_geometry(geometry)
    }

    /// bbox of the current geometry; width and height never drop below 1
    pub fn compute_bbox(&self) -> BBox {
        compute_bbox(&self.geometry)
    }

    /// Render into a bbox-sized transparent surface, translated so the bbox corner
    /// sits at the origin. The fill is black at `alpha`, so the mask's alpha
    /// channel holds coverage x alpha.
    pub fn rasterize(&self, alpha: f32, antialias: bool) -> Result<Canvas> {
        profiling::scope!("Shape::rasterize");
        let mut mask = Canvas::new(self.bbox.width, self.bbox.height)?;
        let brush = Brush {
            alpha,
            antialias,
            origin: (self.bbox.left, self.bbox.top),
        };
        self.render(&mut mask, &brush)?;
        Ok(mask)
    }

    /// draw the shape onto any surface with the given brush
    pub fn render(&self, surface: &mut Canvas, brush: &Brush) -> Result<()> {
        match &self.geometry {
            Geometry::Polygon { points } => surface.fill_polygon(points, brush),
            Geometry::Triangle { points } => surface.fill_polygon(points, brush),
            Geometry::Rectangle { points } => surface.fill_polygon(points, brush),
            Geometry::Ellipse { center, rx, ry } => surface.fill_ellipse(*center, *rx, *ry, brush),
            Geometry::Debug { .. } => surface.fill_rect(0.0, 0.0, 1.5, 1.5, brush),
        }
    }

    /// markup node describing the shape; purely representational
    pub fn to_export_node(&self, ctx: &SvgExport) -> ExportNode {
        match &self.geometry {
            Geometry::Polygon { points } => ctx.path(points),
            Geometry::Triangle { points } => ctx.path(points),
            Geometry::Rectangle { points } => ctx.path(points),
            Geometry::Ellipse { center, rx, ry } => ctx.ellipse(*center, *rx, *ry),
            Geometry::Debug { .. } => ctx.rect(0.0, 0.0, 1.5, 1.5),
        }
    }
}

fn compute_bbox(geometry: &Geometry) -> BBox {
    match geometry {
        Geometry::Polygon { points } => BBox::from_points(points),
        Geometry::Triangle { points } => BBox::from_points(points),
        Geometry::Rectangle { points } => BBox::from_points(points),
        Geometry::Ellipse { center, rx, ry } => BBox::new(center.0 - rx, center.1 - ry, 2 * rx, 2 * ry),
        Geometry::Debug { width, height } => BBox::new(0, 0, *width as i32, *height as i32),
    }
}

#[inline]
fn random_point<R: Rng + ?Sized>(width: u32, height: u32, rng: &mut R) -> Point {
    (rng.random_range(0..width as i32), rng.random_range(0..height as i32))
}

/// one anchor inside the canvas plus count-1 points scattered around it
fn anchored_points<R: Rng + ?Sized>(width: u32, height: u32, count: usize, rng: &mut R) -> Vec<Point> {
    let first = random_point(width, height, rng);
    let mut points = Vec::with_capacity(count);
    points.push(first);
    for _ in 1..count {
        let (dx, dy) = polar_offset(rng.random::<f64>() * TAU, rng.random::<f64>() * MAX_RADIUS);
        points.push((first.0 + dx, first.1 + dy));
    }
    points
}

/// canonical corners of the axis-aligned box spanned by two opposite points
#[inline]
fn rect_corners(p1: Point, p2: Point) -> [Point; 4] {
    let left = p1.0.min(p2.0);
    let right = p1.0.max(p2.0);
    let top = p1.1.min(p2.1);
    let bottom = p1.1.max(p2.1);
    [(left, top), (right, top), (right, bottom), (left, bottom)]
}

fn move_random_point<R: Rng + ?Sized>(points: &mut [Point], rng: &mut R) {
    let index = rng.random_range(0..points.len());
    let (dx, dy) = polar_offset(rng.random::<f64>() * TAU, rng.random::<f64>() * MAX_RADIUS);
    points[index].0 += dx;
    points[index].1 += dy;
}

#[inline]
fn signed_delta<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    (rng.random::<f64>() - 0.5) * RESIZE_SPAN
}

#[inline]
fn resize_radius<R: Rng + ?Sized>(radius: i32, rng: &mut R) -> i32 {
    ((radius as f64 + signed_delta(rng)).floor() as i32).max(1)
}
