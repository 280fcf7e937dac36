// integer geometry shared by shapes, the raster surface and the fitness code
//
// shapes live in canvas pixel space with integer vertices. a shape's bbox may
// hang off any edge of the canvas; PixelRect is the clipped, inclusive part
// that actually maps onto pixels.

use serde::{Deserialize, Serialize};

/// 2d integer point (x, y) in canvas pixels
pub type Point = (i32, i32);

/// axis-aligned bounding box of a shape. width and height are never below 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl BBox {
    /// build a bbox from a signed extent, clamping degenerate (<= 0) sizes to 1
    #[inline]
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        // fallback for deformed shapes
        Self {
            left,
            top,
            width: width.max(1) as u32,
            height: height.max(1) as u32,
        }
    }

    /// min/max over a point list. empty input yields a 1x1 box at the origin.
    pub fn from_points(points: &[Point]) -> Self {
        if points.is_empty() {
            return Self::new(0, 0, 1, 1);
        }

        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for &(x, y) in points {
            if x < min_x { min_x = x; }
            if y < min_y { min_y = y; }
            if x > max_x { max_x = x; }
            if y > max_y { max_y = y; }
        }

        Self::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    /// intersect with a width x height canvas. None when nothing overlaps.
    pub fn clip(&self, width: u32, height: u32) -> Option<PixelRect> {
        let x0 = self.left.max(0);
        let y0 = self.top.max(0);
        let x1 = self.right().min(width as i32) - 1;
        let y1 = self.bottom().min(height as i32) - 1;
        if x1 < x0 || y1 < y0 {
            return None;
        }
        Some(PixelRect::new(x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// pixel rectangle with inclusive bounds, always inside the canvas it was clipped to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    #[inline]
    pub fn new(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        debug_assert!(x0 <= x1, "invalid rect: x0={} > x1={}", x0, x1);
        debug_assert!(y0 <= y1, "invalid rect: y0={} > y1={}", y0, y1);
        PixelRect { x0, y0, x1, y1 }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.x1 - self.x0 + 1
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.y1 - self.y0 + 1
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() as usize * self.height() as usize
    }
}

/// offset of length radius in direction angle, truncated toward zero per axis
#[inline]
pub fn polar_offset(angle: f64, radius: f64) -> Point {
    ((radius * angle.cos()) as i32, (radius * angle.sin()) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_points() {
        let bbox = BBox::from_points(&[(3, 4), (10, 2), (7, 9)]);
        assert_eq!(bbox, BBox { left: 3, top: 2, width: 7, height: 7 });
        assert_eq!(bbox.right(), 10);
        assert_eq!(bbox.bottom(), 9);
    }

    #[test]
    fn test_degenerate_bbox_clamped() {
        // all points on one vertical line
        let bbox = BBox::from_points(&[(5, 1), (5, 8), (5, 3)]);
        assert_eq!(bbox.width, 1);
        assert_eq!(bbox.height, 7);

        // a single repeated point
        let bbox = BBox::from_points(&[(2, 2), (2, 2)]);
        assert_eq!((bbox.width, bbox.height), (1, 1));

        let bbox = BBox::new(0, 0, -4, 0);
        assert_eq!((bbox.width, bbox.height), (1, 1));
    }

    #[test]
    fn test_clip_inside_and_outside() {
        let bbox = BBox::new(-3, 2, 10, 4);
        let rect = bbox.clip(5, 5).expect("overlaps");
        assert_eq!(rect, PixelRect::new(0, 2, 4, 4));
        assert_eq!(rect.area(), 15);

        assert!(BBox::new(20, 20, 3, 3).clip(5, 5).is_none());
        assert!(BBox::new(-10, 0, 10, 3).clip(5, 5).is_none());
    }

    #[test]
    fn test_polar_offset_truncates() {
        assert_eq!(polar_offset(0.0, 19.9), (19, 0));
        assert_eq!(polar_offset(std::f64::consts::PI, 3.7), (-3, 0));
    }
}
