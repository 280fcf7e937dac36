// raster surface: a tiny-skia pixmap plus the pixel-level operations the optimizer needs
use std::path::Path;

use tiny_skia as sk;

use crate::error::{Error, Result};
use crate::fitness::{difference_rgb_parallel, difference_to_distance, pixel_offset};
use crate::geom::{BBox, PixelRect, Point};

/// how a shape is filled onto a surface: uniform alpha, optional AA, and the
/// canvas-space point that maps to the surface's origin
#[derive(Clone, Copy, Debug)]
pub struct Brush {
    pub alpha: f32,
    pub antialias: bool,
    pub origin: Point,
}

impl Brush {
    fn paint(&self) -> Result<sk::Paint<'static>> {
        let color = sk::Color::from_rgba(0.0, 0.0, 0.0, self.alpha)
            .ok_or_else(|| Error::Raster(format!("alpha out of range: {}", self.alpha)))?;
        let mut paint = sk::Paint::default();
        paint.anti_alias = self.antialias;
        paint.shader = sk::Shader::SolidColor(color);
        Ok(paint)
    }

    #[inline]
    fn transform(&self) -> sk::Transform {
        sk::Transform::from_translate(-self.origin.0 as f32, -self.origin.1 as f32)
    }
}

/// RGBA surface in tiny-skia's native premultiplied layout.
/// the working canvas is always opaque, so its RGB bytes are straight colour.
#[derive(Clone, Debug)]
pub struct Canvas {
    pix: sk::Pixmap,
}

/// composited copy of the canvas pixels under a shape, packed row by row
#[derive(Clone, Debug)]
pub struct Patch {
    rect: PixelRect,
    rgba: Vec<u8>,
}

impl Patch {
    #[inline]
    pub fn rect(&self) -> PixelRect {
        self.rect
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.rgba
    }
}

impl Canvas {
    /// transparent surface. fails for zero or oversized dimensions.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        sk::Pixmap::new(width, height)
            .map(|pix| Self { pix })
            .ok_or_else(|| Error::Raster(format!("cannot allocate {}x{} surface", width, height)))
    }

    /// opaque surface of a single colour
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self> {
        let mut canvas = Self::new(width, height)?;
        canvas.pix.fill(sk::Color::from_rgba8(rgb[0], rgb[1], rgb[2], 255));
        Ok(canvas)
    }

    /// surface from un-premultiplied RGBA8 bytes (what the image loader hands out)
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(Error::Raster(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
                expected, width, height, rgba.len()
            )));
        }
        let mut canvas = Self::new(width, height)?;
        canvas.pix.data_mut().copy_from_slice(&premultiply(rgba));
        Ok(canvas)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.pix.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.pix.height()
    }

    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// premultiplied RGBA bytes
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.pix.data()
    }

    pub(crate) fn check_size(&self, other: &Canvas) -> Result<()> {
        if self.width() != other.width() || self.height() != other.height() {
            return Err(Error::SizeMismatch {
                expected_width: self.width(),
                expected_height: self.height(),
                width: other.width(),
                height: other.height(),
            });
        }
        Ok(())
    }

    /// summed squared RGB error against another surface of the same size
    pub fn difference(&self, other: &Canvas) -> Result<u64> {
        self.check_size(other)?;
        Ok(difference_rgb_parallel(self.data(), other.data()))
    }

    /// pixel-difference metric in [0, 1]; lower is more similar
    pub fn distance(&self, other: &Canvas) -> Result<f64> {
        Ok(difference_to_distance(self.difference(other)?, self.num_pixels()))
    }

    /// Find the dominant color of the surface.
    /// Uses a quantized color space to find the most common color region,
    /// then averages all pixels in that region.
    pub fn dominant_color(&self) -> [u8; 3] {
        profiling::scope!("dominant_color");
        let rgba = self.data();

        // only keep the 3 highest bits of each channel
        let mut bins = [[[0u64; 8]; 8]; 8];
        for px in rgba.chunks_exact(4) {
            bins[(px[0] >> 5) as usize][(px[1] >> 5) as usize][(px[2] >> 5) as usize] += 1;
        }

        let mut best = (0usize, 0usize, 0usize);
        let mut max_count = 0;
        for r in 0..8 {
            for g in 0..8 {
                for b in 0..8 {
                    if bins[r][g][b] > max_count {
                        max_count = bins[r][g][b];
                        best = (r, g, b);
                    }
                }
            }
        }

        // out of all the colors in the winning bin, take the average
        let mut sum = [0u64; 3];
        let mut count = 0u64;
        for px in rgba.chunks_exact(4) {
            if ((px[0] >> 5) as usize, (px[1] >> 5) as usize, (px[2] >> 5) as usize) == best {
                sum[0] += px[0] as u64;
                sum[1] += px[1] as u64;
                sum[2] += px[2] as u64;
                count += 1;
            }
        }

        if count > 0 {
            [(sum[0] / count) as u8, (sum[1] / count) as u8, (sum[2] / count) as u8]
        } else {
            [255, 255, 255] // default to white if nothing found
        }
    }

    /// closed polygon through the given points
    pub fn fill_polygon(&mut self, points: &[Point], brush: &Brush) -> Result<()> {
        profiling::scope!("fill_polygon");
        let Some(&(x0, y0)) = points.first() else {
            return Ok(());
        };

        let mut pb = sk::PathBuilder::new();
        pb.move_to(x0 as f32, y0 as f32);
        for &(x, y) in &points[1..] {
            pb.line_to(x as f32, y as f32);
        }
        pb.close();
        // collinear or coincident points cover no pixels
        let Some(path) = pb.finish() else {
            return Ok(());
        };
        let bounds = path.bounds();
        if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
            return Ok(());
        }

        self.pix.fill_path(&path, &brush.paint()?, sk::FillRule::Winding, brush.transform(), None);
        Ok(())
    }

    /// axis-aligned ellipse
    pub fn fill_ellipse(&mut self, center: Point, rx: i32, ry: i32, brush: &Brush) -> Result<()> {
        profiling::scope!("fill_ellipse");
        let oval = sk::Rect::from_xywh(
            (center.0 - rx) as f32,
            (center.1 - ry) as f32,
            (2 * rx) as f32,
            (2 * ry) as f32,
        )
        .ok_or_else(|| Error::Raster(format!("invalid ellipse bounds: {:?} {}x{}", center, rx, ry)))?;
        let path = sk::PathBuilder::from_oval(oval)
            .ok_or_else(|| Error::Raster(format!("degenerate ellipse: {}x{}", rx, ry)))?;

        self.pix.fill_path(&path, &brush.paint()?, sk::FillRule::Winding, brush.transform(), None);
        Ok(())
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, brush: &Brush) -> Result<()> {
        let rect = sk::Rect::from_xywh(x, y, width, height)
            .ok_or_else(|| Error::Raster(format!("invalid rect: {} {} {} {}", x, y, width, height)))?;
        self.pix.fill_rect(rect, &brush.paint()?, brush.transform(), None);
        Ok(())
    }

    /// Colour that best fills `mask` (placed at the bbox origin) on top of this canvas.
    /// Least squares over the covered pixels of `c + a·(k − c)` against the target,
    /// solved per channel: k = Σ a·(t − c + a·c) / Σ a², rounded and clamped.
    /// Faint edge coverage weighs in by a², so it cannot drag the colour to an extreme.
    /// Nothing covered yields black.
    pub fn optimal_color(&self, target: &Canvas, bbox: BBox, mask: &Canvas) -> [u8; 3] {
        profiling::scope!("optimal_color");
        let Some(rect) = bbox.clip(self.width(), self.height()) else {
            return [0, 0, 0];
        };

        let stride = self.width();
        let mask_w = mask.width();
        let current = self.data();
        let target = target.data();
        let mask = mask.data();

        let mut num = [0f64; 3];
        let mut den = 0f64;
        for y in rect.y0..=rect.y1 {
            let my = (y as i32 - bbox.top) as u32;
            for x in rect.x0..=rect.x1 {
                let mx = (x as i32 - bbox.left) as u32;
                let coverage = mask[pixel_offset(mx, my, mask_w) + 3];
                if coverage == 0 {
                    continue;
                }
                let a = coverage as f64 / 255.0;
                let idx = pixel_offset(x, y, stride);
                for ch in 0..3 {
                    let t = target[idx + ch] as f64;
                    let c = current[idx + ch] as f64;
                    num[ch] += a * (t - c + a * c);
                }
                den += a * a;
            }
        }

        if den == 0.0 {
            return [0, 0, 0];
        }
        num.map(|n| (n / den).round().clamp(0.0, 255.0) as u8)
    }

    /// Copy the canvas region under `bbox` and blend `color` into it through the mask.
    /// The canvas itself is left untouched. None when the bbox misses the canvas.
    pub fn composite(&self, bbox: BBox, mask: &Canvas, color: [u8; 3]) -> Option<Patch> {
        profiling::scope!("composite");
        let rect = bbox.clip(self.width(), self.height())?;

        let stride = self.width();
        let mask_w = mask.width();
        let current = self.data();
        let mask = mask.data();

        let mut rgba = Vec::with_capacity(rect.area() * 4);
        for y in rect.y0..=rect.y1 {
            let my = (y as i32 - bbox.top) as u32;
            for x in rect.x0..=rect.x1 {
                let mx = (x as i32 - bbox.left) as u32;
                let coverage = mask[pixel_offset(mx, my, mask_w) + 3];
                let idx = pixel_offset(x, y, stride);
                let px = &current[idx..idx + 4];
                if coverage == 0 {
                    rgba.extend_from_slice(px);
                } else {
                    let a = coverage as f32 / 255.0;
                    rgba.extend_from_slice(&[
                        blend_channel(px[0], color[0], a),
                        blend_channel(px[1], color[1], a),
                        blend_channel(px[2], color[2], a),
                        px[3],
                    ]);
                }
            }
        }

        Some(Patch { rect, rgba })
    }

    /// write a patch produced by `composite` back into the canvas
    pub fn paste(&mut self, patch: &Patch) {
        profiling::scope!("paste");
        let stride = self.width();
        let row_bytes = patch.rect.width() as usize * 4;
        let dst = self.pix.data_mut();
        for (row, y) in (patch.rect.y0..=patch.rect.y1).enumerate() {
            let start = pixel_offset(patch.rect.x0, y, stride);
            dst[start..start + row_bytes].copy_from_slice(&patch.rgba[row * row_bytes..(row + 1) * row_bytes]);
        }
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        profiling::scope!("save_png");
        self.pix
            .save_png(path)
            .map_err(|e| Error::Raster(format!("png encode failed: {}", e)))
    }
}

/// source-over of `color` at opacity `a` onto an opaque channel value
#[inline(always)]
fn blend_channel(current: u8, color: u8, a: f32) -> u8 {
    let c = current as f32;
    (c + (color as f32 - c) * a).round().clamp(0.0, 255.0) as u8
}

/// Premultiply RGBA - optimized scalar implementation (compiler will auto-vectorize)
#[inline(always)]
fn premultiply(p: &[u8]) -> Vec<u8> {
    profiling::scope!("premultiply");

    let mut out = vec![0u8; p.len()];
    for (src, dst) in p.chunks_exact(4).zip(out.chunks_exact_mut(4)) {
        let a = src[3] as u16;
        // (x * a + 127) / 255 is a fast rounded divide-by-255
        dst[0] = ((src[0] as u16 * a + 127) / 255) as u8;
        dst[1] = ((src[1] as u16 * a + 127) / 255) as u8;
        dst[2] = ((src[2] as u16 * a + 127) / 255) as u8;
        dst[3] = a as u8;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brush(alpha: f32) -> Brush {
        Brush { alpha, antialias: false, origin: (0, 0) }
    }

    #[test]
    fn test_new_rejects_zero_size() {
        assert!(matches!(Canvas::new(0, 4), Err(Error::Raster(_))));
    }

    #[test]
    fn test_from_rgba_premultiplies() {
        let canvas = Canvas::from_rgba(1, 1, &[200, 100, 50, 128]).unwrap();
        assert_eq!(canvas.data(), &[100, 50, 25, 128]);
        assert!(Canvas::from_rgba(2, 2, &[0; 4]).is_err());
    }

    #[test]
    fn test_distance_identical_and_mismatch() {
        let a = Canvas::filled(8, 6, [12, 34, 56]).unwrap();
        let b = a.clone();
        assert_eq!(a.distance(&b).unwrap(), 0.0);
        assert_eq!(a.distance(&b).unwrap(), a.distance(&b).unwrap());

        let c = Canvas::filled(6, 8, [12, 34, 56]).unwrap();
        assert!(matches!(a.distance(&c), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_dominant_color_picks_majority() {
        let mut rgba = Vec::new();
        for i in 0..100 {
            if i < 70 {
                rgba.extend_from_slice(&[10, 200, 30, 255]);
            } else {
                rgba.extend_from_slice(&[250, 250, 250, 255]);
            }
        }
        let canvas = Canvas::from_rgba(10, 10, &rgba).unwrap();
        assert_eq!(canvas.dominant_color(), [10, 200, 30]);
    }

    #[test]
    fn test_fill_polygon_covers_interior() {
        let mut mask = Canvas::new(10, 10).unwrap();
        mask.fill_polygon(&[(0, 0), (10, 0), (10, 10), (0, 10)], &brush(1.0)).unwrap();
        assert!(mask.data().chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn test_fill_polygon_degenerate_is_noop() {
        let mut mask = Canvas::new(4, 4).unwrap();
        mask.fill_polygon(&[(1, 1), (3, 1), (2, 1)], &brush(1.0)).unwrap();
        mask.fill_polygon(&[(2, 2), (2, 2), (2, 2)], &brush(1.0)).unwrap();
        mask.fill_polygon(&[], &brush(1.0)).unwrap();
        assert!(mask.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_ellipse_respects_origin() {
        let mut mask = Canvas::new(10, 10).unwrap();
        let b = Brush { alpha: 0.5, antialias: false, origin: (100, 100) };
        mask.fill_ellipse((105, 105), 3, 3, &b).unwrap();
        // centre pixel covered at half opacity, corner untouched
        let centre = ((5 * 10 + 5) * 4 + 3) as usize;
        assert!((mask.data()[centre] as i32 - 128).abs() <= 1);
        assert_eq!(mask.data()[3], 0);
    }

    #[test]
    fn test_composite_and_paste_match_optimal_color() {
        let target = Canvas::filled(4, 4, [200, 0, 0]).unwrap();
        let mut canvas = Canvas::filled(4, 4, [0, 0, 0]).unwrap();
        let bbox = BBox::new(0, 0, 4, 4);
        let mut mask = Canvas::new(4, 4).unwrap();
        mask.fill_rect(0.0, 0.0, 4.0, 4.0, &brush(1.0)).unwrap();

        let color = canvas.optimal_color(&target, bbox, &mask);
        assert_eq!(color, [200, 0, 0]);

        let patch = canvas.composite(bbox, &mask, color).unwrap();
        // compositing works on a copy
        assert_eq!(canvas.data()[0], 0);
        canvas.paste(&patch);
        assert_eq!(canvas.difference(&target).unwrap(), 0);
    }

    #[test]
    fn test_optimal_color_ignores_faint_edge() {
        let target = Canvas::filled(4, 1, [100, 100, 100]).unwrap();
        let canvas = Canvas::filled(4, 1, [0, 0, 0]).unwrap();
        let bbox = BBox::new(0, 0, 4, 1);
        // three fully covered pixels and one barely touched edge pixel
        let mask = Canvas::from_rgba(4, 1, &[0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 1]).unwrap();

        let color = canvas.optimal_color(&target, bbox, &mask);
        assert_eq!(color, [100, 100, 100]);

        let fitted = canvas.composite(bbox, &mask, color).unwrap();
        let white = canvas.composite(bbox, &mask, [255, 255, 255]).unwrap();
        let mut with_fit = canvas.clone();
        with_fit.paste(&fitted);
        let mut with_white = canvas.clone();
        with_white.paste(&white);
        assert_eq!(with_fit.difference(&target).unwrap(), 30000);
        assert!(with_fit.difference(&target).unwrap() < with_white.difference(&target).unwrap());
    }

    #[test]
    fn test_optimal_color_half_coverage() {
        // c + 0.5·(k − c) = t has the exact answer k = 2t − c
        let target = Canvas::filled(2, 2, [60, 80, 100]).unwrap();
        let canvas = Canvas::filled(2, 2, [20, 40, 60]).unwrap();
        let mut mask = Canvas::new(2, 2).unwrap();
        mask.fill_rect(0.0, 0.0, 2.0, 2.0, &brush(0.5)).unwrap();
        let a = mask.data()[3] as f64 / 255.0;
        let expected = [60.0, 80.0, 100.0f64]
            .iter()
            .zip([20.0, 40.0, 60.0f64])
            .map(|(t, c)| ((t - c) / a + c).round() as u8)
            .collect::<Vec<_>>();
        assert_eq!(canvas.optimal_color(&target, BBox::new(0, 0, 2, 2), &mask).to_vec(), expected);
    }

    #[test]
    fn test_composite_outside_canvas() {
        let canvas = Canvas::filled(4, 4, [0, 0, 0]).unwrap();
        let mask = Canvas::new(2, 2).unwrap();
        let bbox = BBox::new(10, 10, 2, 2);
        assert!(canvas.composite(bbox, &mask, [1, 2, 3]).is_none());
        assert_eq!(canvas.optimal_color(&canvas, bbox, &mask), [0, 0, 0]);
    }
}
