/// Sum of squared differences over the RGB channels of two RGBA buffers.
/// alpha is skipped: the working canvas is always opaque and the target's coverage
/// is already folded into its premultiplied colour.
use rayon::prelude::*;

use crate::geom::PixelRect;

#[inline(always)]
fn sq_diff_rgb(t: &[u8], c: &[u8]) -> u64 {
    let dr = t[0] as i32 - c[0] as i32;
    let dg = t[1] as i32 - c[1] as i32;
    let db = t[2] as i32 - c[2] as i32;
    (dr * dr + dg * dg + db * db) as u64
}

/// byte offset of pixel (x, y) in an RGBA buffer `stride` pixels wide.
/// done in usize so frames past 4 GiB of bytes index correctly.
#[inline(always)]
pub fn pixel_offset(x: u32, y: u32, stride: u32) -> usize {
    (y as usize * stride as usize + x as usize) * 4
}

/// full-frame squared error, chunked across the rayon pool.
/// integer accumulation keeps the result exact and independent of the split.
pub fn difference_rgb_parallel(target_rgba: &[u8], current_rgba: &[u8]) -> u64 {
    profiling::scope!("difference_rgb_parallel");
    debug_assert_eq!(target_rgba.len(), current_rgba.len());
    debug_assert_eq!(target_rgba.len() % 4, 0);

    // 64k pixels per rayon unit; small images stay on one thread
    const MIN_CHUNK_BYTES: usize = 64 * 1024 * 4;

    target_rgba
        .par_chunks(MIN_CHUNK_BYTES)
        .zip(current_rgba.par_chunks(MIN_CHUNK_BYTES))
        .map(|(t_chunk, c_chunk)| {
            t_chunk
                .chunks_exact(4)
                .zip(c_chunk.chunks_exact(4))
                .map(|(t, c)| sq_diff_rgb(t, c))
                .sum::<u64>()
        })
        .sum()
}

/// squared error over a rectangle of two full-frame buffers.
/// stride is the width of the full image in pixels.
pub fn difference_rgb_rect(target: &[u8], current: &[u8], rect: PixelRect, stride: u32) -> u64 {
    profiling::scope!("difference_rgb_rect");
    let mut sum = 0u64;
    for y in rect.y0..=rect.y1 {
        let row_start = pixel_offset(rect.x0, y, stride);
        let row_end = pixel_offset(rect.x1, y, stride) + 4;
        sum += target[row_start..row_end]
            .chunks_exact(4)
            .zip(current[row_start..row_end].chunks_exact(4))
            .map(|(t, c)| sq_diff_rgb(t, c))
            .sum::<u64>();
    }
    sum
}

/// squared error between a rectangle of the full-frame target and a
/// rect-sized buffer (rows packed with no padding)
pub fn difference_rgb_region(target: &[u8], region: &[u8], rect: PixelRect, stride: u32) -> u64 {
    profiling::scope!("difference_rgb_region");
    debug_assert_eq!(region.len(), rect.area() * 4);

    let row_bytes = rect.width() as usize * 4;
    let mut sum = 0u64;
    for (row, y) in (rect.y0..=rect.y1).enumerate() {
        let row_start = pixel_offset(rect.x0, y, stride);
        let region_row = &region[row * row_bytes..(row + 1) * row_bytes];
        sum += target[row_start..row_start + row_bytes]
            .chunks_exact(4)
            .zip(region_row.chunks_exact(4))
            .map(|(t, c)| sq_diff_rgb(t, c))
            .sum::<u64>();
    }
    sum
}

/// root-mean-square error per channel, scaled to [0, 1].
/// strictly increasing in `difference`, so comparing distances is comparing differences.
#[inline]
pub fn difference_to_distance(difference: u64, num_pixels: usize) -> f64 {
    if num_pixels == 0 {
        return 0.0;
    }
    (difference as f64 / (num_pixels as f64 * 3.0)).sqrt() / 255.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: usize, h: usize, rgb: [u8; 3]) -> Vec<u8> {
        (0..w * h).flat_map(|_| [rgb[0], rgb[1], rgb[2], 255]).collect()
    }

    #[test]
    fn test_identical_buffers_are_zero() {
        let a = solid(7, 5, [10, 20, 30]);
        assert_eq!(difference_rgb_parallel(&a, &a), 0);
    }

    #[test]
    fn test_known_difference_ignores_alpha() {
        let a = solid(2, 2, [0, 0, 0]);
        let mut b = solid(2, 2, [3, 4, 0]);
        b[3] = 0; // alpha differs, must not count
        assert_eq!(difference_rgb_parallel(&a, &b), 4 * 25);
    }

    #[test]
    fn test_parallel_matches_sequential_on_large_buffer() {
        // large enough to split across several chunks
        let w = 300;
        let h = 300;
        let a: Vec<u8> = (0..w * h * 4).map(|i| (i * 7 % 251) as u8).collect();
        let b: Vec<u8> = (0..w * h * 4).map(|i| (i * 13 % 241) as u8).collect();
        let sequential: u64 = a
            .chunks_exact(4)
            .zip(b.chunks_exact(4))
            .map(|(t, c)| sq_diff_rgb(t, c))
            .sum();
        assert_eq!(difference_rgb_parallel(&a, &b), sequential);
    }

    #[test]
    fn test_rect_and_region_agree() {
        let w = 6u32;
        let h = 4u32;
        let target = solid(w as usize, h as usize, [100, 100, 100]);
        let current = solid(w as usize, h as usize, [90, 100, 110]);
        let rect = PixelRect::new(1, 1, 3, 2);

        let from_rect = difference_rgb_rect(&target, &current, rect, w);
        assert_eq!(from_rect, 6 * 200);

        let region = solid(3, 2, [90, 100, 110]);
        assert_eq!(difference_rgb_region(&target, &region, rect, w), from_rect);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_pixel_offset_past_u32() {
        assert_eq!(pixel_offset(3, 2, 10), 92);
        // 40000 x 40000 RGBA is 6.4e9 bytes
        assert_eq!(pixel_offset(39_999, 39_999, 40_000), 6_399_999_996);
    }

    #[test]
    fn test_distance_scale() {
        assert_eq!(difference_to_distance(0, 10), 0.0);
        // every channel off by the full range
        let worst = 255u64 * 255 * 3 * 10;
        assert!((difference_to_distance(worst, 10) - 1.0).abs() < 1e-12);
        assert!(difference_to_distance(10, 10) < difference_to_distance(11, 10));
    }
}
