//! Resampling: area averaging (shrink), nearest neighbour (hard blocks) and
//! bilinear (size correction).

use crate::frame::{Frame, CHANNELS};

/// Area-averaging resize. Each target pixel is the coverage-weighted mean of
/// the source pixels its footprint overlaps, which handles non-integer
/// ratios as well as exact block averaging.
pub fn resize_area(frame: &Frame, dst_w: usize, dst_h: usize) -> Frame {
    let (w, h) = (frame.w(), frame.h());
    let xw = area_weights(w, dst_w);
    let yw = area_weights(h, dst_h);
    let src = frame.as_bytes();

    let mut tmp = vec![0f32; dst_w * h * CHANNELS];
    for y in 0..h {
        for (dx, taps) in xw.iter().enumerate() {
            for &(sx, weight) in taps {
                for c in 0..CHANNELS {
                    tmp[(y * dst_w + dx) * CHANNELS + c] += weight * src[(y * w + sx) * CHANNELS + c] as f32;
                }
            }
        }
    }

    let mut out = vec![0u8; dst_w * dst_h * CHANNELS];
    for (dy, taps) in yw.iter().enumerate() {
        for dx in 0..dst_w {
            for c in 0..CHANNELS {
                let acc: f32 = taps
                    .iter()
                    .map(|&(sy, weight)| weight * tmp[(sy * dst_w + dx) * CHANNELS + c])
                    .sum();
                out[(dy * dst_w + dx) * CHANNELS + c] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Frame::from_parts(dst_w, dst_h, out)
}

/// `(source index, weight)` taps per destination index along one axis.
fn area_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f32)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = ((d + 1) as f64 * scale).min(src_len as f64);
            let mut taps = Vec::new();
            let mut s = start.floor() as usize;
            while (s as f64) < end && s < src_len {
                let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
                if overlap > 1e-9 {
                    taps.push((s, (overlap / scale) as f32));
                }
                s += 1;
            }
            taps
        })
        .collect()
}

/// Nearest-neighbour resize: `src = floor(dst * src_len / dst_len)`.
pub fn resize_nearest(frame: &Frame, dst_w: usize, dst_h: usize) -> Frame {
    let (w, h) = (frame.w(), frame.h());
    let src = frame.as_bytes();
    let xs: Vec<usize> = (0..dst_w).map(|x| (x * w / dst_w).min(w - 1)).collect();

    let mut out = Vec::with_capacity(dst_w * dst_h * CHANNELS);
    for y in 0..dst_h {
        let sy = (y * h / dst_h).min(h - 1);
        for &sx in &xs {
            let at = (sy * w + sx) * CHANNELS;
            out.extend_from_slice(&src[at..at + CHANNELS]);
        }
    }
    Frame::from_parts(dst_w, dst_h, out)
}

/// Bilinear resize with half-pixel centres.
pub fn resize_linear(frame: &Frame, dst_w: usize, dst_h: usize) -> Frame {
    let (w, h) = (frame.w(), frame.h());
    let src = frame.as_bytes();
    let xs = linear_taps(w, dst_w);
    let ys = linear_taps(h, dst_h);

    let mut out = vec![0u8; dst_w * dst_h * CHANNELS];
    for (dy, &(y0, y1, fy)) in ys.iter().enumerate() {
        for (dx, &(x0, x1, fx)) in xs.iter().enumerate() {
            for c in 0..CHANNELS {
                let at = |x: usize, y: usize| src[(y * w + x) * CHANNELS + c] as f32;
                let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
                let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
                let v = top * (1.0 - fy) + bottom * fy;
                out[(dy * dst_w + dx) * CHANNELS + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Frame::from_parts(dst_w, dst_h, out)
}

/// `(lower index, upper index, upper weight)` per destination index.
fn linear_taps(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let pos = (d as f64 + 0.5) * scale - 0.5;
            if pos <= 0.0 {
                return (0, 0, 0.0);
            }
            let i0 = pos.floor() as usize;
            if i0 >= src_len - 1 {
                return (src_len - 1, src_len - 1, 0.0);
            }
            (i0, i0 + 1, (pos - i0 as f64) as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_averages_whole_blocks() -> anyhow::Result<()> {
        let frame = Frame::from_fn(4, 2, |x, _| if x < 2 { [0, 0, 0] } else { [100, 50, 10] })?;
        let small = resize_area(&frame, 2, 1);
        assert_eq!(small.as_bytes(), &[0, 0, 0, 100, 50, 10]);
        Ok(())
    }

    #[test]
    fn area_handles_fractional_ratios() -> anyhow::Result<()> {
        // 3 -> 2: the middle pixel is split between both outputs.
        let frame = Frame::new(3, 1, vec![0, 0, 0, 90, 90, 90, 180, 180, 180])?;
        let small = resize_area(&frame, 2, 1);
        assert_eq!(small.pixel(0, 0), [30, 30, 30]);
        assert_eq!(small.pixel(1, 0), [150, 150, 150]);
        Ok(())
    }

    #[test]
    fn nearest_repeats_blocks() -> anyhow::Result<()> {
        let frame = Frame::new(2, 1, vec![1, 1, 1, 2, 2, 2])?;
        let big = resize_nearest(&frame, 6, 2);
        for y in 0..2 {
            for x in 0..6 {
                let expected = if x < 3 { 1 } else { 2 };
                assert_eq!(big.pixel(x, y), [expected; 3]);
            }
        }
        Ok(())
    }

    #[test]
    fn linear_hits_exact_size_and_keeps_flat() -> anyhow::Result<()> {
        let frame = Frame::filled(32, 24, [8, 16, 32])?;
        let fixed = resize_linear(&frame, 30, 23);
        assert_eq!(fixed.dimensions(), (30, 23));
        assert!(fixed.as_bytes().chunks_exact(3).all(|px| px == [8, 16, 32]));
        Ok(())
    }

    #[test]
    fn linear_interpolates_between_samples() -> anyhow::Result<()> {
        let frame = Frame::new(2, 1, vec![0, 0, 0, 200, 200, 200])?;
        let wide = resize_linear(&frame, 4, 1);
        let row: Vec<u8> = (0..4).map(|x| wide.pixel(x, 0)[0]).collect();
        assert_eq!(row, vec![0, 50, 150, 200]);
        Ok(())
    }
}
