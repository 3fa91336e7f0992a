//! Gaussian pyramid steps with the 5-tap `[1 4 6 4 1]` kernel.

use super::reflect101;
use crate::frame::{Frame, CHANNELS};

const TAPS: [u32; 5] = [1, 4, 6, 4, 1];

/// Blur and halve: output is `((w + 1) / 2, (h + 1) / 2)`.
pub fn pyr_down(frame: &Frame) -> Frame {
    let (w, h) = (frame.w(), frame.h());
    let (dw, dh) = ((w + 1) / 2, (h + 1) / 2);
    let src = frame.as_bytes();

    // Horizontal pass at even columns, full height.
    let mut tmp = vec![0u32; dw * h * CHANNELS];
    for y in 0..h {
        let row = &src[y * w * CHANNELS..(y + 1) * w * CHANNELS];
        for x in 0..dw {
            for (k, tap) in TAPS.iter().enumerate() {
                let sx = reflect101(2 * x as isize + k as isize - 2, w);
                for c in 0..CHANNELS {
                    tmp[(y * dw + x) * CHANNELS + c] += tap * row[sx * CHANNELS + c] as u32;
                }
            }
        }
    }

    // Vertical pass at even rows.
    let mut out = vec![0u8; dw * dh * CHANNELS];
    for y in 0..dh {
        for x in 0..dw {
            for c in 0..CHANNELS {
                let mut acc = 0u32;
                for (k, tap) in TAPS.iter().enumerate() {
                    let sy = reflect101(2 * y as isize + k as isize - 2, h);
                    acc += tap * tmp[(sy * dw + x) * CHANNELS + c];
                }
                out[(y * dw + x) * CHANNELS + c] = ((acc + 128) >> 8) as u8;
            }
        }
    }
    Frame::from_parts(dw, dh, out)
}

/// Double and blur: output is `(2w, 2h)`.
pub fn pyr_up(frame: &Frame) -> Frame {
    let (w, h) = (frame.w(), frame.h());
    let (uw, uh) = (w * 2, h * 2);
    let src = frame.as_bytes();

    let mut tmp = vec![0u32; uw * h * CHANNELS];
    for y in 0..h {
        for c in 0..CHANNELS {
            upsample_line(
                w,
                |x| src[(y * w + x) * CHANNELS + c] as u32,
                |x, v| tmp[(y * uw + x) * CHANNELS + c] = v,
            );
        }
    }

    let mut out = vec![0u8; uw * uh * CHANNELS];
    for x in 0..uw {
        for c in 0..CHANNELS {
            upsample_line(
                h,
                |y| tmp[(y * uw + x) * CHANNELS + c],
                |y, v| out[(y * uw + x) * CHANNELS + c] = ((v + 32) >> 6) as u8,
            );
        }
    }
    Frame::from_parts(uw, uh, out)
}

/// Even outputs take (1, 6, 1) around the source sample, odd outputs take
/// (4, 4) between neighbours. Each axis sums to 8.
fn upsample_line(len: usize, get: impl Fn(usize) -> u32, mut put: impl FnMut(usize, u32)) {
    for i in 0..len {
        let prev = get(reflect101(i as isize - 1, len));
        let cur = get(i);
        let next = get(reflect101(i as isize + 1, len));
        put(2 * i, prev + 6 * cur + next);
        put(2 * i + 1, 4 * cur + 4 * next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_rounds_odd_sizes_up() -> anyhow::Result<()> {
        let frame = Frame::filled(31, 17, [1, 2, 3])?;
        assert_eq!(pyr_down(&frame).dimensions(), (16, 9));
        let tiny = Frame::filled(1, 1, [1, 2, 3])?;
        assert_eq!(pyr_down(&tiny).dimensions(), (1, 1));
        Ok(())
    }

    #[test]
    fn up_doubles() -> anyhow::Result<()> {
        let frame = Frame::filled(5, 3, [9, 9, 9])?;
        assert_eq!(pyr_up(&frame).dimensions(), (10, 6));
        Ok(())
    }

    #[test]
    fn flat_frames_stay_flat() -> anyhow::Result<()> {
        let frame = Frame::filled(12, 10, [200, 17, 90])?;
        let round_trip = pyr_up(&pyr_down(&frame));
        assert!(round_trip
            .as_bytes()
            .chunks_exact(3)
            .all(|px| px == [200, 17, 90]));
        Ok(())
    }

    #[test]
    fn down_averages_a_checkerboard() -> anyhow::Result<()> {
        let frame = Frame::from_fn(8, 8, |x, y| {
            if (x + y) % 2 == 0 {
                [255, 255, 255]
            } else {
                [0, 0, 0]
            }
        })?;
        let small = pyr_down(&frame);
        for px in small.as_bytes() {
            assert!((100..=160).contains(px), "got {px}");
        }
        Ok(())
    }
}
