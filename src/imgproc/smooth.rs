//! Smoothing filters: Gaussian, median and bilateral.

use super::{reflect101, replicate};
use crate::frame::{Frame, GrayPlane, CHANNELS};

/// Normalized 1-D Gaussian kernel of odd length `ksize`.
///
/// A non-positive `sigma` is derived from the kernel size the conventional
/// way: `0.3 * ((ksize - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f32> {
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (ksize / 2) as f64;
    let scale = -0.5 / (sigma * sigma);
    let raw: Vec<f64> = (0..ksize)
        .map(|i| {
            let d = i as f64 - center;
            (scale * d * d).exp()
        })
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Separable Gaussian blur with reflect-101 borders.
pub fn gaussian_blur(plane: &GrayPlane, ksize: usize, sigma: f64) -> GrayPlane {
    let kernel = gaussian_kernel(ksize, sigma);
    let radius = (ksize / 2) as isize;
    let (w, h) = (plane.width, plane.height);

    let mut tmp = vec![0f32; w * h];
    for y in 0..h {
        let row = &plane.data[y * w..(y + 1) * w];
        for x in 0..w {
            tmp[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * row[reflect101(x as isize + k as isize - radius, w)] as f32)
                .sum();
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let acc: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| weight * tmp[reflect101(y as isize + k as isize - radius, h) * w + x])
                .sum();
            out[y * w + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    GrayPlane::from_parts(w, h, out)
}

/// Median over a `ksize × ksize` window with replicated borders.
pub fn median_blur(plane: &GrayPlane, ksize: usize) -> GrayPlane {
    let radius = (ksize / 2) as isize;
    let (w, h) = (plane.width, plane.height);
    let mut window = Vec::with_capacity(ksize * ksize);
    let mut out = vec![0u8; w * h];

    for y in 0..h {
        for x in 0..w {
            window.clear();
            for dy in -radius..=radius {
                let sy = replicate(y as isize + dy, h);
                for dx in -radius..=radius {
                    let sx = replicate(x as isize + dx, w);
                    window.push(plane.data[sy * w + sx]);
                }
            }
            let mid = window.len() / 2;
            let (_, median, _) = window.select_nth_unstable(mid);
            out[y * w + x] = *median;
        }
    }
    GrayPlane::from_parts(w, h, out)
}

/// Edge-preserving bilateral filter over a circular window of `diameter`.
///
/// Color distance is the sum of absolute channel differences, so strong
/// edges (large distance) contribute almost nothing to the average.
pub fn bilateral_filter(frame: &Frame, diameter: usize, sigma_color: f64, sigma_space: f64) -> Frame {
    let radius = (diameter / 2) as isize;
    let (w, h) = (frame.w(), frame.h());
    let src = frame.as_bytes();

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_weight: Vec<f32> = (0..=255 * CHANNELS)
        .map(|d| ((d * d) as f64 * color_coeff).exp() as f32)
        .collect();

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist2 = (dx * dx + dy * dy) as f64;
            if dist2.sqrt() <= radius as f64 {
                offsets.push((dx, dy, (dist2 * space_coeff).exp() as f32));
            }
        }
    }

    let mut out = vec![0u8; w * h * CHANNELS];
    for y in 0..h {
        for x in 0..w {
            let center = (y * w + x) * CHANNELS;
            let c0 = &src[center..center + CHANNELS];
            let mut sum = [0f32; CHANNELS];
            let mut wsum = 0f32;
            for &(dx, dy, space_w) in &offsets {
                let sx = reflect101(x as isize + dx, w);
                let sy = reflect101(y as isize + dy, h);
                let at = (sy * w + sx) * CHANNELS;
                let px = &src[at..at + CHANNELS];
                let diff: usize = px
                    .iter()
                    .zip(c0)
                    .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs() as usize)
                    .sum();
                let weight = space_w * color_weight[diff];
                for c in 0..CHANNELS {
                    sum[c] += weight * px[c] as f32;
                }
                wsum += weight;
            }
            for c in 0..CHANNELS {
                out[center + c] = (sum[c] / wsum).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Frame::from_parts(w, h, out)
}
