use super::replicate;
use crate::frame::GrayPlane;

/// Binary adaptive threshold against the local mean.
///
/// Each pixel is compared with the rounded mean of its `block × block`
/// neighbourhood (replicated borders): it becomes `max_value` when
/// `src - mean > -ceil(offset)` and 0 otherwise. Flat regions therefore map
/// to `max_value` and dark detail (edges, lines) maps to 0.
pub fn adaptive_threshold_mean(plane: &GrayPlane, block: usize, offset: f64, max_value: u8) -> GrayPlane {
    let radius = (block / 2) as isize;
    let (w, h) = (plane.width, plane.height);
    let area = (block * block) as u32;
    let delta = offset.ceil() as i32;

    // Horizontal box sums, then vertical.
    let mut rows = vec![0u32; w * h];
    for y in 0..h {
        let row = &plane.data[y * w..(y + 1) * w];
        for x in 0..w {
            rows[y * w + x] = (-radius..=radius)
                .map(|dx| row[replicate(x as isize + dx, w)] as u32)
                .sum();
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let sum: u32 = (-radius..=radius)
                .map(|dy| rows[replicate(y as isize + dy, h) * w + x])
                .sum();
            let mean = ((sum + area / 2) / area) as i32;
            let src = plane.data[y * w + x] as i32;
            out[y * w + x] = if src - mean > -delta { max_value } else { 0 };
        }
    }
    GrayPlane::from_parts(w, h, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_plane_is_all_max() {
        let flat = GrayPlane::from_parts(20, 11, vec![93; 220]);
        let mask = adaptive_threshold_mean(&flat, 9, 2.0, 255);
        assert!(mask.as_bytes().iter().all(|&v| v == 255));
    }

    #[test]
    fn dark_line_becomes_edge() {
        let mut data = vec![200u8; 15 * 15];
        for y in 0..15 {
            data[y * 15 + 7] = 20;
        }
        let plane = GrayPlane::from_parts(15, 15, data);
        let mask = adaptive_threshold_mean(&plane, 9, 2.0, 255);
        for y in 0..15 {
            assert_eq!(mask.get(7, y), 0, "line pixel at row {y}");
            assert_eq!(mask.get(1, y), 255);
            assert_eq!(mask.get(13, y), 255);
        }
    }
}
