//! Raster primitives the filters are composed from.
//!
//! Everything here operates on `Frame` (RGB) or `GrayPlane` (luminance) and
//! never changes the caller's buffer. Border handling follows the usual
//! conventions: reflect-101 for convolution-style filters, replicate for the
//! median window and the adaptive-threshold mean.

mod pyramid;
mod resize;
mod smooth;
mod threshold;

pub use pyramid::{pyr_down, pyr_up};
pub use resize::{resize_area, resize_linear, resize_nearest};
pub use smooth::{bilateral_filter, gaussian_blur, gaussian_kernel, median_blur};
pub use threshold::adaptive_threshold_mean;

use crate::frame::{Frame, GrayPlane, CHANNELS};

/// Reflect-101 border index: `gfedcb|abcdefgh|gfedcba`.
pub(crate) fn reflect101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut i = i.rem_euclid(period);
    if i >= len as isize {
        i = period - i;
    }
    i as usize
}

/// Replicate border index: `aaaaaa|abcdefgh|hhhhhhh`.
pub(crate) fn replicate(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

/// BT.601 luminance with 14-bit fixed-point weights.
pub fn luma(frame: &Frame) -> GrayPlane {
    const R: u32 = 4899;
    const G: u32 = 9617;
    const B: u32 = 1868;
    let data = frame
        .as_bytes()
        .chunks_exact(CHANNELS)
        .map(|px| ((px[0] as u32 * R + px[1] as u32 * G + px[2] as u32 * B + (1 << 13)) >> 14) as u8)
        .collect();
    GrayPlane::from_parts(frame.w(), frame.h(), data)
}

/// Per-channel AND of a frame with a single-channel mask replicated over RGB.
pub fn bitwise_and_mask(frame: &Frame, mask: &GrayPlane) -> Frame {
    debug_assert_eq!((frame.w(), frame.h()), (mask.width, mask.height));
    let data = frame
        .as_bytes()
        .chunks_exact(CHANNELS)
        .zip(mask.data.iter())
        .flat_map(|(px, &m)| [px[0] & m, px[1] & m, px[2] & m])
        .collect();
    Frame::from_parts(frame.w(), frame.h(), data)
}
