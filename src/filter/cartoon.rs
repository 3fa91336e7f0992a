//! Cartoon stylization: flattened color base with dark edge lines.

use super::Transform;
use crate::error::ProcessError;
use crate::frame::{Frame, GrayPlane};
use crate::imgproc::{
    adaptive_threshold_mean, bilateral_filter, bitwise_and_mask, luma, median_blur, pyr_down,
    pyr_up, resize_linear,
};

#[derive(Clone, Debug, PartialEq)]
pub struct CartoonSettings {
    /// Pyramid levels to shrink before smoothing (and grow back after).
    pub downsample_steps: u32,
    /// Bilateral passes at the reduced size.
    pub bilateral_passes: u32,
    pub bilateral_diameter: usize,
    pub sigma_color: f64,
    pub sigma_space: f64,
    /// Median window applied to luminance before edge detection.
    pub median_window: usize,
    /// Adaptive threshold neighbourhood.
    pub threshold_block: usize,
    /// Adaptive threshold offset below the local mean.
    pub threshold_offset: f64,
}

impl Default for CartoonSettings {
    fn default() -> Self {
        Self {
            downsample_steps: 2,
            bilateral_passes: 7,
            bilateral_diameter: 9,
            sigma_color: 9.0,
            sigma_space: 7.0,
            median_window: 7,
            threshold_block: 9,
            threshold_offset: 2.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Cartoonizer {
    settings: CartoonSettings,
}

impl Cartoonizer {
    pub fn new(settings: CartoonSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &CartoonSettings {
        &self.settings
    }

    /// Smoothed, flattened color base at the input's exact size.
    pub fn color_base(&self, frame: &Frame) -> Frame {
        let s = &self.settings;
        let mut base = frame.clone();
        // Sizes before each halving; the up pass returns to them in reverse.
        let mut sizes = Vec::with_capacity(s.downsample_steps as usize);
        for _ in 0..s.downsample_steps {
            sizes.push((base.w(), base.h()));
            base = pyr_down(&base);
        }
        for _ in 0..s.bilateral_passes {
            base = bilateral_filter(&base, s.bilateral_diameter, s.sigma_color, s.sigma_space);
        }
        while let Some((w, h)) = sizes.pop() {
            base = pyr_up(&base);
            if (base.w(), base.h()) != (w, h) {
                base = resize_linear(&base, w, h);
            }
        }
        base
    }

    /// Binary edge mask: 0 on edges, 255 on flat regions.
    pub fn edge_mask(&self, frame: &Frame) -> GrayPlane {
        let s = &self.settings;
        let gray = median_blur(&luma(frame), s.median_window);
        adaptive_threshold_mean(&gray, s.threshold_block, s.threshold_offset, 255)
    }

    pub fn cartoonize(&self, frame: &Frame) -> Frame {
        let base = self.color_base(frame);
        let mask = self.edge_mask(frame);
        bitwise_and_mask(&base, &mask)
    }
}

impl Transform for Cartoonizer {
    fn name(&self) -> &'static str {
        "cartoon"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, ProcessError> {
        Ok(self.cartoonize(frame))
    }
}

/// Cartoonize with the default constants.
pub fn cartoonize(frame: &Frame) -> Frame {
    Cartoonizer::default().cartoonize(frame)
}
