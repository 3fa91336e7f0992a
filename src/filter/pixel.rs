//! Pixel-art quantization: shrink to blocks, cluster the palette, grow back.

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::kmeans::{kmeans, KmeansCriteria};
use super::Transform;
use crate::error::ProcessError;
use crate::frame::{Frame, CHANNELS};
use crate::imgproc::{resize_area, resize_nearest};

#[derive(Clone, Debug, PartialEq)]
pub struct PixelSettings {
    /// Edge length of one output block, in source pixels.
    pub block_size: u32,
    /// Palette size.
    pub num_colors: usize,
    pub criteria: KmeansCriteria,
    /// Fixed seed for reproducible palettes. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for PixelSettings {
    fn default() -> Self {
        Self {
            block_size: 20,
            num_colors: 16,
            criteria: KmeansCriteria::default(),
            seed: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Pixelator {
    settings: PixelSettings,
}

impl Pixelator {
    pub fn new(settings: PixelSettings) -> Self {
        Self { settings }
    }

    /// Same settings, fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.settings.seed = Some(seed);
        self
    }

    pub fn settings(&self) -> &PixelSettings {
        &self.settings
    }

    fn rng(&self) -> StdRng {
        match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    pub fn pixelate(&self, frame: &Frame) -> Result<Frame, ProcessError> {
        let s = &self.settings;
        let fail = |reason: &str| ProcessError::TransformFailure {
            filter: "pixel",
            reason: reason.to_string(),
        };
        if s.block_size == 0 {
            return Err(fail("block size must be at least 1"));
        }
        if s.num_colors == 0 {
            return Err(fail("color count must be at least 1"));
        }

        let block = s.block_size as usize;
        let small_w = (frame.w() / block).max(1);
        let small_h = (frame.h() / block).max(1);
        let small = resize_area(frame, small_w, small_h);

        let samples: Vec<[f32; 3]> = small
            .as_bytes()
            .chunks_exact(CHANNELS)
            .map(|px| [px[0] as f32, px[1] as f32, px[2] as f32])
            .collect();
        let clusters = kmeans(&samples, s.num_colors, &s.criteria, &mut self.rng())
            .ok_or_else(|| fail("no samples to cluster"))?;

        let data = clusters
            .labels
            .iter()
            .flat_map(|&label| {
                let c = clusters.centers[label];
                [c[0] as u8, c[1] as u8, c[2] as u8]
            })
            .collect();
        let quantized = Frame::from_parts(small_w, small_h, data);
        Ok(resize_nearest(&quantized, frame.w(), frame.h()))
    }
}

impl Transform for Pixelator {
    fn name(&self) -> &'static str {
        "pixel"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, ProcessError> {
        self.pixelate(frame)
    }
}

/// Pixelate with explicit block size and palette size, default clustering.
pub fn pixelate(frame: &Frame, block_size: u32, num_colors: usize) -> Result<Frame, ProcessError> {
    Pixelator::new(PixelSettings {
        block_size,
        num_colors,
        ..PixelSettings::default()
    })
    .pixelate(frame)
}
