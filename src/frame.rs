//! Frame containers.
//!
//! - `Frame`: interleaved 8-bit RGB raster. Never zero-sized.
//! - `GrayPlane`: single-channel 8-bit raster for luminance stages.
//!
//! Frames are produced by the ingestion layer (or decoded from bytes), handed
//! to exactly one transform and then to a sink. Nothing here caches frames.

use image::RgbImage;

use crate::error::ProcessError;

/// Number of color channels in a `Frame`.
pub const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame: RGB raster
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap interleaved RGB bytes. Rejects zero dimensions and length mismatches.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ProcessError> {
        if width == 0 || height == 0 {
            return Err(ProcessError::InvalidInput(format!(
                "frame must not be empty (got {width}x{height})"
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS))
            .ok_or_else(|| ProcessError::InvalidInput("frame dimensions overflow".into()))?;
        if data.len() != expected {
            return Err(ProcessError::InvalidInput(format!(
                "frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Single-color frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self, ProcessError> {
        Self::from_fn(width, height, |_, _| rgb)
    }

    /// Build a frame pixel by pixel.
    pub fn from_fn(
        width: u32,
        height: u32,
        mut f: impl FnMut(u32, u32) -> [u8; 3],
    ) -> Result<Self, ProcessError> {
        let mut data = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self::new(width, height, data)
    }

    /// Internal constructor for raster ops whose output size is known-good.
    pub(crate) fn from_parts(width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert!(width > 0 && height > 0);
        debug_assert_eq!(data.len(), width * height * CHANNELS);
        Self {
            width: width as u32,
            height: height as u32,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub(crate) fn w(&self) -> usize {
        self.width as usize
    }

    pub(crate) fn h(&self) -> usize {
        self.height as usize
    }

    pub fn from_rgb_image(image: RgbImage) -> Result<Self, ProcessError> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        // Dimensions and length are validated at construction.
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Replicate a gray plane across the three channels.
    pub fn from_gray(plane: &GrayPlane) -> Self {
        let data = plane.data.iter().flat_map(|&v| [v, v, v]).collect();
        Self::from_parts(plane.width, plane.height, data)
    }
}

// ----------------------------------------------------------------------------
// GrayPlane: single-channel raster
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayPlane {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) data: Vec<u8>,
}

impl GrayPlane {
    pub(crate) fn from_parts(width: usize, height: usize, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}
