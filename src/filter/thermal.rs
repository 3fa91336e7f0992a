//! Pseudo thermal imaging: blurred luminance through a jet palette.

use std::sync::OnceLock;

use super::Transform;
use crate::error::ProcessError;
use crate::frame::Frame;
use crate::imgproc::{gaussian_blur, luma};

#[derive(Clone, Debug, PartialEq)]
pub struct ThermalSettings {
    /// Gaussian kernel edge length (odd).
    pub kernel_size: usize,
    /// Gaussian sigma; `<= 0` derives it from `kernel_size`.
    pub sigma: f64,
}

impl Default for ThermalSettings {
    fn default() -> Self {
        Self {
            kernel_size: 11,
            sigma: 4.0,
        }
    }
}

/// 256-entry jet palette: 0 is dark blue, 255 is dark red.
pub fn jet_lut() -> &'static [[u8; 3]; 256] {
    static LUT: OnceLock<[[u8; 3]; 256]> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut lut = [[0u8; 3]; 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            let v = i as f64 / 255.0;
            let ramp = |shift: f64| {
                let level = (1.5 - (4.0 * v - shift).abs()).clamp(0.0, 1.0);
                (level * 255.0).round() as u8
            };
            *entry = [ramp(3.0), ramp(2.0), ramp(1.0)];
        }
        lut
    })
}

#[derive(Clone, Debug, Default)]
pub struct ThermalMapper {
    settings: ThermalSettings,
}

impl ThermalMapper {
    pub fn new(settings: ThermalSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ThermalSettings {
        &self.settings
    }

    pub fn thermalize(&self, frame: &Frame) -> Frame {
        let s = &self.settings;
        let heat = gaussian_blur(&luma(frame), s.kernel_size, s.sigma);
        let lut = jet_lut();
        let data = heat
            .as_bytes()
            .iter()
            .flat_map(|&v| lut[v as usize])
            .collect();
        Frame::from_parts(frame.w(), frame.h(), data)
    }
}

impl Transform for ThermalMapper {
    fn name(&self) -> &'static str {
        "thermal"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, ProcessError> {
        Ok(self.thermalize(frame))
    }
}

/// Thermal map with the default kernel.
pub fn thermalize(frame: &Frame) -> Frame {
    ThermalMapper::default().thermalize(frame)
}
