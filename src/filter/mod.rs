//! Pixel transforms.
//!
//! A `Transform` is a pure `Frame -> Frame` mapping. Implementations hold only
//! their configured constants, so a single instance can be shared across
//! threads (the live pipeline runs it off the capture thread).

mod cartoon;
mod kmeans;
mod pixel;
mod thermal;

pub use cartoon::{cartoonize, CartoonSettings, Cartoonizer};
pub use kmeans::{kmeans, KmeansCriteria, KmeansResult};
pub use pixel::{pixelate, PixelSettings, Pixelator};
pub use thermal::{jet_lut, thermalize, ThermalMapper, ThermalSettings};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ProcessError;
use crate::frame::Frame;

/// Per-frame pixel transform.
pub trait Transform: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Map one frame. The output has the input's width and height.
    fn apply(&self, frame: &Frame) -> Result<Frame, ProcessError>;
}

/// Run a transform and enforce the shape contract on its output.
pub fn apply_checked(transform: &dyn Transform, frame: &Frame) -> Result<Frame, ProcessError> {
    let out = transform.apply(frame)?;
    if out.dimensions() != frame.dimensions() {
        return Err(ProcessError::TransformFailure {
            filter: transform.name(),
            reason: format!(
                "output is {}x{}, input was {}x{}",
                out.width(),
                out.height(),
                frame.width(),
                frame.height()
            ),
        });
    }
    Ok(out)
}

/// The built-in filters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Cartoon,
    Pixel,
    Thermal,
}

impl FilterKind {
    pub const ALL: [FilterKind; 3] = [FilterKind::Cartoon, FilterKind::Pixel, FilterKind::Thermal];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterKind::Cartoon => "cartoon",
            FilterKind::Pixel => "pixel",
            FilterKind::Thermal => "thermal",
        }
    }

    /// Instantiate the filter with its configured constants.
    pub fn build(self, settings: &FilterSettings) -> Arc<dyn Transform> {
        match self {
            FilterKind::Cartoon => Arc::new(Cartoonizer::new(settings.cartoon.clone())),
            FilterKind::Pixel => Arc::new(Pixelator::new(settings.pixel.clone())),
            FilterKind::Thermal => Arc::new(ThermalMapper::new(settings.thermal.clone())),
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKind {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cartoon" | "toon" => Ok(FilterKind::Cartoon),
            "pixel" | "pixel-art" | "pixelate" => Ok(FilterKind::Pixel),
            "thermal" | "heat" => Ok(FilterKind::Thermal),
            other => Err(ProcessError::Config(format!(
                "unknown filter '{other}' (expected cartoon, pixel or thermal)"
            ))),
        }
    }
}

/// Constants for all three filters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterSettings {
    pub cartoon: CartoonSettings,
    pub pixel: PixelSettings,
    pub thermal: ThermalSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shrink;

    impl Transform for Shrink {
        fn name(&self) -> &'static str {
            "shrink"
        }

        fn apply(&self, frame: &Frame) -> Result<Frame, ProcessError> {
            Ok(crate::imgproc::pyr_down(frame))
        }
    }

    #[test]
    fn filter_names_parse() -> anyhow::Result<()> {
        assert_eq!("Cartoon".parse::<FilterKind>()?, FilterKind::Cartoon);
        assert_eq!("pixel-art".parse::<FilterKind>()?, FilterKind::Pixel);
        assert_eq!(" heat ".parse::<FilterKind>()?, FilterKind::Thermal);
        assert!(matches!(
            "sepia".parse::<FilterKind>(),
            Err(ProcessError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn built_filters_report_their_names() {
        let settings = FilterSettings::default();
        for kind in FilterKind::ALL {
            assert_eq!(kind.build(&settings).name(), kind.as_str());
        }
    }

    #[test]
    fn shape_changes_are_rejected() -> anyhow::Result<()> {
        let frame = Frame::filled(8, 8, [1, 2, 3])?;
        let err = apply_checked(&Shrink, &frame).unwrap_err();
        assert!(matches!(
            err,
            ProcessError::TransformFailure { filter: "shrink", .. }
        ));
        Ok(())
    }
}
