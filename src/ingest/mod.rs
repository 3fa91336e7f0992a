//! Frame ingestion.
//!
//! - Still images decoded from bytes (`decode_image`)
//! - Video files: animated GIF (always), FFmpeg containers (feature: video-ffmpeg)
//! - Live cameras: V4L2 devices (feature: capture-v4l2)
//! - Synthetic `stub://` sources for tests and demos
//!
//! Sources hand every frame to the caller and keep nothing once it is returned.

pub mod file;
#[cfg(feature = "video-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "capture-v4l2")]
mod normalize;
pub mod v4l2;

pub use file::VideoFileSource;
pub use v4l2::{open_camera, CameraConfig, CaptureDevice, V4l2Source};

use anyhow::Result;
use std::collections::HashMap;

use crate::error::ProcessError;
use crate::frame::Frame;

/// Lazy, finite sequence of frames.
pub trait FrameSource {
    /// `Ok(None)` at end of stream. An error means this read failed.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;

    /// Native frame rate, when the container records one.
    fn frame_rate(&self) -> Option<f64> {
        None
    }
}

/// Decode PNG/JPEG/GIF/BMP bytes into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<Frame, ProcessError> {
    if bytes.is_empty() {
        return Err(ProcessError::InvalidInput("image bytes are empty".into()));
    }
    let decoded = image::load_from_memory(bytes)
        .map_err(|err| ProcessError::InvalidInput(format!("undecodable image: {err}")))?;
    Frame::from_rgb_image(decoded.to_rgb8())
}

// ----------------------------------------------------------------------------
// stub:// addresses
// ----------------------------------------------------------------------------

/// Parsed `stub://<name>?key=value&...` address.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct StubAddress {
    pub name: String,
    params: HashMap<String, String>,
}

impl StubAddress {
    pub(crate) fn parse(addr: &str) -> Option<Self> {
        let rest = addr.strip_prefix("stub://")?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (k.to_string(), v.to_string())
            })
            .collect();
        Some(Self {
            name: name.to_string(),
            params,
        })
    }

    /// Numeric parameter, falling back to `default` when absent.
    pub(crate) fn get<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.params.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("stub parameter {key}={raw} is not a valid number")),
        }
    }

    pub(crate) fn has(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }
}

/// Moving gradient used by the synthetic sources.
pub(crate) fn synthetic_frame(width: u32, height: u32, index: u64) -> Result<Frame> {
    let shift = (index * 8 % 256) as u32;
    Ok(Frame::from_fn(width, height, |x, y| {
        [
            ((x * 255 / width.max(1) + shift) % 256) as u8,
            ((y * 255 / height.max(1)) % 256) as u8,
            (((x + y) / 4 + shift) % 256) as u8,
        ]
    })?)
}
