//! Live camera capture.
//!
//! `V4l2Source` captures from a local V4L2 device node (feature:
//! capture-v4l2) or from a synthetic `stub://` camera:
//!
//! `stub://<name>?width=W&height=H&fps=F[&fail_after=N]`
//!
//! A stub named `busy` refuses to open, like a device held by another
//! process. `fail_after=N` makes every capture after the first N fail.
//!
//! Opening reports `ProcessError::DeviceUnavailable`, or `Config` for a
//! device node in a build without capture-v4l2; per-frame capture
//! errors are plain `anyhow` errors the live pipeline counts and reports.

use anyhow::{anyhow, Result};
use std::io;
use std::time::{Duration, Instant};

#[cfg(feature = "capture-v4l2")]
use anyhow::Context;
#[cfg(feature = "capture-v4l2")]
use ouroboros::self_referencing;

#[cfg(feature = "capture-v4l2")]
use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{synthetic_frame, StubAddress};
use crate::error::ProcessError;
use crate::frame::Frame;

/// A camera that yields one frame per call.
pub trait CaptureDevice {
    /// Block until the next frame is available.
    fn capture(&mut self) -> Result<Frame>;

    fn describe(&self) -> String;
}

/// Configuration for a camera.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://` address.
    pub device: String,
    /// Requested frame rate; the driver may pick another.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 640,
            height: 480,
        }
    }
}

/// Open and connect a camera.
pub fn open_camera(config: CameraConfig) -> Result<V4l2Source, ProcessError> {
    let device = config.device.clone();
    #[cfg(not(feature = "capture-v4l2"))]
    if StubAddress::parse(&device).is_none() {
        return Err(ProcessError::Config(format!(
            "camera capture from {device} requires the capture-v4l2 feature"
        )));
    }
    let mut source = V4l2Source::new(config).map_err(|err| ProcessError::DeviceUnavailable {
        device: device.clone(),
        reason: format!("{err:#}"),
    })?;
    source.connect()?;
    Ok(source)
}

/// V4L2 camera, or a synthetic fallback for `stub://` paths.
pub struct V4l2Source {
    backend: V4l2Backend,
}

enum V4l2Backend {
    Synthetic(SyntheticV4l2Source),
    #[cfg(feature = "capture-v4l2")]
    Device(DeviceV4l2Source),
}

impl V4l2Source {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if let Some(addr) = StubAddress::parse(&config.device) {
            return Ok(Self {
                backend: V4l2Backend::Synthetic(SyntheticV4l2Source::new(config, &addr)?),
            });
        }
        #[cfg(feature = "capture-v4l2")]
        {
            Ok(Self {
                backend: V4l2Backend::Device(DeviceV4l2Source::new(config)),
            })
        }
        #[cfg(not(feature = "capture-v4l2"))]
        {
            Err(anyhow!(
                "camera capture from {} requires the capture-v4l2 feature",
                config.device
            ))
        }
    }

    /// Connect to the device.
    pub fn connect(&mut self) -> Result<(), ProcessError> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.connect(),
            #[cfg(feature = "capture-v4l2")]
            V4l2Backend::Device(source) => source.connect(),
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> CaptureStats {
        match &self.backend {
            V4l2Backend::Synthetic(source) => source.stats(),
            #[cfg(feature = "capture-v4l2")]
            V4l2Backend::Device(source) => source.stats(),
        }
    }
}

impl CaptureDevice for V4l2Source {
    fn capture(&mut self) -> Result<Frame> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "capture-v4l2")]
            V4l2Backend::Device(source) => source.next_frame(),
        }
    }

    fn describe(&self) -> String {
        self.stats().device
    }
}

/// Statistics for a camera.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub device: String,
}

/// Map an open failure to the reason shown to the user.
pub(crate) fn describe_open_error(err: &io::Error) -> String {
    if is_busy(err) {
        return "device is busy (in use by another process)".to_string();
    }
    match err.kind() {
        io::ErrorKind::NotFound => "no such device".to_string(),
        io::ErrorKind::PermissionDenied => "permission denied".to_string(),
        _ => err.to_string(),
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticV4l2Source {
    config: CameraConfig,
    name: String,
    frame_interval: Option<Duration>,
    fail_after: Option<u64>,
    frame_count: u64,
    attempts: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticV4l2Source {
    fn new(mut config: CameraConfig, addr: &StubAddress) -> Result<Self> {
        config.width = addr.get("width", config.width)?;
        config.height = addr.get("height", config.height)?;
        config.target_fps = addr.get("fps", config.target_fps)?;
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic camera {} has an empty frame size", config.device));
        }
        let fail_after = if addr.has("fail_after") {
            Some(addr.get("fail_after", 0u64)?)
        } else {
            None
        };
        Ok(Self {
            frame_interval: (config.target_fps > 0)
                .then(|| Duration::from_secs_f64(1.0 / config.target_fps as f64)),
            name: addr.name.clone(),
            config,
            fail_after,
            frame_count: 0,
            attempts: 0,
            last_frame_at: None,
        })
    }

    fn connect(&mut self) -> Result<(), ProcessError> {
        if self.name == "busy" {
            return Err(ProcessError::DeviceUnavailable {
                device: self.config.device.clone(),
                reason: describe_open_error(&busy_error()),
            });
        }
        log::info!(
            "V4l2Source: connected to {} (synthetic, {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame_at) {
            let since = last.elapsed();
            if since < interval {
                std::thread::sleep(interval - since);
            }
        }
        self.last_frame_at = Some(Instant::now());
        self.attempts += 1;
        if self.fail_after.is_some_and(|limit| self.attempts > limit) {
            return Err(anyhow!("synthetic capture failure on {}", self.config.device));
        }
        let frame = synthetic_frame(self.config.width, self.config.height, self.frame_count)?;
        self.frame_count += 1;
        Ok(frame)
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

#[cfg(target_os = "linux")]
fn is_busy(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EBUSY)
}

#[cfg(not(target_os = "linux"))]
fn is_busy(err: &io::Error) -> bool {
    err.to_string().contains("busy")
}

fn busy_error() -> io::Error {
    #[cfg(target_os = "linux")]
    {
        io::Error::from_raw_os_error(libc::EBUSY)
    }
    #[cfg(not(target_os = "linux"))]
    {
        io::Error::new(io::ErrorKind::Other, "device is busy")
    }
}

// ----------------------------------------------------------------------------
// Production V4L2 source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "capture-v4l2")]
struct DeviceV4l2Source {
    config: CameraConfig,
    state: Option<DeviceV4l2State>,
    format: PixelFormat,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "capture-v4l2")]
#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "capture-v4l2")]
impl DeviceV4l2Source {
    fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> ProcessError {
        ProcessError::DeviceUnavailable {
            device: self.config.device.clone(),
            reason: reason.into(),
        }
    }

    fn connect(&mut self) -> Result<(), ProcessError> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .map_err(|err| self.unavailable(describe_open_error(&err)))?;
        let mut format = device
            .format()
            .map_err(|err| self.unavailable(format!("read format: {err}")))?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let mut format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .map_err(|err| self.unavailable(format!("read format: {err}")))?
            }
        };
        if PixelFormat::from_fourcc(&format.fourcc.repr).is_none() {
            // Most webcams offer YUYV when they refuse RGB.
            format.fourcc = v4l::FourCC::new(b"YUYV");
            format = device
                .set_format(&format)
                .map_err(|err| self.unavailable(format!("set YUYV format: {err}")))?;
        }
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            self.unavailable(format!("unsupported pixel format {}", format.fourcc))
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
            },
        }
        .try_build()
        .map_err(|err| self.unavailable(describe_open_error(&err)))?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let pixels = state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields.stream.next().context("capture v4l2 frame")?;
            normalize_to_rgb(buf, self.active_width, self.active_height, self.format)
        })?;

        self.frame_count += 1;
        Ok(Frame::new(self.active_width, self.active_height, pixels)?)
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config(device: &str) -> CameraConfig {
        CameraConfig {
            device: device.to_string(),
            ..CameraConfig::default()
        }
    }

    #[test]
    fn synthetic_camera_produces_frames() -> Result<()> {
        let mut source = open_camera(stub_config("stub://cam?width=32&height=24&fps=0"))?;
        let frame = source.capture()?;
        assert_eq!(frame.dimensions(), (32, 24));
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn busy_camera_is_unavailable() {
        let err = open_camera(stub_config("stub://busy")).err().unwrap();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("busy"), "{err}");
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn device_node_without_capture_support_is_a_config_error() {
        let err = open_camera(stub_config("/dev/video0")).err().unwrap();
        assert!(matches!(err, ProcessError::Config(_)), "{err:?}");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("capture-v4l2"), "{err}");
    }

    #[test]
    fn failing_camera_errors_after_limit() -> Result<()> {
        let mut source = open_camera(stub_config("stub://cam?fps=0&fail_after=2&width=8&height=8"))?;
        assert!(source.capture().is_ok());
        assert!(source.capture().is_ok());
        assert!(source.capture().is_err());
        assert!(source.capture().is_err());
        Ok(())
    }

    #[test]
    fn open_errors_are_described() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "x");
        assert_eq!(describe_open_error(&missing), "no such device");
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "x");
        assert_eq!(describe_open_error(&denied), "permission denied");
        assert!(describe_open_error(&busy_error()).contains("busy"));
    }
}
