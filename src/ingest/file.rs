//! Video file frame source.
//!
//! `VideoFileSource` reads frames from:
//! - animated GIF files or in-memory GIF bytes (pure Rust, always available)
//! - other containers through FFmpeg (feature: video-ffmpeg)
//! - `stub://<name>?frames=N&width=W&height=H&fps=F[&fail_at=K]` synthetic clips
//!
//! Frames are decoded one at a time; nothing is buffered beyond the frame
//! being returned.

use anyhow::{anyhow, Context, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Frames};
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

#[cfg(feature = "video-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{synthetic_frame, FrameSource, StubAddress};
use crate::frame::Frame;

/// Video file frame source.
pub struct VideoFileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    Gif(GifFileSource),
    #[cfg(feature = "video-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl VideoFileSource {
    /// Open a local path or a `stub://` address. URL schemes are rejected.
    pub fn open(path: &str) -> Result<Self> {
        if path.trim().is_empty() {
            return Err(anyhow!("video path is empty"));
        }
        if let Some(addr) = StubAddress::parse(path) {
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(path, &addr)?),
            });
        }
        if path.contains("://") {
            return Err(anyhow!(
                "video input only supports local paths (got '{path}')"
            ));
        }
        if is_gif_path(Path::new(path)) {
            return Ok(Self {
                backend: FileBackend::Gif(GifFileSource::from_path(path)?),
            });
        }

        #[cfg(feature = "video-ffmpeg")]
        {
            Ok(Self {
                backend: FileBackend::Ffmpeg(FfmpegFileSource::new(path)?),
            })
        }
        #[cfg(not(feature = "video-ffmpeg"))]
        {
            Err(anyhow!(
                "decoding '{path}' requires the video-ffmpeg feature (only GIF is built in)"
            ))
        }
    }

    /// Decode an animated GIF held in memory.
    pub fn from_gif_bytes(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self {
            backend: FileBackend::Gif(GifFileSource::from_bytes(bytes)?),
        })
    }

    pub fn frames_read(&self) -> u64 {
        match &self.backend {
            FileBackend::Synthetic(source) => source.emitted,
            FileBackend::Gif(source) => source.frames_read,
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_read(),
        }
    }
}

impl FrameSource for VideoFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Gif(source) => source.next_frame(),
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn describe(&self) -> String {
        match &self.backend {
            FileBackend::Synthetic(source) => format!("{} (synthetic)", source.path),
            FileBackend::Gif(source) => format!("{} (gif)", source.origin),
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => format!("{} (ffmpeg)", source.path()),
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        match &self.backend {
            FileBackend::Synthetic(source) => source.fps,
            FileBackend::Gif(source) => source.fps,
            #[cfg(feature = "video-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frame_rate(),
        }
    }
}

pub(crate) fn is_gif_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gif"))
        .unwrap_or(false)
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    path: String,
    width: u32,
    height: u32,
    total: u64,
    fps: Option<f64>,
    /// Read index that fails instead of producing a frame.
    fail_at: Option<u64>,
    emitted: u64,
}

impl SyntheticFileSource {
    fn new(path: &str, addr: &StubAddress) -> Result<Self> {
        let width = addr.get("width", 64u32)?;
        let height = addr.get("height", 48u32)?;
        if width == 0 || height == 0 {
            return Err(anyhow!("synthetic clip {path} has an empty frame size"));
        }
        let fps = if addr.has("fps") {
            Some(addr.get("fps", 0.0f64)?)
        } else {
            None
        };
        let fail_at = if addr.has("fail_at") {
            Some(addr.get("fail_at", 0u64)?)
        } else {
            None
        };
        log::info!("VideoFileSource: opened {path} (synthetic)");
        Ok(Self {
            path: path.to_string(),
            width,
            height,
            total: addr.get("frames", 10u64)?,
            fps,
            fail_at,
            emitted: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.emitted >= self.total {
            return Ok(None);
        }
        if self.fail_at == Some(self.emitted) {
            // Fail once, then end; a corrupt tail behaves the same way.
            self.total = self.emitted;
            return Err(anyhow!("synthetic read failure at frame {}", self.emitted));
        }
        let frame = synthetic_frame(self.width, self.height, self.emitted)?;
        self.emitted += 1;
        Ok(Some(frame))
    }
}

// ----------------------------------------------------------------------------
// Animated GIF
// ----------------------------------------------------------------------------

struct GifFileSource {
    origin: String,
    frames: Frames<'static>,
    /// First frame, read ahead at open to learn the frame delay.
    pending: Option<Frame>,
    fps: Option<f64>,
    frames_read: u64,
}

impl GifFileSource {
    fn from_path(path: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open gif {path}"))?;
        let decoder = GifDecoder::new(BufReader::new(file))
            .with_context(|| format!("read gif header from {path}"))?;
        Self::from_frames(path.to_string(), decoder.into_frames())
    }

    fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let decoder = GifDecoder::new(Cursor::new(bytes)).context("read gif header")?;
        Self::from_frames("<memory>".to_string(), decoder.into_frames())
    }

    fn from_frames(origin: String, mut frames: Frames<'static>) -> Result<Self> {
        let (pending, fps) = match frames.next() {
            None => (None, None),
            Some(first) => {
                let first = first.with_context(|| format!("decode first gif frame of {origin}"))?;
                let (numer, denom) = first.delay().numer_denom_ms();
                let fps = (numer > 0).then(|| 1000.0 * denom as f64 / numer as f64);
                (Some(rgba_to_frame(first)?), fps)
            }
        };
        log::info!("VideoFileSource: opened {origin} (gif)");
        Ok(Self {
            origin,
            frames,
            pending,
            fps,
            frames_read: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = match self.pending.take() {
            Some(frame) => frame,
            None => match self.frames.next() {
                None => return Ok(None),
                Some(next) => rgba_to_frame(next.context("decode gif frame")?)?,
            },
        };
        self.frames_read += 1;
        Ok(Some(frame))
    }
}

fn rgba_to_frame(frame: image::Frame) -> Result<Frame> {
    let rgb = image::DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
    Ok(Frame::from_rgb_image(rgb)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_clip_yields_requested_frames() -> Result<()> {
        let mut source = VideoFileSource::open("stub://clip?frames=3&width=16&height=8&fps=12")?;
        assert_eq!(source.frame_rate(), Some(12.0));
        let mut count = 0;
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.dimensions(), (16, 8));
            count += 1;
        }
        assert_eq!(count, 3);
        assert_eq!(source.frames_read(), 3);
        Ok(())
    }

    #[test]
    fn synthetic_frames_differ_over_time() -> Result<()> {
        let mut source = VideoFileSource::open("stub://clip?frames=2")?;
        let a = source.next_frame()?;
        let b = source.next_frame()?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn synthetic_failure_ends_the_stream() -> Result<()> {
        let mut source = VideoFileSource::open("stub://clip?frames=5&fail_at=2")?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame().is_err());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn remote_urls_are_rejected() {
        assert!(VideoFileSource::open("http://example.com/clip.mp4").is_err());
        assert!(VideoFileSource::open("  ").is_err());
    }

    #[test]
    fn missing_gif_is_an_error() {
        assert!(VideoFileSource::open("/nonexistent/clip.gif").is_err());
    }
}
