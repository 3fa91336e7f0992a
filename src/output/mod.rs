//! Frame sinks: still image encoding, video encoders and live displays.

pub mod display;
#[cfg(feature = "video-ffmpeg")]
mod ffmpeg;
mod gif;

pub use display::{CallbackDisplay, LatestFrameSlot, LiveDisplay, PreviewFileDisplay};
pub use gif::GifVideoSink;

use anyhow::{anyhow, Context, Result};
use image::ImageFormat;
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

use crate::error::ProcessError;
use crate::frame::{Frame, CHANNELS};

// ----------------------------------------------------------------------------
// Still images
// ----------------------------------------------------------------------------

/// Encode a frame as PNG, JPEG, BMP or GIF bytes.
pub fn encode_image(frame: &Frame, format: ImageFormat) -> Result<Vec<u8>, ProcessError> {
    let mut bytes = Vec::new();
    frame
        .to_rgb_image()
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|err| ProcessError::Output(format!("encode {format:?}: {err}")))?;
    Ok(bytes)
}

/// Encode and write a frame, choosing the format from the file extension.
pub fn write_image(frame: &Frame, path: &Path) -> Result<(), ProcessError> {
    let format = ImageFormat::from_path(path).map_err(|_| {
        ProcessError::Output(format!(
            "cannot tell image format from '{}' (use .png, .jpg or .bmp)",
            path.display()
        ))
    })?;
    let bytes = encode_image(frame, format)?;
    std::fs::write(path, bytes)
        .map_err(|err| ProcessError::Output(format!("write {}: {err}", path.display())))
}

// ----------------------------------------------------------------------------
// Video
// ----------------------------------------------------------------------------

/// Encoder for a sequence of equally sized frames.
pub trait VideoSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush buffered frames and write the container trailer.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Video container picked from the output path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoFormat {
    /// Animated GIF, looping forever.
    Gif,
    /// MPEG-4 Part 2 video in an FFmpeg-supported container.
    Mpeg4,
}

impl VideoFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or_else(|| anyhow!("output '{}' has no file extension", path.display()))?;
        match ext.as_str() {
            "gif" => Ok(VideoFormat::Gif),
            "mp4" | "m4v" | "mov" | "avi" | "mkv" => Ok(VideoFormat::Mpeg4),
            other => Err(anyhow!("unsupported video output extension '.{other}'")),
        }
    }

    /// Whether this build can write the format.
    pub fn is_available(self) -> bool {
        match self {
            VideoFormat::Gif => true,
            VideoFormat::Mpeg4 => cfg!(feature = "video-ffmpeg"),
        }
    }
}

/// Grow odd dimensions by one, repeating the last column and row.
///
/// YUV 4:2:0 encoders need even sizes; the original pixels stay in place.
#[cfg_attr(not(feature = "video-ffmpeg"), allow(dead_code))]
pub(crate) fn pad_to_even(frame: &Frame) -> Cow<'_, Frame> {
    let (w, h) = (frame.w(), frame.h());
    let (pw, ph) = (w + w % 2, h + h % 2);
    if (pw, ph) == (w, h) {
        return Cow::Borrowed(frame);
    }
    let row = w * CHANNELS;
    let src = frame.as_bytes();
    let mut data = Vec::with_capacity(pw * ph * CHANNELS);
    for y in 0..ph {
        let sy = y.min(h - 1);
        let line = &src[sy * row..(sy + 1) * row];
        data.extend_from_slice(line);
        if pw > w {
            data.extend_from_slice(&line[row - CHANNELS..]);
        }
    }
    Cow::Owned(Frame::from_parts(pw, ph, data))
}

/// Create the encoder for `path`. Called once the first frame's size is known.
pub fn open_video_sink(path: &Path, width: u32, height: u32, fps: f64) -> Result<Box<dyn VideoSink>> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(anyhow!("output frame rate must be positive (got {fps})"));
    }
    let format = VideoFormat::from_path(path)?;
    log::debug!(
        "opening {:?} encoder for {} ({}x{} @ {} fps)",
        format,
        path.display(),
        width,
        height,
        fps
    );
    match format {
        VideoFormat::Gif => Ok(Box::new(
            GifVideoSink::create(path, width, height, fps)
                .with_context(|| format!("create gif {}", path.display()))?,
        )),
        #[cfg(feature = "video-ffmpeg")]
        VideoFormat::Mpeg4 => Ok(Box::new(
            ffmpeg::FfmpegVideoSink::create(path, width, height, fps)
                .with_context(|| format!("create video {}", path.display()))?,
        )),
        #[cfg(not(feature = "video-ffmpeg"))]
        VideoFormat::Mpeg4 => Err(anyhow!(
            "writing '{}' requires the video-ffmpeg feature (GIF output is built in)",
            path.display()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_frames_are_padded_with_their_edge() -> anyhow::Result<()> {
        let frame = Frame::from_fn(3, 3, |x, y| [x as u8, y as u8, 9])?;
        let padded = pad_to_even(&frame);
        assert_eq!(padded.dimensions(), (4, 4));
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(padded.pixel(x, y), frame.pixel(x, y));
            }
        }
        assert_eq!(padded.pixel(3, 1), frame.pixel(2, 1));
        assert_eq!(padded.pixel(1, 3), frame.pixel(1, 2));
        assert_eq!(padded.pixel(3, 3), frame.pixel(2, 2));

        let even = Frame::filled(4, 2, [1, 2, 3])?;
        assert!(matches!(pad_to_even(&even), Cow::Borrowed(_)));
        Ok(())
    }

    #[test]
    fn png_and_jpeg_round_trip_dimensions() -> anyhow::Result<()> {
        let frame = Frame::from_fn(9, 5, |x, y| [x as u8 * 20, y as u8 * 40, 100])?;
        for format in [ImageFormat::Png, ImageFormat::Jpeg] {
            let bytes = encode_image(&frame, format)?;
            let back = crate::ingest::decode_image(&bytes)?;
            assert_eq!(back.dimensions(), (9, 5));
        }
        Ok(())
    }

    #[test]
    fn write_image_picks_format_from_extension() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let frame = Frame::filled(4, 4, [1, 2, 3])?;
        let path = dir.path().join("out.png");
        write_image(&frame, &path)?;
        assert_eq!(crate::ingest::decode_image(&std::fs::read(&path)?)?, frame);
        assert!(matches!(
            write_image(&frame, &dir.path().join("out.unknown")),
            Err(ProcessError::Output(_))
        ));
        Ok(())
    }

    #[test]
    fn video_format_from_extension() -> anyhow::Result<()> {
        assert_eq!(VideoFormat::from_path(Path::new("a/b.GIF"))?, VideoFormat::Gif);
        assert_eq!(VideoFormat::from_path(Path::new("clip.mp4"))?, VideoFormat::Mpeg4);
        assert!(VideoFormat::from_path(Path::new("clip")).is_err());
        assert!(VideoFormat::from_path(Path::new("clip.txt")).is_err());
        assert!(VideoFormat::Gif.is_available());
        Ok(())
    }

    #[test]
    fn sink_rejects_bad_frame_rate() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_video_sink(&dir.path().join("x.gif"), 4, 4, 0.0).is_err());
        assert!(open_video_sink(&dir.path().join("x.gif"), 4, 4, f64::NAN).is_err());
    }
}
