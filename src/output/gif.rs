//! Animated GIF encoder.
//!
//! The sink is only finished by `finish`, which writes the trailer, flushes
//! the buffer and syncs the file, returning the first error it meets. A
//! dropped sink leaves an unterminated file behind; the pipeline deletes it.

use anyhow::{anyhow, Context, Result};
use gif::{Encoder, Repeat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::VideoSink;
use crate::frame::Frame;

/// NeuQuant sampling speed: 1 is best quality, 30 is fastest.
const QUANTIZE_SPEED: i32 = 10;

/// Frame delay in the GIF's centisecond units, at least one tick.
fn delay_centis(fps: f64) -> u16 {
    (100.0 / fps).round().clamp(1.0, u16::MAX as f64) as u16
}

/// GIF encoding onto any writer.
struct GifStream<W: Write> {
    encoder: Encoder<W>,
    width: u16,
    height: u16,
    delay: u16,
    frames_written: u64,
}

impl<W: Write> GifStream<W> {
    fn new(writer: W, width: u32, height: u32, fps: f64) -> Result<Self> {
        let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(anyhow!("gif cannot hold a {width}x{height} frame")),
        };
        let mut encoder = Encoder::new(writer, w, h, &[]).context("write gif header")?;
        encoder
            .set_repeat(Repeat::Infinite)
            .context("set gif loop count")?;
        Ok(Self {
            encoder,
            width: w,
            height: h,
            delay: delay_centis(fps),
            frames_written: 0,
        })
    }

    fn push(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.width as u32, self.height as u32) {
            return Err(anyhow!(
                "frame is {}x{}, gif was opened at {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }
        let mut gif_frame =
            gif::Frame::from_rgb_speed(self.width, self.height, frame.as_bytes(), QUANTIZE_SPEED);
        gif_frame.delay = self.delay;
        self.encoder
            .write_frame(&gif_frame)
            .with_context(|| format!("encode gif frame {}", self.frames_written))?;
        self.frames_written += 1;
        Ok(())
    }

    /// Write the trailer and hand back the writer.
    fn finish(self) -> Result<W> {
        self.encoder.into_inner().context("write gif trailer")
    }
}

/// Flush a buffered writer, surfacing the error `BufWriter`'s drop would swallow.
fn flush_into_inner<W: Write>(writer: BufWriter<W>) -> Result<W> {
    writer
        .into_inner()
        .map_err(|err| anyhow!(err.into_error()))
        .context("flush gif output")
}

pub struct GifVideoSink {
    path: PathBuf,
    stream: GifStream<BufWriter<File>>,
}

impl GifVideoSink {
    pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let stream = GifStream::new(BufWriter::new(file), width, height, fps)
            .with_context(|| format!("start gif {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            stream,
        })
    }
}

impl VideoSink for GifVideoSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.stream.push(frame)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let frames = self.stream.frames_written;
        let file = flush_into_inner(self.stream.finish()?)?;
        file.sync_all()
            .with_context(|| format!("sync {}", self.path.display()))?;
        log::debug!("gif {} finished: {} frames", self.path.display(), frames);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FrameSource, VideoFileSource};
    use std::io;

    /// Accepts `room` bytes, then fails every write and flush.
    struct CappedWriter {
        bytes: Vec<u8>,
        room: usize,
    }

    impl Write for CappedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.room - self.bytes.len());
            if n == 0 && !buf.is_empty() {
                return Err(io::Error::new(io::ErrorKind::Other, "no space left"));
            }
            self.bytes.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn frames() -> Result<Vec<Frame>> {
        (0..3u8)
            .map(|i| Ok(Frame::filled(6, 4, [i * 80, 40, 255 - i * 80])?))
            .collect()
    }

    fn encoded_len() -> Result<usize> {
        let mut stream = GifStream::new(Vec::new(), 6, 4, 10.0)?;
        for frame in frames()? {
            stream.push(&frame)?;
        }
        Ok(stream.finish()?.len())
    }

    #[test]
    fn written_gif_decodes_to_same_frame_count() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip.gif");
        let mut sink: Box<dyn VideoSink> = Box::new(GifVideoSink::create(&path, 12, 8, 20.0)?);
        for i in 0..4u8 {
            sink.write_frame(&Frame::filled(12, 8, [i * 60, 255 - i * 60, 30])?)?;
        }
        sink.finish()?;

        let mut source = VideoFileSource::open(path.to_str().context("utf-8 path")?)?;
        let rate = source.frame_rate().context("gif records a delay")?;
        assert!((rate - 20.0).abs() < 0.5, "rate {rate}");
        let mut count = 0;
        while let Some(frame) = source.next_frame()? {
            assert_eq!(frame.dimensions(), (12, 8));
            count += 1;
        }
        assert_eq!(count, 4);
        Ok(())
    }

    #[test]
    fn trailer_write_failure_is_reported() -> Result<()> {
        let full = encoded_len()?;
        let mut stream = GifStream::new(
            CappedWriter {
                bytes: Vec::new(),
                room: full - 1,
            },
            6,
            4,
            10.0,
        )?;
        for frame in frames()? {
            stream.push(&frame)?;
        }
        assert!(stream.finish().is_err());
        Ok(())
    }

    #[test]
    fn buffered_flush_failure_is_reported() -> Result<()> {
        let full = encoded_len()?;
        // Everything fits in the buffer, so the device only fails on flush.
        let writer = BufWriter::with_capacity(
            full * 2,
            CappedWriter {
                bytes: Vec::new(),
                room: full - 1,
            },
        );
        let mut stream = GifStream::new(writer, 6, 4, 10.0)?;
        for frame in frames()? {
            stream.push(&frame)?;
        }
        let buffered = stream.finish()?;
        assert!(flush_into_inner(buffered).is_err());
        Ok(())
    }

    #[test]
    fn rejects_frames_of_another_size() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut sink = GifVideoSink::create(&dir.path().join("clip.gif"), 4, 4, 10.0)?;
        assert!(sink.write_frame(&Frame::filled(5, 4, [0, 0, 0])?).is_err());
        assert!(GifVideoSink::create(&dir.path().join("wide.gif"), 70_000, 4, 10.0).is_err());
        Ok(())
    }

    #[test]
    fn delay_is_rounded_to_centiseconds() {
        assert_eq!(delay_centis(20.0), 5);
        assert_eq!(delay_centis(30.0), 3);
        assert_eq!(delay_centis(1000.0), 1);
    }
}
