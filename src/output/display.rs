//! Live displays: where the live pipeline puts each transformed frame.

use anyhow::{Context, Result};
use image::ImageFormat;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::encode_image;
use crate::frame::Frame;

/// Receives transformed live frames on the transform thread.
pub trait LiveDisplay: Send {
    fn show(&mut self, frame: &Frame) -> Result<()>;
}

impl LiveDisplay for Box<dyn LiveDisplay> {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        (**self).show(frame)
    }
}

// ----------------------------------------------------------------------------
// LatestFrameSlot
// ----------------------------------------------------------------------------

/// Single-frame slot shared with a UI that polls for the newest frame.
///
/// Each `show` overwrites the previous frame, so the slot never holds more
/// than one.
#[derive(Clone, Default)]
pub struct LatestFrameSlot {
    inner: Arc<Mutex<SlotState>>,
}

#[derive(Default)]
struct SlotState {
    frame: Option<Frame>,
    sequence: u64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the newest frame, if any arrived yet.
    pub fn latest(&self) -> Option<Frame> {
        self.inner.lock().ok().and_then(|state| state.frame.clone())
    }

    /// Remove and return the newest frame.
    pub fn take(&self) -> Option<Frame> {
        self.inner.lock().ok().and_then(|mut state| state.frame.take())
    }

    /// Number of frames shown so far; lets a poller detect new frames.
    pub fn sequence(&self) -> u64 {
        self.inner.lock().map(|state| state.sequence).unwrap_or(0)
    }
}

impl LiveDisplay for LatestFrameSlot {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let mut state = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("latest-frame slot lock poisoned"))?;
        state.frame = Some(frame.clone());
        state.sequence += 1;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// CallbackDisplay
// ----------------------------------------------------------------------------

/// Hands each frame to a closure.
pub struct CallbackDisplay<F> {
    callback: F,
}

impl<F> CallbackDisplay<F>
where
    F: FnMut(&Frame) -> Result<()> + Send,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> LiveDisplay for CallbackDisplay<F>
where
    F: FnMut(&Frame) -> Result<()> + Send,
{
    fn show(&mut self, frame: &Frame) -> Result<()> {
        (self.callback)(frame)
    }
}

// ----------------------------------------------------------------------------
// PreviewFileDisplay
// ----------------------------------------------------------------------------

/// Rewrites a PNG preview at most once per interval.
///
/// The file is replaced atomically, so a viewer never reads a half-written
/// image.
pub struct PreviewFileDisplay {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
    writes: u64,
}

impl PreviewFileDisplay {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_write: None,
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn write_now(&self, frame: &Frame) -> Result<()> {
        let bytes = encode_image(frame, ImageFormat::Png)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("create temp preview in {}", dir.display()))?;
        tmp.write_all(&bytes).context("write preview")?;
        tmp.persist(&self.path)
            .with_context(|| format!("replace preview {}", self.path.display()))?;
        Ok(())
    }
}

impl LiveDisplay for PreviewFileDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let due = self
            .last_write
            .map_or(true, |last| last.elapsed() >= self.interval);
        if !due {
            return Ok(());
        }
        self.write_now(frame)?;
        self.last_write = Some(Instant::now());
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_keeps_only_the_newest_frame() -> Result<()> {
        let slot = LatestFrameSlot::new();
        let mut writer = slot.clone();
        assert!(slot.latest().is_none());
        writer.show(&Frame::filled(2, 2, [1, 1, 1])?)?;
        writer.show(&Frame::filled(2, 2, [9, 9, 9])?)?;
        assert_eq!(slot.sequence(), 2);
        assert_eq!(slot.latest().map(|f| f.pixel(0, 0)), Some([9, 9, 9]));
        assert!(slot.take().is_some());
        assert!(slot.latest().is_none());
        Ok(())
    }

    #[test]
    fn callback_sees_every_frame() -> Result<()> {
        let mut seen = 0u32;
        {
            let mut display = CallbackDisplay::new(|frame: &Frame| {
                assert_eq!(frame.dimensions(), (3, 1));
                seen += 1;
                Ok(())
            });
            for _ in 0..3 {
                display.show(&Frame::filled(3, 1, [0, 0, 0])?)?;
            }
        }
        assert_eq!(seen, 3);
        Ok(())
    }

    #[test]
    fn preview_is_rate_limited() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("preview.png");
        let mut display = PreviewFileDisplay::new(&path, Duration::from_secs(3600));
        let frame = Frame::filled(5, 5, [10, 20, 30])?;
        display.show(&frame)?;
        display.show(&frame)?;
        assert_eq!(display.writes(), 1);
        let back = crate::ingest::decode_image(&std::fs::read(&path)?)?;
        assert_eq!(back, frame);
        Ok(())
    }
}
