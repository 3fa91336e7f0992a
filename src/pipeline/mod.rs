//! Frame stream processing.
//!
//! `FrameStreamProcessor` applies one transform in one of three modes:
//! - Image: decode bytes, transform once, return the frame
//! - Video: read a finite stream, transform every frame, re-encode
//! - Live: capture and transform on two threads until stopped
//!
//! The caller picks the mode explicitly through `Job`.

mod live;
mod video;

pub use live::{LiveEvent, LiveReport, LiveSession, LiveSettings, StopReason};
pub use video::{CancelToken, ProgressFn, VideoJob, VideoOptions, VideoReport};

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ProcessError;
use crate::filter::{apply_checked, FilterKind, FilterSettings, Transform};
use crate::frame::Frame;
use crate::ingest::decode_image;
use crate::output::LiveDisplay;

/// Frame rate used when neither the job nor the source specifies one.
pub const DEFAULT_VIDEO_FPS: f64 = 20.0;

#[derive(Clone, Debug, PartialEq)]
pub struct ProcessorSettings {
    /// Output fps fallback for video jobs.
    pub default_fps: f64,
    pub live: LiveSettings,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            default_fps: DEFAULT_VIDEO_FPS,
            live: LiveSettings::default(),
        }
    }
}

/// Result of an image job.
#[derive(Clone, Debug)]
pub struct ImageOutput {
    pub frame: Frame,
    pub elapsed: Duration,
}

/// What to run. Replaces implicit UI mode state.
pub enum Job {
    Image {
        bytes: Vec<u8>,
    },
    Video(VideoJob),
    Live {
        device: String,
        display: Box<dyn LiveDisplay>,
    },
}

impl Job {
    pub fn mode(&self) -> &'static str {
        match self {
            Job::Image { .. } => "image",
            Job::Video(_) => "video",
            Job::Live { .. } => "live",
        }
    }
}

pub enum JobOutcome {
    Image(ImageOutput),
    Video(VideoReport),
    /// Running session; stop it to get the `LiveReport`.
    Live(LiveSession),
}

/// Applies a single transform to images, videos and live streams.
#[derive(Clone)]
pub struct FrameStreamProcessor {
    transform: Arc<dyn Transform>,
    settings: ProcessorSettings,
}

impl FrameStreamProcessor {
    pub fn new(transform: Arc<dyn Transform>, settings: ProcessorSettings) -> Self {
        Self {
            transform,
            settings,
        }
    }

    /// Build the named filter with `filters` constants.
    pub fn for_filter(kind: FilterKind, filters: &FilterSettings, settings: ProcessorSettings) -> Self {
        Self::new(kind.build(filters), settings)
    }

    pub fn transform(&self) -> &Arc<dyn Transform> {
        &self.transform
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    /// Decode, transform once, report elapsed time.
    pub fn run_on_image(&self, bytes: &[u8]) -> Result<ImageOutput, ProcessError> {
        let started = Instant::now();
        let frame = decode_image(bytes)?;
        log::info!(
            "image job: {} on {}x{}",
            self.transform.name(),
            frame.width(),
            frame.height()
        );
        let frame = self.run_on_frame(&frame)?;
        let elapsed = started.elapsed();
        log::info!("image job finished in {:.3}s", elapsed.as_secs_f64());
        Ok(ImageOutput { frame, elapsed })
    }

    /// Transform one already-decoded frame.
    pub fn run_on_frame(&self, frame: &Frame) -> Result<Frame, ProcessError> {
        apply_checked(self.transform.as_ref(), frame)
    }

    /// Dispatch on the job's mode.
    pub fn run(&self, job: Job) -> Result<JobOutcome, ProcessError> {
        log::debug!("dispatching {} job", job.mode());
        match job {
            Job::Image { bytes } => self.run_on_image(&bytes).map(JobOutcome::Image),
            Job::Video(job) => self.run_on_video(job).map(JobOutcome::Video),
            Job::Live { device, display } => self
                .run_on_live_stream(&device, display)
                .map(JobOutcome::Live),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ThermalMapper;
    use crate::output::encode_image;

    fn thermal() -> FrameStreamProcessor {
        FrameStreamProcessor::new(Arc::new(ThermalMapper::default()), ProcessorSettings::default())
    }

    #[test]
    fn image_job_preserves_shape() -> anyhow::Result<()> {
        let frame = Frame::from_fn(21, 13, |x, y| [x as u8 * 10, y as u8 * 15, 50])?;
        let png = encode_image(&frame, image::ImageFormat::Png)?;
        let out = thermal().run_on_image(&png)?;
        assert_eq!(out.frame.dimensions(), (21, 13));
        Ok(())
    }

    #[test]
    fn empty_image_bytes_are_invalid() {
        assert!(matches!(
            thermal().run_on_image(&[]),
            Err(ProcessError::InvalidInput(_))
        ));
    }

    #[test]
    fn run_dispatches_image_jobs() -> anyhow::Result<()> {
        let frame = Frame::filled(8, 8, [120, 120, 120])?;
        let bytes = encode_image(&frame, image::ImageFormat::Png)?;
        match thermal().run(Job::Image { bytes })? {
            JobOutcome::Image(out) => assert_eq!(out.frame.dimensions(), (8, 8)),
            _ => panic!("expected an image outcome"),
        }
        Ok(())
    }
}
