//! Video mode: finite stream in, re-encoded stream out.
//!
//! State machine: `Idle -> Opened -> {Reading <-> Transforming <-> Writing} -> Closed`.
//! The encoder is opened lazily on the first transformed frame, so an empty
//! stream never creates an output file. On any failure or abort the partial
//! output is removed.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::FrameStreamProcessor;
use crate::error::{chain_message, ProcessError};
use crate::ingest::{FrameSource, VideoFileSource};
use crate::output::{open_video_sink, VideoFormat, VideoSink};

/// Called after each written frame with the running frame count.
pub type ProgressFn = Box<dyn FnMut(u64) + Send>;

/// Cooperative cancellation flag shared between a job and its caller.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct VideoOptions {
    /// Output frame rate; falls back to the source rate, then the default.
    pub fps: Option<f64>,
    pub cancel: CancelToken,
    pub progress: Option<ProgressFn>,
}

impl VideoOptions {
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: impl FnMut(u64) + Send + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }
}

pub struct VideoJob {
    /// Local path or `stub://` address.
    pub input: String,
    pub output: PathBuf,
    pub options: VideoOptions,
}

impl VideoJob {
    pub fn new(input: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            options: VideoOptions::default(),
        }
    }

    pub fn with_options(mut self, options: VideoOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoReport {
    pub frame_count: u64,
    pub elapsed: Duration,
    pub output: PathBuf,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum VideoState {
    Idle,
    Opened,
    Reading,
    Transforming,
    Writing,
    Closed,
}

struct VideoRun {
    state: VideoState,
    sink: Option<Box<dyn VideoSink>>,
    /// Output file exists because we created it.
    created: bool,
    size: Option<(u32, u32)>,
    frames: u64,
}

impl VideoRun {
    fn new() -> Self {
        Self {
            state: VideoState::Idle,
            sink: None,
            created: false,
            size: None,
            frames: 0,
        }
    }

    fn enter(&mut self, next: VideoState) {
        if self.state != next {
            log::trace!("video: {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

impl FrameStreamProcessor {
    /// Open the job's input and process it to completion.
    pub fn run_on_video(&self, job: VideoJob) -> Result<VideoReport, ProcessError> {
        let mut source = VideoFileSource::open(&job.input)
            .map_err(|err| ProcessError::InvalidInput(chain_message(&err)))?;
        self.run_on_source(&mut source, &job.output, job.options)
    }

    /// Process uploaded video bytes.
    ///
    /// GIF data is decoded in memory; anything else is spooled to a temporary
    /// file for the container decoder, removed when the job ends.
    pub fn run_on_video_bytes(
        &self,
        bytes: &[u8],
        output: &Path,
        options: VideoOptions,
    ) -> Result<VideoReport, ProcessError> {
        if bytes.is_empty() {
            return Err(ProcessError::InvalidInput("video bytes are empty".into()));
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            let mut source = VideoFileSource::from_gif_bytes(bytes.to_vec())
                .map_err(|err| ProcessError::InvalidInput(chain_message(&err)))?;
            return self.run_on_source(&mut source, output, options);
        }

        let mut spool = tempfile::Builder::new()
            .prefix("thermatoon-upload-")
            .tempfile()
            .map_err(|err| ProcessError::InvalidInput(format!("spool upload: {err}")))?;
        spool
            .write_all(bytes)
            .and_then(|_| spool.flush())
            .map_err(|err| ProcessError::InvalidInput(format!("spool upload: {err}")))?;
        let spool_path = spool
            .path()
            .to_str()
            .ok_or_else(|| ProcessError::InvalidInput("temporary path is not UTF-8".into()))?
            .to_string();
        let mut source = VideoFileSource::open(&spool_path)
            .map_err(|err| ProcessError::InvalidInput(chain_message(&err)))?;
        self.run_on_source(&mut source, output, options)
    }

    /// Drain `source` through the transform into a new video at `output`.
    pub fn run_on_source(
        &self,
        source: &mut dyn FrameSource,
        output: &Path,
        mut options: VideoOptions,
    ) -> Result<VideoReport, ProcessError> {
        let format = VideoFormat::from_path(output)
            .map_err(|err| ProcessError::Output(chain_message(&err)))?;
        if !format.is_available() {
            return Err(ProcessError::Output(format!(
                "{:?} output is not available in this build (enable video-ffmpeg or write .gif)",
                format
            )));
        }
        let fps = self.resolve_fps(options.fps, source.frame_rate())?;

        let started = Instant::now();
        log::info!(
            "video job: {} from {} to {} at {} fps",
            self.transform.name(),
            source.describe(),
            output.display(),
            fps
        );

        let mut run = VideoRun::new();
        run.enter(VideoState::Opened);
        let result = self.drive(source, output, fps, &mut options, &mut run);
        run.enter(VideoState::Closed);

        match result {
            Ok(()) => {
                let (width, height) = run.size.unwrap_or((0, 0));
                let report = VideoReport {
                    frame_count: run.frames,
                    elapsed: started.elapsed(),
                    output: output.to_path_buf(),
                    fps,
                    width,
                    height,
                };
                log::info!(
                    "video job finished: {} frames in {:.2}s",
                    report.frame_count,
                    report.elapsed.as_secs_f64()
                );
                Ok(report)
            }
            Err(err) => {
                drop(run.sink.take());
                if run.created {
                    if let Err(rm) = std::fs::remove_file(output) {
                        log::warn!("could not remove partial output {}: {}", output.display(), rm);
                    }
                }
                log::warn!("video job failed after {} frames: {}", run.frames, err);
                Err(err)
            }
        }
    }

    /// Explicit job rate, else the source's native rate, else the default.
    fn resolve_fps(&self, requested: Option<f64>, native: Option<f64>) -> Result<f64, ProcessError> {
        if let Some(fps) = requested {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(ProcessError::Config(format!("output fps must be positive (got {fps})")));
            }
            return Ok(fps);
        }
        Ok(native
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(self.settings.default_fps))
    }

    fn drive(
        &self,
        source: &mut dyn FrameSource,
        output: &Path,
        fps: f64,
        options: &mut VideoOptions,
        run: &mut VideoRun,
    ) -> Result<(), ProcessError> {
        loop {
            if options.cancel.is_cancelled() {
                return Err(ProcessError::Aborted);
            }

            run.enter(VideoState::Reading);
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    log::warn!(
                        "read failed after {} frames, ending stream: {}",
                        run.frames,
                        chain_message(&err)
                    );
                    break;
                }
            };

            run.enter(VideoState::Transforming);
            let out = self.run_on_frame(&frame)?;

            run.enter(VideoState::Writing);
            let size = out.dimensions();
            match run.size {
                Some(expected) if expected != size => {
                    return Err(ProcessError::TransformFailure {
                        filter: self.transform.name(),
                        reason: format!(
                            "frame {} is {}x{} but the stream started at {}x{}",
                            run.frames, size.0, size.1, expected.0, expected.1
                        ),
                    });
                }
                Some(_) => {}
                None => {
                    let sink = open_video_sink(output, size.0, size.1, fps)
                        .map_err(|err| ProcessError::Output(chain_message(&err)))?;
                    run.sink = Some(sink);
                    run.created = true;
                    run.size = Some(size);
                }
            }
            if let Some(sink) = run.sink.as_mut() {
                sink.write_frame(&out)
                    .map_err(|err| ProcessError::Output(chain_message(&err)))?;
            }
            run.frames += 1;
            if let Some(progress) = options.progress.as_mut() {
                progress(run.frames);
            }
        }

        let sink = run.sink.take().ok_or(ProcessError::EmptyStream)?;
        sink.finish()
            .map_err(|err| ProcessError::Output(chain_message(&err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Transform, ThermalMapper};
    use crate::frame::Frame;
    use crate::pipeline::{ProcessorSettings, DEFAULT_VIDEO_FPS};

    fn processor() -> FrameStreamProcessor {
        FrameStreamProcessor::new(Arc::new(ThermalMapper::default()), ProcessorSettings::default())
    }

    struct Growing(u32);

    impl FrameSource for Growing {
        fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
            if self.0 >= 12 {
                return Ok(None);
            }
            self.0 += 4;
            Ok(Some(Frame::filled(self.0, 4, [9, 9, 9])?))
        }

        fn describe(&self) -> String {
            "growing".into()
        }
    }

    struct Failing;

    impl Transform for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn apply(&self, _frame: &Frame) -> Result<Frame, ProcessError> {
            Err(ProcessError::TransformFailure {
                filter: "failing",
                reason: "always".into(),
            })
        }
    }

    #[test]
    fn fps_prefers_job_then_source_then_default() -> anyhow::Result<()> {
        let p = processor();
        assert_eq!(p.resolve_fps(Some(12.0), Some(30.0))?, 12.0);
        assert_eq!(p.resolve_fps(None, Some(30.0))?, 30.0);
        assert_eq!(p.resolve_fps(None, None)?, DEFAULT_VIDEO_FPS);
        assert_eq!(p.resolve_fps(None, Some(0.0))?, DEFAULT_VIDEO_FPS);
        assert!(matches!(
            p.resolve_fps(Some(-1.0), None),
            Err(ProcessError::Config(_))
        ));
        Ok(())
    }

    #[test]
    fn size_change_mid_stream_is_rejected_and_cleaned_up() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.gif");
        let err = processor()
            .run_on_source(&mut Growing(0), &out, VideoOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProcessError::TransformFailure { .. }), "{err}");
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn transform_failure_aborts_without_output() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.gif");
        let p = FrameStreamProcessor::new(Arc::new(Failing), ProcessorSettings::default());
        let err = p
            .run_on_video(VideoJob::new("stub://clip?frames=3&width=8&height=8", &out))
            .unwrap_err();
        assert!(matches!(err, ProcessError::TransformFailure { filter: "failing", .. }));
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn cancelled_job_aborts() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.gif");
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let options = VideoOptions::default()
            .with_cancel(cancel)
            .with_progress(move |done| {
                if done == 2 {
                    trigger.cancel();
                }
            });
        let job = VideoJob::new("stub://clip?frames=10&width=8&height=8", &out).with_options(options);
        assert!(matches!(processor().run_on_video(job), Err(ProcessError::Aborted)));
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn read_failure_ends_the_stream_early() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.gif");
        let report = processor().run_on_video(VideoJob::new(
            "stub://clip?frames=10&fail_at=4&width=8&height=8",
            &out,
        ))?;
        assert_eq!(report.frame_count, 4);
        assert!(out.exists());
        Ok(())
    }

    #[test]
    fn unsupported_output_is_rejected_before_reading() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.txt");
        let err = processor()
            .run_on_video(VideoJob::new("stub://clip?frames=2", &out))
            .unwrap_err();
        assert!(matches!(err, ProcessError::Output(_)));
        Ok(())
    }

    #[test]
    fn gif_bytes_are_processed_in_memory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = dir.path().join("first.gif");
        processor().run_on_video(VideoJob::new("stub://clip?frames=3&width=10&height=6", &first))?;

        let bytes = std::fs::read(&first)?;
        let second = dir.path().join("second.gif");
        let report = processor().run_on_video_bytes(&bytes, &second, VideoOptions::default())?;
        assert_eq!(report.frame_count, 3);
        assert_eq!((report.width, report.height), (10, 6));
        Ok(())
    }

    #[test]
    fn empty_upload_is_invalid() {
        let err = processor()
            .run_on_video_bytes(&[], Path::new("out.gif"), VideoOptions::default())
            .unwrap_err();
        assert!(matches!(err, ProcessError::InvalidInput(_)));
    }
}
