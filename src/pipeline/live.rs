//! Live mode: capture thread -> bounded(1) hand-off -> transform thread -> display.
//!
//! When the transform thread is still busy, the newest captured frame is
//! dropped instead of queued, so latency stays bounded by one frame.
//! Per-frame failures are counted and reported as `LiveEvent`s; only a run of
//! consecutive capture failures ends the session on its own.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::FrameStreamProcessor;
use crate::error::{chain_message, ProcessError};
use crate::frame::Frame;
use crate::ingest::{open_camera, CameraConfig, CaptureDevice};
use crate::output::LiveDisplay;

#[derive(Clone, Debug, PartialEq)]
pub struct LiveSettings {
    /// Camera parameters; `device` is replaced by the job's device.
    pub camera: CameraConfig,
    /// Consecutive capture failures that end the session.
    pub max_consecutive_failures: u32,
    /// Undelivered events beyond this are discarded.
    pub event_capacity: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            max_consecutive_failures: 30,
            event_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    TooManyCaptureFailures(u32),
}

#[derive(Clone, Debug, PartialEq)]
pub enum LiveEvent {
    Connected { device: String },
    CaptureFailed { message: String, consecutive: u32 },
    TransformFailed { message: String },
    DisplayFailed { message: String },
    Stopped { reason: StopReason },
}

#[derive(Clone, Debug, PartialEq)]
pub struct LiveReport {
    pub device: String,
    pub captured: u64,
    pub processed: u64,
    /// Captured frames skipped because the transform thread was busy.
    pub dropped: u64,
    /// Capture, transform and display failures.
    pub failed: u64,
    pub elapsed: Duration,
}

#[derive(Default)]
struct LiveCounters {
    captured: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

type DeviceOpener = Box<dyn FnOnce() -> Result<Box<dyn CaptureDevice>, ProcessError> + Send>;

/// A running live session. Stopping (or dropping) it joins both threads and
/// releases the device.
pub struct LiveSession {
    device: String,
    stop: Arc<AtomicBool>,
    counters: Arc<LiveCounters>,
    events: Receiver<LiveEvent>,
    capture: Option<JoinHandle<()>>,
    transform: Option<JoinHandle<()>>,
    started: Instant,
}

impl LiveSession {
    /// Session events, oldest first.
    pub fn events(&self) -> &Receiver<LiveEvent> {
        &self.events
    }

    /// Counters so far.
    pub fn report(&self) -> LiveReport {
        LiveReport {
            device: self.device.clone(),
            captured: self.counters.captured.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }

    /// False once capture has ended (stopped or failed out).
    pub fn is_running(&self) -> bool {
        self.capture.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Stop capturing, wait for both threads and return the final counters.
    pub fn stop(mut self) -> LiveReport {
        self.shutdown();
        self.report()
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for (name, handle) in [("capture", self.capture.take()), ("transform", self.transform.take())] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    log::error!("live {name} thread panicked on {}", self.device);
                }
            }
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl FrameStreamProcessor {
    /// Open `device` and start streaming transformed frames into `display`.
    pub fn run_on_live_stream(
        &self,
        device: &str,
        display: impl LiveDisplay + 'static,
    ) -> Result<LiveSession, ProcessError> {
        let config = CameraConfig {
            device: device.to_string(),
            ..self.settings.live.camera.clone()
        };
        let opener: DeviceOpener = Box::new(move || {
            open_camera(config).map(|camera| Box::new(camera) as Box<dyn CaptureDevice>)
        });
        self.start_live(device.to_string(), opener, Box::new(display))
    }

    /// Like `run_on_live_stream`, for a caller-supplied camera.
    ///
    /// `open` runs on the capture thread, so the device itself need not be `Send`.
    pub fn run_on_capture<O>(
        &self,
        name: &str,
        open: O,
        display: impl LiveDisplay + 'static,
    ) -> Result<LiveSession, ProcessError>
    where
        O: FnOnce() -> Result<Box<dyn CaptureDevice>, ProcessError> + Send + 'static,
    {
        self.start_live(name.to_string(), Box::new(open), Box::new(display))
    }

    fn start_live(
        &self,
        device: String,
        open: DeviceOpener,
        display: Box<dyn LiveDisplay>,
    ) -> Result<LiveSession, ProcessError> {
        let settings = self.settings.live.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(LiveCounters::default());
        let (frame_tx, frame_rx) = bounded::<Frame>(1);
        let (ready_tx, ready_rx) = bounded::<Result<String, ProcessError>>(1);
        let (event_tx, event_rx) = bounded::<LiveEvent>(settings.event_capacity.max(1));

        let capture = {
            let stop = stop.clone();
            let counters = counters.clone();
            let events = event_tx.clone();
            let max_failures = settings.max_consecutive_failures.max(1);
            std::thread::Builder::new()
                .name("thermatoon-capture".to_string())
                .spawn(move || {
                    let camera = match open() {
                        Ok(camera) => {
                            emit(&events, LiveEvent::Connected { device: camera.describe() });
                            let _ = ready_tx.send(Ok(camera.describe()));
                            camera
                        }
                        Err(err) => {
                            let _ = ready_tx.send(Err(err));
                            return;
                        }
                    };
                    capture_loop(camera, frame_tx, &events, &stop, &counters, max_failures);
                })
                .map_err(|err| ProcessError::DeviceUnavailable {
                    device: device.clone(),
                    reason: format!("spawn capture thread: {err}"),
                })?
        };

        let connected = ready_rx.recv().unwrap_or_else(|_| {
            Err(ProcessError::DeviceUnavailable {
                device: device.clone(),
                reason: "capture thread exited before opening the device".into(),
            })
        });
        let described = match connected {
            Ok(described) => described,
            Err(err) => {
                let _ = capture.join();
                log::warn!("live: cannot open {}: {}", device, err);
                return Err(err);
            }
        };
        log::info!("live: {} connected, applying {}", described, self.transform.name());

        let transform = {
            let counters = counters.clone();
            let processor = self.clone();
            let events = event_tx;
            std::thread::Builder::new()
                .name("thermatoon-transform".to_string())
                .spawn(move || transform_loop(processor, display, frame_rx, &events, &counters))
        };
        let transform = match transform {
            Ok(handle) => handle,
            Err(err) => {
                stop.store(true, Ordering::SeqCst);
                let _ = capture.join();
                return Err(ProcessError::Output(format!("spawn transform thread: {err}")));
            }
        };

        Ok(LiveSession {
            device,
            stop,
            counters,
            events: event_rx,
            capture: Some(capture),
            transform: Some(transform),
            started: Instant::now(),
        })
    }
}

/// Report an event without ever blocking the producer.
fn emit(events: &Sender<LiveEvent>, event: LiveEvent) {
    if let Err(TrySendError::Full(event)) = events.try_send(event) {
        log::trace!("live: event queue full, discarding {:?}", event);
    }
}

fn capture_loop(
    mut camera: Box<dyn CaptureDevice>,
    frames: Sender<Frame>,
    events: &Sender<LiveEvent>,
    stop: &AtomicBool,
    counters: &LiveCounters,
    max_failures: u32,
) {
    let mut consecutive = 0u32;
    while !stop.load(Ordering::SeqCst) {
        match camera.capture() {
            Ok(frame) => {
                consecutive = 0;
                counters.captured.fetch_add(1, Ordering::Relaxed);
                match frames.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Err(err) => {
                consecutive += 1;
                counters.failed.fetch_add(1, Ordering::Relaxed);
                let message = chain_message(&err);
                log::warn!("live: capture failed ({consecutive} in a row): {message}");
                emit(events, LiveEvent::CaptureFailed { message, consecutive });
                if consecutive >= max_failures {
                    log::warn!("live: giving up on {} after {consecutive} failures", camera.describe());
                    emit(
                        events,
                        LiveEvent::Stopped {
                            reason: StopReason::TooManyCaptureFailures(consecutive),
                        },
                    );
                    return;
                }
            }
        }
    }
    emit(
        events,
        LiveEvent::Stopped {
            reason: StopReason::Requested,
        },
    );
    log::info!("live: capture on {} stopped", camera.describe());
}

fn transform_loop(
    processor: FrameStreamProcessor,
    mut display: Box<dyn LiveDisplay>,
    frames: Receiver<Frame>,
    events: &Sender<LiveEvent>,
    counters: &LiveCounters,
) {
    // Ends once the capture thread drops its sender.
    for frame in frames.iter() {
        let out = match processor.run_on_frame(&frame) {
            Ok(out) => out,
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("live: {err}");
                emit(events, LiveEvent::TransformFailed { message: err.to_string() });
                continue;
            }
        };
        match display.show(&out) {
            Ok(()) => {
                counters.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                let message = chain_message(&err);
                log::warn!("live: display failed: {message}");
                emit(events, LiveEvent::DisplayFailed { message });
            }
        }
    }
}
