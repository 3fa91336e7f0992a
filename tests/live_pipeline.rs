use std::sync::{mpsc, Arc};
use std::time::Duration;

use thermatoonpix::{
    CallbackDisplay, FilterKind, FilterSettings, Frame, FrameStreamProcessor, LatestFrameSlot,
    LiveDisplay, LiveEvent, PreviewFileDisplay, ProcessError, ProcessorSettings, StopReason,
    Transform,
};

/// Identity filter that takes far longer than the camera's frame interval.
struct Sluggish;

impl Transform for Sluggish {
    fn name(&self) -> &'static str {
        "sluggish"
    }

    fn apply(&self, frame: &Frame) -> Result<Frame, ProcessError> {
        std::thread::sleep(Duration::from_millis(40));
        Ok(frame.clone())
    }
}

fn thermal() -> FrameStreamProcessor {
    FrameStreamProcessor::for_filter(
        FilterKind::Thermal,
        &FilterSettings::default(),
        ProcessorSettings::default(),
    )
}

#[test]
fn filtered_frames_reach_the_display_until_stopped() {
    let slot = LatestFrameSlot::new();
    let (shown_tx, shown_rx) = mpsc::channel();
    let mut sink = slot.clone();
    let display = CallbackDisplay::new(move |frame: &Frame| {
        sink.show(frame)?;
        let _ = shown_tx.send(());
        Ok(())
    });

    let session = thermal()
        .run_on_live_stream("stub://cam?width=32&height=24&fps=60", display)
        .unwrap();
    for _ in 0..3 {
        shown_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
    assert!(session.is_running());

    let report = session.stop();
    assert!(report.processed >= 3);
    assert!(report.captured >= report.processed);
    assert_eq!(report.failed, 0);
    assert_eq!(slot.latest().unwrap().dimensions(), (32, 24));
}

#[test]
fn busy_device_is_reported_before_any_thread_runs() {
    let err = thermal()
        .run_on_live_stream("stub://busy", CallbackDisplay::new(|_: &Frame| Ok(())))
        .err()
        .unwrap();
    assert!(matches!(err, ProcessError::DeviceUnavailable { .. }));
    assert!(err.is_retryable());
}

#[test]
fn broken_camera_stops_the_session() {
    let mut settings = ProcessorSettings::default();
    settings.live.max_consecutive_failures = 2;
    let processor =
        FrameStreamProcessor::for_filter(FilterKind::Pixel, &FilterSettings::default(), settings);

    let session = processor
        .run_on_live_stream(
            "stub://flaky?fail_after=0",
            CallbackDisplay::new(|_: &Frame| Ok(())),
        )
        .unwrap();

    let mut reason = None;
    while let Ok(event) = session.events().recv_timeout(Duration::from_secs(5)) {
        if let LiveEvent::Stopped { reason: r } = event {
            reason = Some(r);
            break;
        }
    }
    assert_eq!(reason, Some(StopReason::TooManyCaptureFailures(2)));
    let report = session.stop();
    assert_eq!(report.failed, 2);
    assert_eq!(report.processed, 0);
}

#[test]
fn preview_file_holds_the_latest_frame() {
    let dir = tempfile::tempdir().unwrap();
    let preview = dir.path().join("preview.png");
    let session = thermal()
        .run_on_live_stream(
            "stub://cam?width=20&height=10&fps=50",
            PreviewFileDisplay::new(&preview, Duration::ZERO),
        )
        .unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !preview.exists() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    session.stop();

    let image = image::open(&preview).unwrap();
    assert_eq!((image.width(), image.height()), (20, 10));
}

#[test]
fn slow_filter_drops_frames_instead_of_queueing() {
    let processor = FrameStreamProcessor::new(Arc::new(Sluggish), ProcessorSettings::default());
    let (shown_tx, shown_rx) = mpsc::channel();
    let session = processor
        .run_on_live_stream(
            "stub://fast?width=8&height=8&fps=0",
            CallbackDisplay::new(move |_: &Frame| {
                let _ = shown_tx.send(());
                Ok(())
            }),
        )
        .unwrap();
    for _ in 0..3 {
        shown_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    let report = session.stop();
    assert!(report.dropped > 0, "{report:?}");
    assert_eq!(report.failed, 0);
    // Every captured frame was either shown or dropped; nothing piled up.
    assert_eq!(report.captured, report.processed + report.dropped);
}
