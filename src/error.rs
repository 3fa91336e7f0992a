//! Job-level error kinds.
//!
//! Sources, sinks and config parsing work with `anyhow::Result` and attach
//! context as they go. The pipeline folds those failures into a
//! `ProcessError` so callers can tell the kinds apart without string matching.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    /// Empty or undecodable image/video bytes, or an unusable input path.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The video source produced no frames at all; no encoder was opened.
    #[error("no frames processed: the video source yielded zero readable frames")]
    EmptyStream,

    /// A transform rejected a frame. Not retried; the job is aborted.
    #[error("{filter} transform failed: {reason}")]
    TransformFailure { filter: &'static str, reason: String },

    /// Capture device busy, missing or permission denied. Retryable.
    #[error("capture device {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    /// Encoding or writing the output failed.
    #[error("output failed: {0}")]
    Output(String),

    /// The job was cancelled by its caller.
    #[error("job aborted")]
    Aborted,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ProcessError {
    /// Whether the caller may reasonably retry the same job unchanged
    /// (e.g. after granting camera permission).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessError::DeviceUnavailable { .. })
    }
}

/// Render an `anyhow` chain on one line (`outer: inner: root`).
pub(crate) fn chain_message(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
