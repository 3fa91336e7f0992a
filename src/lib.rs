//! ThermaToonPix
//!
//! Three visual filters (cartoon stylization, pixel-art quantization and
//! thermal-vision colorization) and a pipeline that applies one of them to
//! a still image, a video file or a live camera.
//!
//! # Module Structure
//!
//! - `frame`: RGB and luminance rasters
//! - `imgproc`: raster primitives the filters are built from
//! - `filter`: the `Transform` trait and the three filters
//! - `ingest`: image decoding, video file and camera sources
//! - `output`: image encoding, video encoders, live displays
//! - `pipeline`: `FrameStreamProcessor` and the image / video / live modes
//! - `config`: layered settings (defaults, config file, environment)
//! - `ui`: stage and frame progress for the command line

pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod imgproc;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod ui;

pub use config::ThermaToonConfig;
pub use error::ProcessError;
pub use filter::{
    cartoonize, pixelate, thermalize, CartoonSettings, Cartoonizer, FilterKind, FilterSettings,
    PixelSettings, Pixelator, ThermalMapper, ThermalSettings, Transform,
};
pub use frame::{Frame, GrayPlane};
pub use ingest::{decode_image, FrameSource, VideoFileSource};
pub use output::{
    encode_image, open_video_sink, write_image, CallbackDisplay, LatestFrameSlot, LiveDisplay,
    PreviewFileDisplay, VideoFormat, VideoSink,
};
pub use pipeline::{
    CancelToken, FrameStreamProcessor, ImageOutput, Job, JobOutcome, LiveEvent, LiveReport,
    LiveSession, LiveSettings, ProcessorSettings, StopReason, VideoJob, VideoOptions, VideoReport,
};
