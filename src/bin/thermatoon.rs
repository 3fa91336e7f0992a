//! thermatoon - apply the cartoon, pixel or thermal filter to an image, a
//! video file or a live camera.

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use thermatoonpix::ui::{format_duration, Ui};
use thermatoonpix::{
    write_image, CancelToken, FilterKind, FrameStreamProcessor, LiveEvent, PreviewFileDisplay,
    ThermaToonConfig, Transform, VideoJob, VideoOptions,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(ClapArgs, Debug)]
struct FilterArg {
    /// Filter to apply (cartoon|pixel|thermal).
    #[arg(long, short)]
    filter: FilterKind,
    /// Pixel block size (pixel filter only).
    #[arg(long)]
    block_size: Option<u32>,
    /// Palette size (pixel filter only).
    #[arg(long)]
    colors: Option<usize>,
    /// Seed for a reproducible pixel palette.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter a still image (PNG, JPEG, GIF or BMP).
    Image {
        #[command(flatten)]
        filter: FilterArg,
        #[arg(long, short)]
        input: PathBuf,
        /// Output image; format follows the extension.
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Filter every frame of a video file.
    Video {
        #[command(flatten)]
        filter: FilterArg,
        /// Video path or stub:// address.
        #[arg(long, short)]
        input: String,
        /// Output video (.gif, or .mp4 with the video-ffmpeg feature).
        #[arg(long, short)]
        output: PathBuf,
        /// Output frame rate (default: the input's rate).
        #[arg(long)]
        fps: Option<f64>,
    },
    /// Filter a live camera into a periodically refreshed preview image.
    Live {
        #[command(flatten)]
        filter: FilterArg,
        /// Capture device (default from config or /dev/video0).
        #[arg(long, short)]
        device: Option<String>,
        /// PNG file rewritten with the latest filtered frame.
        #[arg(long, short)]
        preview: PathBuf,
        /// Stop after this many seconds (default: until Ctrl-C).
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let no_pretty = std::env::var_os("THERMATOON_NO_PRETTY").is_some()
        || !std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&args.ui), is_tty, no_pretty);

    let mut config = {
        let _stage = ui.stage("Load configuration");
        ThermaToonConfig::load()?
    };

    match args.command {
        Command::Image {
            filter,
            input,
            output,
        } => {
            let processor = build_processor(&mut config, &filter)?;
            let bytes = {
                let _stage = ui.stage("Read image");
                std::fs::read(&input).with_context(|| format!("read {}", input.display()))?
            };
            let result = {
                let _stage = ui.stage(&format!("Apply {} filter", filter.filter));
                processor.run_on_image(&bytes)?
            };
            {
                let _stage = ui.stage("Write image");
                write_image(&result.frame, &output)?;
            }
            log::info!(
                "wrote {} ({}x{}, {} took {})",
                output.display(),
                result.frame.width(),
                result.frame.height(),
                processor.transform().name(),
                format_duration(result.elapsed)
            );
        }
        Command::Video {
            filter,
            input,
            output,
            fps,
        } => {
            let processor = build_processor(&mut config, &filter)?;
            let cancel = CancelToken::new();
            let on_signal = cancel.clone();
            ctrlc::set_handler(move || on_signal.cancel())
                .context("install Ctrl-C handler")?;

            let counter = ui.frames(&format!("{} video", filter.filter));
            let progress = counter.clone();
            let mut options = VideoOptions::default()
                .with_cancel(cancel)
                .with_progress(move |frames| progress.set(frames));
            options.fps = fps;

            let report = {
                let _stage = ui.stage(&format!("Filter {input}"));
                let job = VideoJob::new(input.clone(), &output).with_options(options);
                let result = processor.run_on_video(job);
                counter.finish();
                result?
            };
            log::info!(
                "wrote {} frames to {} at {} fps in {}",
                report.frame_count,
                report.output.display(),
                report.fps,
                format_duration(report.elapsed)
            );
        }
        Command::Live {
            filter,
            device,
            preview,
            seconds,
        } => {
            if let Some(device) = device {
                config.processor.live.camera.device = device;
            }
            let device = config.processor.live.camera.device.clone();
            let processor = build_processor(&mut config, &filter)?;

            let (stop_tx, stop_rx) = mpsc::channel();
            ctrlc::set_handler(move || {
                let _ = stop_tx.send(());
            })
            .context("install Ctrl-C handler")?;

            let display = PreviewFileDisplay::new(
                &preview,
                Duration::from_millis(config.preview_interval_ms),
            );
            let session = {
                let _stage = ui.stage(&format!("Open {device}"));
                processor.run_on_live_stream(&device, display)?
            };
            log::info!(
                "streaming {} from {} into {} (Ctrl-C to stop)",
                filter.filter,
                device,
                preview.display()
            );

            let counter = ui.frames("live");
            let deadline = seconds.map(|s| std::time::Instant::now() + Duration::from_secs(s));
            loop {
                match stop_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                }
                for event in session.events().try_iter() {
                    if let LiveEvent::Stopped { reason } = event {
                        log::warn!("live session ended: {reason:?}");
                    }
                }
                counter.set(session.report().processed);
                if !session.is_running() {
                    break;
                }
                if deadline.is_some_and(|d| std::time::Instant::now() >= d) {
                    break;
                }
            }
            counter.finish();

            let report = {
                let _stage = ui.stage("Stop capture");
                session.stop()
            };
            log::info!(
                "live: {} captured, {} shown, {} dropped, {} failed over {}",
                report.captured,
                report.processed,
                report.dropped,
                report.failed,
                format_duration(report.elapsed)
            );
        }
    }
    Ok(())
}

/// Apply CLI overrides to the loaded config and build the processor.
fn build_processor(config: &mut ThermaToonConfig, args: &FilterArg) -> Result<FrameStreamProcessor> {
    let pixel = &mut config.filters.pixel;
    if let Some(size) = args.block_size {
        pixel.block_size = size;
    }
    if let Some(colors) = args.colors {
        pixel.num_colors = colors;
    }
    if args.seed.is_some() {
        pixel.seed = args.seed;
    }
    config
        .validate()
        .map_err(|err| anyhow!("invalid settings: {err:#}"))?;
    Ok(FrameStreamProcessor::for_filter(
        args.filter,
        &config.filters,
        config.processor.clone(),
    ))
}
