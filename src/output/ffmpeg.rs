//! MPEG-4 Part 2 encoding through FFmpeg.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg::util::format::pixel::Pixel;
use std::path::Path;

use super::{pad_to_even, VideoSink};
use crate::frame::{Frame, CHANNELS};

/// Output timestamps count in 1/TIME_SCALE of a frame so fractional rates
/// such as 29.97 survive.
const TIME_SCALE: i32 = 1000;

pub(crate) struct FfmpegVideoSink {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    /// Encoded size: the frame size rounded up to even.
    enc_width: u32,
    enc_height: u32,
    next_pts: i64,
}

impl FfmpegVideoSink {
    pub(crate) fn create(path: &Path, width: u32, height: u32, fps: f64) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let enc_width = (width + 1) & !1;
        let enc_height = (height + 1) & !1;
        if (enc_width, enc_height) != (width, height) {
            log::info!(
                "ffmpeg: encoding {width}x{height} frames as {enc_width}x{enc_height} (edge repeated)"
            );
        }

        let mut output = ffmpeg::format::output(&path)
            .with_context(|| format!("open output container {}", path.display()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| anyhow!("ffmpeg was built without the MPEG-4 encoder"))?;

        let rate = ffmpeg::Rational::new((fps * TIME_SCALE as f64).round() as i32, TIME_SCALE);
        let encoder_time_base = rate.invert();

        let mut stream = output.add_stream(codec).context("add video stream")?;
        let stream_index = stream.index();

        let mut video = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .context("create video encoder context")?;
        video.set_width(enc_width);
        video.set_height(enc_height);
        video.set_format(Pixel::YUV420P);
        video.set_time_base(encoder_time_base);
        video.set_frame_rate(Some(rate));
        if global_header {
            video.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = video.open_as(codec).context("open MPEG-4 encoder")?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .with_context(|| format!("write container header for {}", path.display()))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        // Same size on both sides: color conversion only.
        let scaler = ffmpeg::software::scaling::Context::get(
            Pixel::RGB24,
            enc_width,
            enc_height,
            Pixel::YUV420P,
            enc_width,
            enc_height,
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            enc_width,
            enc_height,
            next_pts: 0,
        })
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .context("write encoded packet")?;
        }
        Ok(())
    }
}

impl VideoSink for FfmpegVideoSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame is {}x{}, encoder was opened at {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }

        let padded = pad_to_even(frame);
        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, self.enc_width, self.enc_height);
        let row_bytes = self.enc_width as usize * CHANNELS;
        let stride = rgb.stride(0);
        let plane = rgb.data_mut(0);
        for (row, src) in padded.as_bytes().chunks_exact(row_bytes).enumerate() {
            plane[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .context("convert frame to YUV420P")?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv)
            .context("send frame to MPEG-4 encoder")?;
        self.drain_packets()
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.encoder.send_eof().context("flush MPEG-4 encoder")?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .context("write container trailer")?;
        log::debug!("ffmpeg: wrote {} frames", self.next_pts);
        Ok(())
    }
}
