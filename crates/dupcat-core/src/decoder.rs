//! External media decoder contract and the FFmpeg-backed implementation.
//!
//! The scan engine never parses containers or decodes frames itself; it
//! shells out. The only implementation shipped here talks to `ffmpeg`,
//! spawning it and reading raw samples back off a pipe rather than through
//! a temp file.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::config::DecoderOptions;
use crate::record::MediaInfo;

/// Everything the Fingerprint Builder needs from an external decoder.
pub trait MediaDecoder: Send + Sync {
    /// Probe a video file for duration, fps, bitrate, and stream dimensions.
    fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Extract a 16x16 grayscale thumbnail at each of `positions` (each a
    /// fraction of `duration_seconds`, in `[0, 1]`). Failure at any single
    /// position fails the whole call, per contract.
    fn extract_grayscale_thumbnails(
        &self,
        path: &Path,
        positions: &[f64],
        duration_seconds: f64,
        options: &DecoderOptions,
    ) -> Result<Vec<[u8; 256]>>;

    /// A single 16x16 grayscale thumbnail for a still image.
    fn extract_image_thumbnail(&self, path: &Path) -> Result<[u8; 256]>;

    /// An encoded color image at `timestamp_seconds`, for UI preview only.
    /// Never consulted by fingerprinting or comparison; callers should treat
    /// failure as non-fatal and fall back to a placeholder.
    fn extract_color_thumbnail_for_display(&self, path: &Path, timestamp_seconds: f64) -> Result<Vec<u8>>;
}

/// `ffmpeg`/`ffprobe` subprocess decoder.
pub struct FfmpegDecoder;

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self
    }

    fn check_available(binary: &str) -> Result<()> {
        let status = Command::new(binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        if status.is_err() {
            anyhow::bail!(
                "{binary} not found. Fingerprinting video/image files requires {binary}.\n\
                \n\
                Please install FFmpeg:\n\
                - Windows: Download from https://ffmpeg.org/download.html\n\
                - Linux: sudo apt install ffmpeg\n\
                - macOS: brew install ffmpeg",
                binary = binary
            );
        }
        Ok(())
    }

    fn ffmpeg_args_for_options(options: &DecoderOptions) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(mode) = &options.hardware_acceleration_mode {
            args.push("-hwaccel".to_string());
            args.push(mode.clone());
        }
        if let Some(extra) = &options.custom_ff_arguments {
            args.extend(extra.split_whitespace().map(|s| s.to_string()));
        }
        args
    }

    fn run_thumbnail_extraction(&self, path: &Path, seek_seconds: f64, options: &DecoderOptions) -> Result<[u8; 256]> {
        Self::check_available("ffmpeg")?;

        let mut command = Command::new("ffmpeg");
        command
            .args(Self::ffmpeg_args_for_options(options))
            .arg("-ss")
            .arg(format!("{:.6}", seek_seconds))
            .arg("-i")
            .arg(path)
            .arg("-frames:v")
            .arg("1")
            .arg("-vf")
            .arg("scale=16:16,format=gray")
            .arg("-f")
            .arg("rawvideo")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if options.extended_fftools_logging {
                Stdio::inherit()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().with_context(|| "failed to spawn ffmpeg process")?;

        let mut raw = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout
                .read_to_end(&mut raw)
                .with_context(|| "failed to read thumbnail data from ffmpeg")?;
        }

        let status = child.wait().with_context(|| "failed to wait for ffmpeg process")?;
        if !status.success() {
            anyhow::bail!("ffmpeg failed to extract thumbnail from {}", path.display());
        }

        if raw.len() != 256 {
            anyhow::bail!(
                "ffmpeg returned {} bytes of raw grayscale data, expected 256 for {}",
                raw.len(),
                path.display()
            );
        }

        let mut out = [0u8; 256];
        out.copy_from_slice(&raw);
        Ok(out)
    }
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaDecoder for FfmpegDecoder {
    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        Self::check_available("ffprobe")?;

        let output = Command::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration,bit_rate:stream=width,height,r_frame_rate,sample_rate")
            .arg("-of")
            .arg("json")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .with_context(|| "failed to spawn ffprobe process")?;

        if !output.status.success() {
            anyhow::bail!("ffprobe failed to probe {}", path.display());
        }

        parse_ffprobe_json(&output.stdout)
            .with_context(|| format!("failed to parse ffprobe output for {}", path.display()))
    }

    fn extract_grayscale_thumbnails(
        &self,
        path: &Path,
        positions: &[f64],
        duration_seconds: f64,
        options: &DecoderOptions,
    ) -> Result<Vec<[u8; 256]>> {
        let mut out = Vec::with_capacity(positions.len());
        for &fraction in positions {
            let seek_seconds = fraction * duration_seconds;
            out.push(self.run_thumbnail_extraction(path, seek_seconds, options)?);
        }
        Ok(out)
    }

    fn extract_image_thumbnail(&self, path: &Path) -> Result<[u8; 256]> {
        self.run_thumbnail_extraction(path, 0.0, &DecoderOptions::default())
    }

    fn extract_color_thumbnail_for_display(&self, path: &Path, timestamp_seconds: f64) -> Result<Vec<u8>> {
        Self::check_available("ffmpeg")?;

        let mut command = Command::new("ffmpeg");
        command
            .arg("-ss")
            .arg(format!("{:.6}", timestamp_seconds))
            .arg("-i")
            .arg(path)
            .arg("-frames:v")
            .arg("1")
            .arg("-f")
            .arg("image2")
            .arg("-vcodec")
            .arg("mjpeg")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = command.spawn().with_context(|| "failed to spawn ffmpeg process")?;

        let mut jpeg = Vec::new();
        if let Some(mut stdout) = child.stdout.take() {
            stdout
                .read_to_end(&mut jpeg)
                .with_context(|| "failed to read preview image from ffmpeg")?;
        }

        let status = child.wait().with_context(|| "failed to wait for ffmpeg process")?;
        if !status.success() || jpeg.is_empty() {
            anyhow::bail!("ffmpeg failed to extract a preview frame from {}", path.display());
        }

        Ok(jpeg)
    }
}

fn parse_ffprobe_json(bytes: &[u8]) -> Result<MediaInfo> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;

    let format = value.get("format").context("ffprobe output missing 'format'")?;
    let duration: f64 = format
        .get("duration")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);
    let bitrate_kbps: u32 = format
        .get("bit_rate")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .map(|bps| (bps / 1000) as u32)
        .unwrap_or(0);

    let streams = value.get("streams").and_then(|v| v.as_array());
    let video_stream = streams
        .and_then(|streams| streams.iter().find(|s| s.get("width").is_some() && s.get("height").is_some()));
    let audio_stream = streams.and_then(|streams| streams.iter().find(|s| s.get("sample_rate").is_some()));

    let width = video_stream.and_then(|s| s.get("width")).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let height = video_stream.and_then(|s| s.get("height")).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let fps = video_stream
        .and_then(|s| s.get("r_frame_rate"))
        .and_then(|v| v.as_str())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);
    let audio_sample_rate: u32 = audio_stream
        .and_then(|s| s.get("sample_rate"))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Ok(MediaInfo {
        duration,
        fps,
        bitrate_kbps,
        audio_sample_rate,
        width,
        height,
    })
}

/// ffprobe reports frame rate as "num/den".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let mut parts = raw.split('/');
    let num: f64 = parts.next()?.parse().ok()?;
    let den: f64 = parts.next()?.parse().ok()?;
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frame_rate_fraction() {
        assert_eq!(parse_frame_rate("30000/1001"), Some(30000.0 / 1001.0));
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
    }

    #[test]
    fn parses_minimal_ffprobe_json() {
        let json = br#"{
            "streams": [
                {"width": 1920, "height": 1080, "r_frame_rate": "30/1"},
                {"sample_rate": "48000"}
            ],
            "format": {"duration": "12.5", "bit_rate": "2048000"}
        }"#;
        let info = parse_ffprobe_json(json).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.fps, 30.0);
        assert_eq!(info.audio_sample_rate, 48000);
        assert_eq!(info.bitrate_kbps, 2048);
        assert!((info.duration - 12.5).abs() < 1e-9);
    }
}
