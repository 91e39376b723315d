//! Frame source backed by the `ffprobe` / `ffmpeg` executables.

use super::source::{FrameSource, VideoHandle, VideoInfo};
use crate::core::ExtractError;
use crate::frame_extractor::Frame;
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FfmpegSource {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegSource {
    pub fn new() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }

    pub fn with_tools(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Self {
        let defaults = Self::new();
        Self {
            ffmpeg: ffmpeg.unwrap_or(defaults.ffmpeg),
            ffprobe: ffprobe.unwrap_or(defaults.ffprobe),
        }
    }

    pub fn probe(&self, reference: &str) -> Result<VideoInfo, ExtractError> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-select_streams")
            .arg("v:0")
            .arg("-show_entries")
            .arg("stream=width,height,r_frame_rate,avg_frame_rate,duration:format=duration")
            .arg("-of")
            .arg("json")
            .arg(reference)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                ExtractError::SourceUnavailable(format!(
                    "failed to run {}: {}",
                    self.ffprobe.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::SourceUnavailable(format!(
                "ffprobe could not open '{}': {}",
                reference,
                stderr.trim()
            )));
        }

        parse_probe_json(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FfmpegSource {
    fn open(&self, reference: &str) -> Result<Box<dyn VideoHandle>, ExtractError> {
        info!("🎬 Probing video: {}", reference);
        let info = self.probe(reference)?;
        info!(
            "✅ Video opened: {}x{} @ {:.2} fps, {:.1}s",
            info.width, info.height, info.frame_rate, info.duration_secs
        );

        Ok(Box::new(FfmpegVideo {
            reference: reference.to_string(),
            ffmpeg: self.ffmpeg.clone(),
            info,
            decoded: 0,
        }))
    }
}

struct FfmpegVideo {
    reference: String,
    ffmpeg: PathBuf,
    info: VideoInfo,
    decoded: u64,
}

impl VideoHandle for FfmpegVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame_at(&mut self, timestamp: f64) -> Result<Frame, ExtractError> {
        if timestamp > self.info.duration_secs {
            return Err(ExtractError::SeekOutOfRange {
                timestamp,
                duration: self.info.duration_secs,
            });
        }

        // 输入端 seek，输出固定为探测到的分辨率
        let output = Command::new(&self.ffmpeg)
            .arg("-v")
            .arg("error")
            .arg("-nostdin")
            .arg("-ss")
            .arg(format!("{:.3}", timestamp))
            .arg("-i")
            .arg(&self.reference)
            .arg("-frames:v")
            .arg("1")
            .arg("-vf")
            .arg(format!("scale={}:{}", self.info.width, self.info.height))
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgba")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ExtractError::Decode {
                timestamp,
                reason: format!("failed to run {}: {}", self.ffmpeg.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("❌ ffmpeg failed at {:.3}s: {}", timestamp, stderr.trim());
            return Err(ExtractError::Decode {
                timestamp,
                reason: stderr.trim().to_string(),
            });
        }

        if output.stdout.is_empty() {
            // seek 落在最后一帧之后
            return Err(ExtractError::SeekOutOfRange {
                timestamp,
                duration: self.info.duration_secs,
            });
        }

        let frame = rawvideo_frame(&self.info, output.stdout, timestamp, self.decoded)?;
        self.decoded += 1;
        debug!("🖼️ Decoded frame {} at {:.3}s", frame.frame_number, timestamp);
        Ok(frame)
    }
}

impl Drop for FfmpegVideo {
    fn drop(&mut self) {
        info!(
            "🗑️ FfmpegVideo: released '{}' after {} frames",
            self.reference, self.decoded
        );
    }
}

/// Wraps one RGBA frame read from ffmpeg's stdout. Any size other than exactly
/// one frame means the decode went wrong.
pub(crate) fn rawvideo_frame(
    info: &VideoInfo,
    data: Vec<u8>,
    timestamp: f64,
    frame_number: u64,
) -> Result<Frame, ExtractError> {
    let expected = info.width as usize * info.height as usize * 4;
    if data.len() != expected {
        warn!(
            "⚠️ ffmpeg returned {} bytes at {:.3}s, expected {}",
            data.len(),
            timestamp,
            expected
        );
        return Err(ExtractError::Decode {
            timestamp,
            reason: format!("expected {} bytes of rgba, got {}", expected, data.len()),
        });
    }

    Frame::from_rgba(
        info.width,
        info.height,
        data,
        Duration::from_secs_f64(timestamp),
        frame_number,
    )
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

pub(crate) fn parse_probe_json(json: &str) -> Result<VideoInfo, ExtractError> {
    let probe: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| ExtractError::SourceUnavailable(format!("unreadable ffprobe output: {}", e)))?;

    let stream = probe
        .streams
        .first()
        .ok_or_else(|| ExtractError::SourceUnavailable("no video stream found".into()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(ExtractError::SourceUnavailable(
                "video stream has no frame size".into(),
            ))
        }
    };

    let duration_secs = stream
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| ExtractError::SourceUnavailable("video duration is unknown".into()))?;

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    Ok(VideoInfo {
        width,
        height,
        frame_rate,
        duration_secs,
    })
}

/// `"30000/1001"` → 29.97; `"0/0"` and garbage → `None`.
pub(crate) fn parse_frame_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}
