//! 视频帧源 - frame sources the engine samples from.

use crate::core::ExtractError;
use crate::frame_extractor::Frame;
use log::info;
use serde::Serialize;
use std::time::Duration;

/// Stream properties known once a video is opened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub duration_secs: f64,
}

/// An open, seekable video. Dropping the handle releases the decoder.
pub trait VideoHandle {
    fn info(&self) -> &VideoInfo;

    fn duration(&self) -> f64 {
        self.info().duration_secs
    }

    /// The frame visible at `timestamp` seconds.
    ///
    /// Returns `SeekOutOfRange` once `timestamp` is past the last frame.
    fn frame_at(&mut self, timestamp: f64) -> Result<Frame, ExtractError>;
}

pub trait FrameSource: Send {
    fn open(&self, reference: &str) -> Result<Box<dyn VideoHandle>, ExtractError>;
}

type FrameScript = dyn Fn(f64) -> Frame + Send + Sync;

/// In-memory source: a fixed duration and a closure producing the frame for a
/// timestamp. Every reference opens the same scripted stream.
pub struct ScriptedSource {
    info: VideoInfo,
    script: std::sync::Arc<FrameScript>,
}

impl ScriptedSource {
    pub fn new<F>(width: u32, height: u32, duration_secs: f64, script: F) -> Self
    where
        F: Fn(f64) -> Frame + Send + Sync + 'static,
    {
        Self {
            info: VideoInfo {
                width,
                height,
                frame_rate: 30.0,
                duration_secs,
            },
            script: std::sync::Arc::new(script),
        }
    }
}

impl FrameSource for ScriptedSource {
    fn open(&self, reference: &str) -> Result<Box<dyn VideoHandle>, ExtractError> {
        info!("🎞️ Opening scripted video '{}' ({:.1}s)", reference, self.info.duration_secs);
        Ok(Box::new(ScriptedVideo {
            info: self.info.clone(),
            script: self.script.clone(),
            reads: 0,
        }))
    }
}

struct ScriptedVideo {
    info: VideoInfo,
    script: std::sync::Arc<FrameScript>,
    reads: u64,
}

impl VideoHandle for ScriptedVideo {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn frame_at(&mut self, timestamp: f64) -> Result<Frame, ExtractError> {
        if timestamp >= self.info.duration_secs {
            return Err(ExtractError::SeekOutOfRange {
                timestamp,
                duration: self.info.duration_secs,
            });
        }

        let mut frame = (self.script)(timestamp);
        frame.timestamp = Duration::from_secs_f64(timestamp);
        frame.frame_number = self.reads;
        self.reads += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(duration: f64) -> ScriptedSource {
        ScriptedSource::new(4, 4, duration, |t| {
            let v = if t < 10.0 { 0 } else { 255 };
            Frame::solid(4, 4, [v, v, v, 255], Duration::ZERO)
        })
    }

    #[test]
    fn test_open_twice_same_duration() {
        let src = source(20.0);
        let a = src.open("lecture.mp4").unwrap();
        let b = src.open("lecture.mp4").unwrap();
        assert_eq!(a.duration(), b.duration());
        assert_eq!(a.info(), b.info());
    }

    #[test]
    fn test_frame_at_stamps_timestamp() {
        let mut video = source(20.0).open("x").unwrap();
        let frame = video.frame_at(12.5).unwrap();
        assert_eq!(frame.timestamp, Duration::from_millis(12_500));
        assert_eq!(frame.data[0], 255);
        assert_eq!(frame.frame_number, 0);
        assert_eq!(video.frame_at(1.0).unwrap().frame_number, 1);
    }

    #[test]
    fn test_seek_past_end() {
        let mut video = source(3.0).open("x").unwrap();
        assert!(video.frame_at(0.0).is_ok());
        let err = video.frame_at(5.0).unwrap_err();
        assert!(matches!(err, ExtractError::SeekOutOfRange { .. }));
        assert!(!err.is_fatal());
    }
}
