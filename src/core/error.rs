use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while extracting slides.
///
/// `SeekOutOfRange` is how a frame source reports the end of the stream; the
/// engine turns it into normal completion and never surfaces it to callers.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("seek to {timestamp:.3}s is past the end of the stream ({duration:.3}s)")]
    SeekOutOfRange { timestamp: f64, duration: f64 },
    #[error("failed to decode frame at {timestamp:.3}s: {reason}")]
    Decode { timestamp: f64, reason: String },
    #[error("frame dimensions differ: {left:?} vs {right:?}")]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },
    #[error("failed to write {}: {reason}", .path.display())]
    IoWrite { path: PathBuf, reason: String },
    #[error("text recognition failed: {0}")]
    Recognition(String),
    #[error("extraction worker stopped unexpectedly: {0}")]
    Worker(String),
}

impl ExtractError {
    pub(crate) fn io_write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        ExtractError::IoWrite {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Fatal errors end the run; the rest are handled inside the engine.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ExtractError::SeekOutOfRange { .. } | ExtractError::Recognition(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(ExtractError::InvalidConfig("x".into()).is_fatal());
        assert!(ExtractError::io_write("/tmp/slides", "denied").is_fatal());
        assert!(!ExtractError::Recognition("no tesseract".into()).is_fatal());
        assert!(!ExtractError::SeekOutOfRange {
            timestamp: 25.0,
            duration: 20.0
        }
        .is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = ExtractError::io_write("/tmp/slides/slide_0001.png", "disk full");
        assert_eq!(
            err.to_string(),
            "failed to write /tmp/slides/slide_0001.png: disk full"
        );

        let err = ExtractError::DimensionMismatch {
            left: (640, 360),
            right: (1280, 720),
        };
        assert_eq!(
            err.to_string(),
            "frame dimensions differ: (640, 360) vs (1280, 720)"
        );
    }
}
