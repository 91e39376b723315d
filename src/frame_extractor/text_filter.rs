//! Optional OCR-based duplicate signal.
//!
//! Two slides with the same text but a moving cursor or a drawn annotation are
//! visually different enough to pass the pixel threshold. When a recognizer is
//! configured, the engine also compares the normalized slide text and rejects
//! a candidate whose text matches the last accepted slide.

use super::frame::Frame;
use crate::core::ExtractError;
use image::ImageOutputFormat;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, frame: &Frame) -> Result<String, ExtractError>;
}

/// Case folding plus whitespace collapsing.
pub fn normalize_text(text: &str) -> String {
    WHITESPACE
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

/// Runs the `tesseract` executable on one frame, piping a PNG through stdin.
pub struct TesseractRecognizer {
    binary: PathBuf,
    language: Option<String>,
}

impl TesseractRecognizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    fn encode_png(frame: &Frame) -> Result<Vec<u8>, ExtractError> {
        let img = frame
            .to_rgba_image()
            .ok_or_else(|| ExtractError::Recognition("frame buffer does not match its dimensions".into()))?;
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageOutputFormat::Png)
            .map_err(|e| ExtractError::Recognition(e.to_string()))?;
        Ok(buffer.into_inner())
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, frame: &Frame) -> Result<String, ExtractError> {
        let png = Self::encode_png(frame)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin").arg("stdout");
        if let Some(lang) = &self.language {
            cmd.arg("-l").arg(lang);
        }

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ExtractError::Recognition(format!("failed to start {}: {}", self.binary.display(), e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&png) {
                drop(stdin);
                // 不回收会留下僵尸进程
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExtractError::Recognition(format!(
                    "failed to feed {}: {}",
                    self.binary.display(),
                    e
                )));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| ExtractError::Recognition(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Remembers the normalized text of the last accepted slide.
pub struct TextDedupFilter {
    recognizer: Box<dyn TextRecognizer>,
    last_text: Option<String>,
}

impl TextDedupFilter {
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            recognizer,
            last_text: None,
        }
    }

    /// Normalized text of `frame`, or `None` when recognition failed or found
    /// nothing. Failures are logged and never abort the run.
    pub fn read(&self, frame: &Frame) -> Option<String> {
        match self.recognizer.recognize(frame) {
            Ok(raw) => {
                let text = normalize_text(&raw);
                debug!("🔤 OCR at {:.2}s: {} chars", frame.timestamp_secs(), text.len());
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            Err(e) => {
                warn!("⚠️ OCR skipped at {:.2}s: {}", frame.timestamp_secs(), e);
                None
            }
        }
    }

    /// Empty text never matches, so image-only slides are judged on pixels alone.
    pub fn matches_last(&self, text: Option<&str>) -> bool {
        match (text, self.last_text.as_deref()) {
            (Some(current), Some(last)) => current == last,
            _ => false,
        }
    }

    pub fn remember(&mut self, text: Option<String>) {
        self.last_text = text;
    }

    pub fn reset(&mut self) {
        self.last_text = None;
    }
}

/// Recognizer returning scripted text per sample number; for tests and demos.
pub struct MockTextRecognizer {
    script: Box<dyn Fn(u64) -> Option<String> + Send + Sync>,
}

impl MockTextRecognizer {
    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(pattern),
        }
    }
}

impl TextRecognizer for MockTextRecognizer {
    fn recognize(&self, frame: &Frame) -> Result<String, ExtractError> {
        (self.script)(frame.frame_number)
            .ok_or_else(|| ExtractError::Recognition(format!("no text scripted for {}", frame.frame_number)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(frame_number: u64) -> Frame {
        let mut f = Frame::solid(8, 8, [255, 255, 255, 255], Duration::ZERO);
        f.frame_number = frame_number;
        f
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hello\n\tWORLD  "), "hello world");
        assert_eq!(normalize_text("a  b\r\nc"), "a b c");
        assert_eq!(normalize_text(" \n "), "");
    }

    #[test]
    fn test_filter_matches_after_normalization() {
        let recognizer = MockTextRecognizer::with_pattern(|n| match n {
            0 => Some("Intro to Rust\n".to_string()),
            1 => Some("intro   to rust".to_string()),
            _ => Some("Ownership".to_string()),
        });
        let mut filter = TextDedupFilter::new(Box::new(recognizer));

        let first = filter.read(&frame(0));
        filter.remember(first);

        let second = filter.read(&frame(1));
        assert!(filter.matches_last(second.as_deref()));

        let third = filter.read(&frame(2));
        assert!(!filter.matches_last(third.as_deref()));
    }

    #[test]
    fn test_empty_or_failed_text_never_matches() {
        let recognizer = MockTextRecognizer::with_pattern(|n| if n == 0 { Some("   ".into()) } else { None });
        let mut filter = TextDedupFilter::new(Box::new(recognizer));

        let blank = filter.read(&frame(0));
        assert!(blank.is_none());
        filter.remember(blank);

        let failed = filter.read(&frame(1));
        assert!(failed.is_none());
        assert!(!filter.matches_last(failed.as_deref()));
    }

    #[test]
    fn test_recognizer_that_ignores_stdin() {
        // `true` exits without reading, so writing a large PNG hits a closed pipe
        let binary = std::path::Path::new("/bin/true");
        if !binary.exists() {
            eprintln!("Skipping test: /bin/true not found");
            return;
        }

        let (w, h) = (1024u32, 1024u32);
        let mut seed = 0x2545_f491_u32;
        let data: Vec<u8> = (0..w * h * 4)
            .map(|_| {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                (seed >> 24) as u8
            })
            .collect();
        let noisy = Frame::from_rgba(w, h, data, Duration::ZERO, 0).unwrap();

        let recognizer = TesseractRecognizer::new(binary);
        let err = recognizer.recognize(&noisy).unwrap_err();
        assert!(matches!(err, ExtractError::Recognition(_)));
    }

    #[test]
    fn test_missing_tesseract_binary() {
        let recognizer = TesseractRecognizer::new("/nonexistent/tesseract-binary");
        let err = recognizer.recognize(&frame(0)).unwrap_err();
        assert!(matches!(err, ExtractError::Recognition(_)));
    }
}
