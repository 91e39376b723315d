//! Slide persistence: one image file per accepted slide.

use crate::core::ExtractError;
use crate::frame_extractor::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

static SLIDE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^slide_\d+\.(png|jpe?g)$").expect("static regex"));

const MIN_INDEX_DIGITS: usize = 4;

pub trait SlideSink {
    /// Called once before the first write. `max_slides` bounds how many slides
    /// the run can produce.
    fn prepare(&mut self, max_slides: u64) -> Result<(), ExtractError>;

    fn write(&mut self, index: u64, frame: &Frame) -> Result<PathBuf, ExtractError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SlideFormat {
    #[default]
    Png,
    Jpeg,
}

impl SlideFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SlideFormat::Png => "png",
            SlideFormat::Jpeg => "jpg",
        }
    }
}

/// Writes `slide_0000.png`, `slide_0001.png`, … into one directory.
pub struct ImageDirSink {
    dir: PathBuf,
    format: SlideFormat,
    jpeg_quality: u8,
    overwrite: bool,
    digits: usize,
}

impl ImageDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: SlideFormat::Png,
            jpeg_quality: 90,
            overwrite: false,
            digits: MIN_INDEX_DIGITS,
        }
    }

    pub fn with_format(mut self, format: SlideFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Replace slide files left by an earlier run instead of refusing the directory.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, index: u64) -> String {
        format!(
            "slide_{:0width$}.{}",
            index,
            self.format.extension(),
            width = self.digits
        )
    }

    fn stale_slides(&self) -> Result<Vec<PathBuf>, ExtractError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| ExtractError::io_write(&self.dir, e))?;
        let mut stale = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ExtractError::io_write(&self.dir, e))?;
            let path = entry.path();
            let is_slide = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| SLIDE_FILE.is_match(n));
            if is_slide && path.is_file() {
                stale.push(path);
            }
        }
        stale.sort();
        Ok(stale)
    }

    fn encode(&self, path: &Path, frame: &Frame) -> Result<(), ExtractError> {
        match self.format {
            SlideFormat::Png => image::save_buffer_with_format(
                path,
                &frame.data,
                frame.width,
                frame.height,
                ColorType::Rgba8,
                ImageFormat::Png,
            )
            .map_err(|e| ExtractError::io_write(path, e)),
            SlideFormat::Jpeg => {
                let rgba = frame.to_rgba_image().ok_or_else(|| {
                    ExtractError::io_write(path, "frame buffer does not match its dimensions")
                })?;
                let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();
                let file = File::create(path).map_err(|e| ExtractError::io_write(path, e))?;
                let mut writer = BufWriter::new(file);
                JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality)
                    .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                    .map_err(|e| ExtractError::io_write(path, e))
            }
        }
    }
}

impl SlideSink for ImageDirSink {
    fn prepare(&mut self, max_slides: u64) -> Result<(), ExtractError> {
        fs::create_dir_all(&self.dir).map_err(|e| ExtractError::io_write(&self.dir, e))?;

        let largest = max_slides.saturating_sub(1);
        self.digits = largest.to_string().len().max(MIN_INDEX_DIGITS);

        let stale = self.stale_slides()?;
        if !stale.is_empty() {
            if !self.overwrite {
                return Err(ExtractError::io_write(
                    &self.dir,
                    format!(
                        "directory already holds {} slide files from a previous run; \
                         use a fresh directory or enable overwrite",
                        stale.len()
                    ),
                ));
            }
            warn!(
                "♻️ Removing {} slides from a previous run in {}",
                stale.len(),
                self.dir.display()
            );
            for path in stale {
                fs::remove_file(&path).map_err(|e| ExtractError::io_write(&path, e))?;
            }
        }

        info!(
            "📂 Writing slides to {} ({} digit names)",
            self.dir.display(),
            self.digits
        );
        Ok(())
    }

    fn write(&mut self, index: u64, frame: &Frame) -> Result<PathBuf, ExtractError> {
        let path = self.dir.join(self.file_name(index));
        self.encode(&path, frame)?;
        debug!("💾 Saved {}", path.display());
        Ok(path)
    }
}

/// Slide files of `dir` in presentation order (lexicographic by name).
pub fn list_slides(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut slides: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| SLIDE_FILE.is_match(n))
        })
        .collect();

    slides.sort();
    Ok(slides)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(v: u8) -> Frame {
        Frame::solid(16, 8, [v, v / 2, 255 - v, 255], Duration::ZERO)
    }

    #[test]
    fn test_creates_directory_and_writes_png() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("slides");
        let mut sink = ImageDirSink::new(&dir);
        sink.prepare(3).unwrap();

        let path = sink.write(0, &frame(10)).unwrap();
        assert_eq!(path, dir.join("slide_0000.png"));

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (16, 8));
        assert_eq!(decoded.as_raw(), &frame(10).data);
    }

    #[test]
    fn test_prepare_is_idempotent_on_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = ImageDirSink::new(tmp.path());
        sink.prepare(1).unwrap();
        sink.prepare(1).unwrap();
    }

    #[test]
    fn test_refuses_previous_run() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("slide_0000.png"), b"old").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"keep").unwrap();

        let mut sink = ImageDirSink::new(tmp.path());
        let err = sink.prepare(5).unwrap_err();
        assert!(matches!(err, ExtractError::IoWrite { .. }));
    }

    #[test]
    fn test_overwrite_clears_stale_slides_only() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("slide_0000.png"), b"old").unwrap();
        fs::write(tmp.path().join("slide_0007.jpg"), b"old").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"keep").unwrap();

        let mut sink = ImageDirSink::new(tmp.path()).overwrite(true);
        sink.prepare(5).unwrap();

        assert!(list_slides(tmp.path()).unwrap().is_empty());
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_names_sort_in_presentation_order() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = ImageDirSink::new(tmp.path());
        sink.prepare(20_000).unwrap();
        assert_eq!(sink.file_name(7), "slide_00007.png");

        for index in [0u64, 9, 10, 11, 100, 10_000] {
            sink.write(index, &frame(index as u8)).unwrap();
        }

        let names: Vec<String> = list_slides(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "slide_00000.png",
                "slide_00009.png",
                "slide_00010.png",
                "slide_00011.png",
                "slide_00100.png",
                "slide_10000.png",
            ]
        );
    }

    #[test]
    fn test_jpeg_output() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = ImageDirSink::new(tmp.path())
            .with_format(SlideFormat::Jpeg)
            .with_jpeg_quality(80);
        sink.prepare(1).unwrap();

        let path = sink.write(0, &frame(128)).unwrap();
        assert_eq!(path.extension().unwrap(), "jpg");
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut sink = ImageDirSink::new(tmp.path().join("never-created"));
        let err = sink.write(0, &frame(1)).unwrap_err();
        assert!(matches!(err, ExtractError::IoWrite { .. }));
    }
}
