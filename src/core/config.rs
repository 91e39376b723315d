use crate::core::video::SlideFormat;
use crate::frame_extractor::ComparatorKind;
use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 持久化的应用配置，命令行参数会覆盖这里的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub interval_secs: f64,
    pub similarity_threshold: f64,
    pub output_directory: PathBuf,
    pub image_format: SlideFormat,
    pub jpeg_quality: u8,
    pub overwrite_existing: bool,
    pub comparator: ComparatorKind,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub ocr: OcrSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5.0,
            similarity_threshold: 0.9,
            output_directory: PathBuf::from("slides"),
            image_format: SlideFormat::Png,
            jpeg_quality: 90,
            overwrite_existing: false,
            comparator: ComparatorKind::Structural,
            ffmpeg_path: None,
            ffprobe_path: None,
            ocr: OcrSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub enabled: bool,
    pub tesseract_path: PathBuf,
    pub language: Option<String>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            tesseract_path: PathBuf::from("tesseract"),
            language: None,
        }
    }
}

impl AppConfig {
    /// Loads `path`, or the per-user config file when `path` is `None`.
    ///
    /// A missing per-user file yields the defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let default_path = Self::config_path();
                if default_path.exists() {
                    Self::load_from(&default_path)
                } else {
                    info!("No config file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        let config = serde_json::from_str::<Self>(&content)
            .with_context(|| format!("Invalid config file at {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file at {}", path.display()))?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("slide-extractor")
            .join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.interval_secs, 5.0);
        assert_eq!(config.similarity_threshold, 0.9);
        assert_eq!(config.output_directory, PathBuf::from("slides"));
        assert_eq!(config.image_format, SlideFormat::Png);
        assert_eq!(config.comparator, ComparatorKind::Structural);
        assert!(!config.overwrite_existing);
        assert!(!config.ocr.enabled);
    }

    #[test]
    fn test_app_config_serialization() {
        let mut config = AppConfig::default();
        config.interval_secs = 2.5;
        config.image_format = SlideFormat::Jpeg;
        config.comparator = ComparatorKind::PerceptualHash;
        config.ffmpeg_path = Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        config.ocr.enabled = true;
        config.ocr.language = Some("eng".to_string());

        let serialized = serde_json::to_string(&config).expect("Failed to serialize config");
        assert!(serialized.contains("\"phash\""));
        assert!(serialized.contains("\"jpeg\""));

        let deserialized: AppConfig =
            serde_json::from_str(&serialized).expect("Failed to deserialize config");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "similarity_threshold": 0.8, "ocr": { "enabled": true } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.interval_secs, 5.0);
        assert!(config.ocr.enabled);
        assert_eq!(config.ocr.tesseract_path, PathBuf::from("tesseract"));
    }

    #[test]
    fn test_save_and_load_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.output_directory = PathBuf::from("/tmp/lecture-slides");
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("absent.json"))).is_err());
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
