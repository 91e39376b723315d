pub mod config;
pub mod error;
pub mod video;

pub use config::{AppConfig, OcrSettings};
pub use error::ExtractError;
