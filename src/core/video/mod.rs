pub mod ffmpeg;
pub mod sink;
pub mod source;

pub use ffmpeg::FfmpegSource;
pub use sink::{list_slides, ImageDirSink, SlideFormat, SlideSink};
pub use source::{FrameSource, ScriptedSource, VideoHandle, VideoInfo};
