//! 后台幻灯片提取任务

use crate::core::video::{FfmpegSource, FrameSource, ImageDirSink, SlideFormat};
use crate::core::{AppConfig, ExtractError, OcrSettings};
use crate::frame_extractor::{
    CancellationToken, ComparatorKind, ExtractionConfig, ExtractionOutcome, ExtractionProgress,
    ExtractionResult, SlideExtractor, TesseractRecognizer, TextDedupFilter,
};
use log::{info, warn};
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;

/// Everything needed to run one extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub video: String,
    pub interval_secs: f64,
    pub similarity_threshold: f64,
    pub output_directory: PathBuf,
    pub image_format: SlideFormat,
    pub jpeg_quality: u8,
    pub overwrite: bool,
    pub comparator: ComparatorKind,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub ocr: Option<OcrSettings>,
}

impl ExtractionRequest {
    pub fn new(video: impl Into<String>) -> Self {
        Self::from_config(video, &AppConfig::default())
    }

    pub fn from_config(video: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            video: video.into(),
            interval_secs: config.interval_secs,
            similarity_threshold: config.similarity_threshold,
            output_directory: config.output_directory.clone(),
            image_format: config.image_format,
            jpeg_quality: config.jpeg_quality,
            overwrite: config.overwrite_existing,
            comparator: config.comparator,
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            ocr: config.ocr.enabled.then(|| config.ocr.clone()),
        }
    }

    pub fn engine_config(&self) -> Result<ExtractionConfig, ExtractError> {
        ExtractionConfig::new(
            self.video.clone(),
            self.interval_secs,
            self.similarity_threshold,
        )
    }

    /// Remote references are streamed by ffmpeg, so the UI shows a download phase.
    pub fn is_remote(&self) -> bool {
        let video = self.video.trim_start().to_ascii_lowercase();
        video.starts_with("http://") || video.starts_with("https://")
    }

    fn frame_source(&self) -> FfmpegSource {
        FfmpegSource::with_tools(self.ffmpeg_path.clone(), self.ffprobe_path.clone())
    }

    fn sink(&self) -> ImageDirSink {
        ImageDirSink::new(&self.output_directory)
            .with_format(self.image_format)
            .with_jpeg_quality(self.jpeg_quality)
            .overwrite(self.overwrite)
    }

    fn text_filter(&self) -> Option<TextDedupFilter> {
        self.ocr.as_ref().map(|ocr| {
            let mut recognizer = TesseractRecognizer::new(&ocr.tesseract_path);
            if let Some(language) = &ocr.language {
                recognizer = recognizer.with_language(language.clone());
            }
            TextDedupFilter::new(Box::new(recognizer))
        })
    }
}

/// Status line shown to the user.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ExtractionStatus {
    #[default]
    Ready,
    Downloading,
    Extracting,
    Complete,
    Failed(String),
    Cancelled,
}

impl ExtractionStatus {
    pub fn from_result(result: &ExtractionResult) -> Self {
        match result.outcome {
            ExtractionOutcome::Completed => ExtractionStatus::Complete,
            ExtractionOutcome::Cancelled => ExtractionStatus::Cancelled,
            ExtractionOutcome::Failed => ExtractionStatus::Failed(
                result
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ExtractionStatus::Complete | ExtractionStatus::Failed(_) | ExtractionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionStatus::Ready => write!(f, "Ready"),
            ExtractionStatus::Downloading => write!(f, "Downloading video..."),
            ExtractionStatus::Extracting => write!(f, "Extracting slides..."),
            ExtractionStatus::Complete => write!(f, "Extraction Complete!"),
            ExtractionStatus::Failed(reason) => write!(f, "Extraction Failed! {}", reason),
            ExtractionStatus::Cancelled => write!(f, "Extraction Cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Status(ExtractionStatus),
    Progress(ExtractionProgress),
    Finished {
        outcome: ExtractionOutcome,
        slides_written: usize,
    },
}

/// Runs one extraction on the calling thread, reporting through `events`.
///
/// An invalid request fails before any I/O: the source is not opened and the
/// output directory is not created.
pub fn run_extraction(
    request: &ExtractionRequest,
    source: &dyn FrameSource,
    cancel: &CancellationToken,
    events: &Sender<TaskEvent>,
) -> ExtractionResult {
    let result = match request.engine_config() {
        Ok(config) => {
            // 远程视频在第一帧解码前都算下载阶段
            let mut downloading = request.is_remote();
            let status = if downloading {
                ExtractionStatus::Downloading
            } else {
                ExtractionStatus::Extracting
            };
            let _ = events.send(TaskEvent::Status(status));

            let progress_events = events.clone();
            let mut extractor = SlideExtractor::new(config)
                .with_comparator(request.comparator.build())
                .on_progress(move |progress| {
                    if downloading {
                        downloading = false;
                        let _ = progress_events.send(TaskEvent::Status(ExtractionStatus::Extracting));
                    }
                    let _ = progress_events.send(TaskEvent::Progress(*progress));
                });
            if let Some(filter) = request.text_filter() {
                extractor = extractor.with_text_filter(filter);
            }

            let mut sink = request.sink();
            extractor.run(source, &mut sink, cancel)
        }
        Err(e) => {
            warn!("⚠️ Rejected extraction request: {}", e);
            ExtractionResult::rejected(e)
        }
    };

    let _ = events.send(TaskEvent::Status(ExtractionStatus::from_result(&result)));
    let _ = events.send(TaskEvent::Finished {
        outcome: result.outcome,
        slides_written: result.slides_written(),
    });
    result
}

/// 后台提取任务句柄
///
/// The run happens on a worker thread; the caller polls events or blocks on
/// [`ExtractionTask::wait`]. Dropping the handle cancels the run.
pub struct ExtractionTask {
    cancel: CancellationToken,
    events: Receiver<TaskEvent>,
    worker: Option<JoinHandle<ExtractionResult>>,
}

impl ExtractionTask {
    /// Starts an extraction reading the video through ffmpeg.
    pub fn spawn(request: ExtractionRequest) -> Self {
        let source = request.frame_source();
        Self::spawn_with(request, Box::new(source))
    }

    pub fn spawn_with(request: ExtractionRequest, source: Box<dyn FrameSource>) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel();

        let token = cancel.clone();
        let worker = std::thread::spawn(move || {
            run_extraction(&request, source.as_ref(), &token, &tx)
        });

        info!("🎬 ExtractionTask: started");
        Self {
            cancel,
            events: rx,
            worker: Some(worker),
        }
    }

    /// Requests cooperative cancellation; the worker stops before the next sample.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn try_next_event(&self) -> Option<TaskEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocks until the next event; `None` once the worker is gone and the
    /// channel is drained.
    pub fn next_event(&self) -> Option<TaskEvent> {
        self.events.recv().ok()
    }

    pub fn wait(mut self) -> ExtractionResult {
        match self.worker.take() {
            Some(worker) => worker.join().unwrap_or_else(|_| {
                ExtractionResult::rejected(ExtractError::Worker("worker thread panicked".into()))
            }),
            None => ExtractionResult::rejected(ExtractError::Worker("task already joined".into())),
        }
    }
}

impl Drop for ExtractionTask {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.cancel.cancel();
            let _ = worker.join();
        }
        info!("🗑️ ExtractionTask: released");
    }
}
