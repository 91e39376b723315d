use crate::core::video::{FrameSource, SlideSink, VideoHandle};
use crate::core::ExtractError;
use crate::frame_extractor::cancel::CancellationToken;
use crate::frame_extractor::comparator::{FrameComparator, StructuralComparator};
use crate::frame_extractor::frame::Frame;
use crate::frame_extractor::state_machine::{
    ExtractionState, FrameEvent, RejectReason, StateAction, StateMachine,
};
use crate::frame_extractor::text_filter::TextDedupFilter;
use log::{debug, error, info, warn};
use std::path::PathBuf;

/// Parameters of one extraction run. Only constructible through [`ExtractionConfig::new`],
/// so a value of this type is always valid.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    video: String,
    interval_secs: f64,
    similarity_threshold: f64,
}

impl ExtractionConfig {
    pub fn new(
        video: impl Into<String>,
        interval_secs: f64,
        similarity_threshold: f64,
    ) -> Result<Self, ExtractError> {
        let video = video.into();
        if video.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("video reference is empty".into()));
        }
        if !interval_secs.is_finite() || interval_secs <= 0.0 {
            return Err(ExtractError::InvalidConfig(format!(
                "interval must be a positive number of seconds, got {}",
                interval_secs
            )));
        }
        if !similarity_threshold.is_finite() || !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(ExtractError::InvalidConfig(format!(
                "similarity threshold must lie in [0, 1], got {}",
                similarity_threshold
            )));
        }

        Ok(Self {
            video,
            interval_secs,
            similarity_threshold,
        })
    }

    pub fn video(&self) -> &str {
        &self.video
    }

    pub fn interval_secs(&self) -> f64 {
        self.interval_secs
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    /// Upper bound on candidates (and therefore slides) for a stream of `duration` seconds.
    pub fn max_candidates(&self, duration: f64) -> u64 {
        if !duration.is_finite() || duration < 0.0 {
            return 1;
        }
        let steps = (duration / self.interval_secs).floor();
        if !steps.is_finite() {
            return u64::MAX;
        }
        // float → int casts saturate
        (steps as u64).saturating_add(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlideRecord {
    pub index: u64,
    pub timestamp_secs: f64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub struct ExtractionResult {
    pub outcome: ExtractionOutcome,
    pub slides: Vec<SlideRecord>,
    pub samples_evaluated: u64,
    pub error: Option<ExtractError>,
}

impl ExtractionResult {
    /// A run rejected before any I/O happened.
    pub fn rejected(error: ExtractError) -> Self {
        Self {
            outcome: ExtractionOutcome::Failed,
            slides: Vec::new(),
            samples_evaluated: 0,
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.outcome == ExtractionOutcome::Completed
    }

    pub fn slides_written(&self) -> usize {
        self.slides.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractionProgress {
    pub timestamp_secs: f64,
    pub duration_secs: f64,
    pub samples_evaluated: u64,
    pub slides_written: u64,
}

impl ExtractionProgress {
    pub fn fraction(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 1.0;
        }
        (self.timestamp_secs / self.duration_secs).clamp(0.0, 1.0)
    }
}

type ProgressCallback = Box<dyn FnMut(&ExtractionProgress) + Send>;

/// 幻灯片提取引擎
///
/// Samples the video every `interval` seconds and keeps a frame only when it
/// differs enough from the last kept one. The loop is strictly sequential;
/// only the most recently accepted frame is retained for comparison.
pub struct SlideExtractor {
    config: ExtractionConfig,
    comparator: Box<dyn FrameComparator>,
    text_filter: Option<TextDedupFilter>,
    progress: Option<ProgressCallback>,
}

/// Mutable state of one `run`.
struct RunState {
    machine: StateMachine,
    last_slide: Option<Frame>,
    slides: Vec<SlideRecord>,
}

impl SlideExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self {
            config,
            comparator: Box::new(StructuralComparator::new()),
            text_filter: None,
            progress: None,
        }
    }

    pub fn with_comparator(mut self, comparator: Box<dyn FrameComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    pub fn with_text_filter(mut self, filter: TextDedupFilter) -> Self {
        self.text_filter = Some(filter);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&ExtractionProgress) + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Runs one extraction to a terminal state.
    ///
    /// The video handle is dropped before this returns on every path. Slides
    /// written before a failure or cancellation stay on disk.
    pub fn run(
        &mut self,
        source: &dyn FrameSource,
        sink: &mut dyn SlideSink,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        info!(
            "🎬 Extracting slides from '{}' every {}s (threshold {}, comparator {})",
            self.config.video,
            self.config.interval_secs,
            self.config.similarity_threshold,
            self.comparator.name()
        );

        if let Some(filter) = self.text_filter.as_mut() {
            filter.reset();
        }

        let mut run = RunState {
            machine: StateMachine::new(self.config.similarity_threshold),
            last_slide: None,
            slides: Vec::new(),
        };

        let error = match self.drive(source, sink, cancel, &mut run) {
            Ok(()) => None,
            Err(e) => {
                error!("❌ Extraction failed: {}", e);
                run.machine.process(FrameEvent::Fault);
                Some(e)
            }
        };

        let outcome = match run.machine.current_state() {
            ExtractionState::Done { .. } => ExtractionOutcome::Completed,
            ExtractionState::Cancelled { .. } => ExtractionOutcome::Cancelled,
            _ => ExtractionOutcome::Failed,
        };

        info!(
            "🏁 Extraction {:?}: {} slides from {} samples",
            outcome,
            run.slides.len(),
            run.machine.frame_count()
        );

        ExtractionResult {
            outcome,
            slides: run.slides,
            samples_evaluated: run.machine.frame_count(),
            error,
        }
    }

    fn drive(
        &mut self,
        source: &dyn FrameSource,
        sink: &mut dyn SlideSink,
        cancel: &CancellationToken,
        run: &mut RunState,
    ) -> Result<(), ExtractError> {
        if cancel.is_cancelled() {
            run.machine.process(FrameEvent::CancelRequested);
            return Ok(());
        }

        let mut video = source.open(&self.config.video)?;
        let duration = video.duration();
        sink.prepare(self.config.max_candidates(duration))?;

        let mut step = 0u64;
        loop {
            if cancel.is_cancelled() {
                warn!("⏹️ Cancelled after {} samples", step);
                run.machine.process(FrameEvent::CancelRequested);
                return Ok(());
            }

            let timestamp = step as f64 * self.config.interval_secs;
            if timestamp > duration {
                run.machine.process(FrameEvent::EndOfStream);
                return Ok(());
            }

            let frame = match video.frame_at(timestamp) {
                Ok(frame) => frame,
                Err(ExtractError::SeekOutOfRange { .. }) => {
                    debug!("📭 End of stream at {:.3}s", timestamp);
                    run.machine.process(FrameEvent::EndOfStream);
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            self.evaluate(frame, sink, run)?;
            step += 1;
            self.report(video.as_ref(), timestamp, run);
        }
    }

    fn evaluate(
        &mut self,
        frame: Frame,
        sink: &mut dyn SlideSink,
        run: &mut RunState,
    ) -> Result<(), ExtractError> {
        let similarity = match (&run.last_slide, run.machine.has_reference()) {
            (Some(last), true) => Some(self.comparator.similarity(&frame, last)?),
            _ => None,
        };

        // OCR 只在像素判定为"新幻灯片"时才需要
        let visually_new =
            similarity.map_or(true, |score| score < self.config.similarity_threshold);
        let text = match (&self.text_filter, visually_new) {
            (Some(filter), true) => filter.read(&frame),
            _ => None,
        };
        let same_text = self
            .text_filter
            .as_ref()
            .map_or(false, |filter| filter.matches_last(text.as_deref()));

        let action = run.machine.process(FrameEvent::Candidate {
            similarity,
            same_text,
        });

        match action {
            StateAction::Accept => {
                let index = run.slides.len() as u64;
                let path = sink.write(index, &frame)?;
                info!(
                    "📸 Slide {} at {:.2}s (similarity {})",
                    index,
                    frame.timestamp_secs(),
                    similarity.map_or_else(|| "n/a".to_string(), |s| format!("{:.3}", s))
                );
                run.slides.push(SlideRecord {
                    index,
                    timestamp_secs: frame.timestamp_secs(),
                    path,
                });
                if let Some(filter) = self.text_filter.as_mut() {
                    filter.remember(text);
                }
                run.last_slide = Some(frame);
            }
            StateAction::Reject(RejectReason::TooSimilar) => {
                debug!(
                    "🔁 Duplicate at {:.2}s (similarity {:.3})",
                    frame.timestamp_secs(),
                    similarity.unwrap_or(1.0)
                );
            }
            StateAction::Reject(RejectReason::TextUnchanged) => {
                debug!("🔤 Same text at {:.2}s, skipped", frame.timestamp_secs());
            }
            StateAction::Stop => {}
        }

        Ok(())
    }

    fn report(&mut self, video: &dyn VideoHandle, timestamp: f64, run: &RunState) {
        if let Some(callback) = self.progress.as_mut() {
            callback(&ExtractionProgress {
                timestamp_secs: timestamp,
                duration_secs: video.duration(),
                samples_evaluated: run.machine.frame_count(),
                slides_written: run.slides.len() as u64,
            });
        }
    }
}
