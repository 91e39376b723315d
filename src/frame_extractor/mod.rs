//! 幻灯片提取器 - 从讲座录像中按固定间隔采样，只保留与上一张幻灯片差异足够大的帧
//!
//! 核心策略：
//! 1. 固定间隔采样 - 时间戳为 interval 的整数倍
//! 2. 状态机驱动 - 每个候选帧产生 Accept / Reject / Stop
//! 3. 相似度判定 - 只与最近一次保留的幻灯片比较
//! 4. 可选 OCR - 文字未变化的候选帧同样视为重复

pub mod cancel;
pub mod comparator;
pub mod frame;
pub mod pipeline;
pub mod state_machine;
pub mod text_filter;

pub use cancel::CancellationToken;
pub use comparator::{ComparatorKind, FrameComparator, PerceptualHashComparator, StructuralComparator};
pub use frame::{Frame, LumaGrid};
pub use pipeline::{
    ExtractionConfig, ExtractionOutcome, ExtractionProgress, ExtractionResult, SlideExtractor,
    SlideRecord,
};
pub use state_machine::{ExtractionState, StateMachine};
pub use text_filter::{MockTextRecognizer, TesseractRecognizer, TextDedupFilter, TextRecognizer};
