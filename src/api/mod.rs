pub mod extraction;

pub use extraction::{run_extraction, ExtractionRequest, ExtractionStatus, ExtractionTask, TaskEvent};
