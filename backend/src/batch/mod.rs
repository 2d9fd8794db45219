pub mod processor;
pub mod report;

pub use processor::{BatchError, BatchProcessor, BatchSettings, BatchState, Progress};
pub use report::{ClassificationResult, FailedItem, ItemOutcome, Report};
