pub mod classifier;
pub mod engine;
pub mod preprocess;
pub mod service;
#[cfg(feature = "torch")]
pub mod torch;
pub mod weights;

use crate::analysis::ProbabilityError;
use classifier::ClassifierError;

pub use classifier::Classifier;
pub use engine::{EngineState, FallbackProfile, Inference, InferenceEngine};
pub use preprocess::{InputTensor, Preprocessor};
pub use service::ModelService;

/// Failure of a single image. Never aborts the rest of a batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Image too large: {size} bytes exceeds the {limit} byte limit")]
    ImageTooLarge { size: usize, limit: usize },
    #[error("Model error: {0}")]
    Model(String),
}

impl From<ClassifierError> for InferenceError {
    fn from(err: ClassifierError) -> Self {
        InferenceError::Model(err.to_string())
    }
}

impl From<ProbabilityError> for InferenceError {
    fn from(err: ProbabilityError) -> Self {
        InferenceError::Model(format!("invalid model output: {}", err))
    }
}
