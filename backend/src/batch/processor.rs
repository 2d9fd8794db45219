use std::fmt;
use std::sync::Arc;

use rand::Rng;
use uuid::Uuid;

use super::report::{ClassificationResult, FailedItem, ItemOutcome, Report};
use crate::analysis::{InterpretationBank, InterpretationSelector, ResultAggregator};
use crate::config::TriageConfig;
use crate::inference::{InferenceEngine, InferenceError, Preprocessor};
use crate::sample::ImageSample;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("Batch size exceeded: {requested} images submitted, at most {allowed} allowed")]
    BatchSizeExceeded { requested: usize, allowed: usize },
    #[error("Batch is empty")]
    EmptyBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Validating,
    Processing,
    Complete,
    Rejected,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchState::Idle => "idle",
            BatchState::Validating => "validating",
            BatchState::Processing => "processing",
            BatchState::Complete => "complete",
            BatchState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub file_name: String,
}

impl Progress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed as f32 / self.total as f32
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub max_images: usize,
    pub max_image_bytes: usize,
    pub uncertainty_threshold: f32,
}

impl From<&TriageConfig> for BatchSettings {
    fn from(config: &TriageConfig) -> Self {
        Self {
            max_images: config.batch.max_images,
            max_image_bytes: config.batch.max_image_bytes,
            uncertainty_threshold: config.classification.uncertainty_threshold,
        }
    }
}

/// Drives preprocessing, inference, aggregation and narrative selection over
/// one batch at a time, strictly in submission order.
pub struct BatchProcessor<'b, R> {
    engine: Arc<InferenceEngine>,
    preprocessor: Preprocessor,
    aggregator: ResultAggregator,
    selector: InterpretationSelector<'b, R>,
    max_images: usize,
    state: BatchState,
}

impl<R: Rng> BatchProcessor<'static, R> {
    pub fn new(engine: Arc<InferenceEngine>, settings: BatchSettings, rng: R) -> Self {
        Self::with_bank(engine, settings, InterpretationBank::standard(), rng)
    }
}

impl<'b, R: Rng> BatchProcessor<'b, R> {
    pub fn with_bank(
        engine: Arc<InferenceEngine>,
        settings: BatchSettings,
        bank: &'b InterpretationBank,
        rng: R,
    ) -> Self {
        Self {
            engine,
            preprocessor: Preprocessor::new(settings.max_image_bytes),
            aggregator: ResultAggregator::new(settings.uncertainty_threshold),
            selector: InterpretationSelector::new(bank, rng),
            max_images: settings.max_images,
            state: BatchState::Idle,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    fn transition(&mut self, next: BatchState) {
        log::debug!("Batch state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Checks the batch length against the cap without touching any image.
    pub fn validate(&mut self, requested: usize) -> Result<(), BatchError> {
        self.transition(BatchState::Validating);
        let verdict = if requested == 0 {
            Err(BatchError::EmptyBatch)
        } else if requested > self.max_images {
            Err(BatchError::BatchSizeExceeded {
                requested,
                allowed: self.max_images,
            })
        } else {
            Ok(())
        };

        if let Err(e) = &verdict {
            log::warn!("Rejecting batch: {}", e);
            self.transition(BatchState::Rejected);
        }
        verdict
    }

    /// Runs the whole batch. `on_progress` is called once after every item.
    pub fn process<F>(&mut self, batch: &[ImageSample], mut on_progress: F) -> Result<Report, BatchError>
    where
        F: FnMut(&Progress),
    {
        self.transition(BatchState::Idle);
        self.validate(batch.len())?;

        self.transition(BatchState::Processing);
        let total = batch.len();
        log::info!(
            "Processing batch of {} image(s){}",
            total,
            if self.engine.is_available() { "" } else { " in demo mode" }
        );

        let mut items = Vec::with_capacity(total);
        for (position, sample) in batch.iter().enumerate() {
            let outcome = match self.classify(position, sample) {
                Ok(result) => {
                    log::info!("{}: {}", sample.file_name(), result.summary());
                    ItemOutcome::Classified(result)
                }
                Err(error) => {
                    log::warn!("{}: {}", sample.file_name(), error);
                    ItemOutcome::Failed(FailedItem {
                        position,
                        file_name: sample.file_name().to_string(),
                        error,
                    })
                }
            };
            items.push(outcome);

            on_progress(&Progress {
                completed: position + 1,
                total,
                file_name: sample.file_name().to_string(),
            });
        }

        self.transition(BatchState::Complete);
        Ok(Report::new(!self.engine.is_available(), items))
    }

    fn classify(
        &mut self,
        position: usize,
        sample: &ImageSample,
    ) -> Result<ClassificationResult, InferenceError> {
        let tensor = self.preprocessor.process(sample)?;
        let inference = self.engine.infer(tensor)?;
        let assessment = self.aggregator.aggregate(&inference.probabilities);
        let narrative = self.selector.select(assessment.predicted_index());

        Ok(ClassificationResult {
            id: Uuid::new_v4(),
            position,
            file_name: sample.file_name().to_string(),
            fingerprint: sample.fingerprint(),
            probabilities: inference.probabilities,
            predicted_class: assessment.predicted_class,
            confidence: assessment.confidence,
            uncertain: assessment.uncertain,
            narrative,
            mode: inference.mode,
        })
    }
}
