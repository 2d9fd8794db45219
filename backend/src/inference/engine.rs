use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::InferenceMode;

use super::classifier::{Classifier, check_input_shape};
use super::preprocess::InputTensor;
use super::InferenceError;
use crate::analysis::ProbabilityVector;

pub const PRIMARY_DEMO_DISTRIBUTION: [f32; 3] = [5.0, 92.5, 2.5];
pub const ALTERNATE_DEMO_DISTRIBUTION: [f32; 3] = [10.5, 85.0, 4.5];
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_millis(1500);

/// Which canned distribution the engine reports when no model is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackProfile {
    #[default]
    Primary,
    Alternate,
    Custom,
}

impl FallbackProfile {
    pub fn distribution(self, custom: Option<[f32; 3]>) -> Option<[f32; 3]> {
        match self {
            FallbackProfile::Primary => Some(PRIMARY_DEMO_DISTRIBUTION),
            FallbackProfile::Alternate => Some(ALTERNATE_DEMO_DISTRIBUTION),
            FallbackProfile::Custom => custom,
        }
    }
}

pub enum EngineState {
    Loaded(Box<dyn Classifier>),
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    pub probabilities: ProbabilityVector,
    pub mode: InferenceMode,
}

pub struct InferenceEngine {
    state: EngineState,
    fallback: ProbabilityVector,
    fallback_delay: Duration,
}

impl InferenceEngine {
    pub fn new(state: EngineState, fallback: ProbabilityVector, fallback_delay: Duration) -> Self {
        if let EngineState::Unavailable { reason } = &state {
            log::warn!(
                "Model unavailable, serving demo distribution {:?}: {}",
                fallback.values(),
                reason
            );
        }
        Self {
            state,
            fallback,
            fallback_delay,
        }
    }

    pub fn loaded(classifier: Box<dyn Classifier>) -> Self {
        Self::new(
            EngineState::Loaded(classifier),
            default_fallback(),
            DEFAULT_FALLBACK_DELAY,
        )
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(
            EngineState::Unavailable {
                reason: reason.into(),
            },
            default_fallback(),
            DEFAULT_FALLBACK_DELAY,
        )
    }

    pub fn with_fallback(mut self, fallback: ProbabilityVector, delay: Duration) -> Self {
        self.fallback = fallback;
        self.fallback_delay = delay;
        self
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn is_available(&self) -> bool {
        matches!(self.state, EngineState::Loaded(_))
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            EngineState::Loaded(_) => None,
            EngineState::Unavailable { reason } => Some(reason),
        }
    }

    /// Consumes the tensor. In demo mode the tensor is dropped and the
    /// fallback distribution is returned after the configured delay.
    pub fn infer(&self, input: InputTensor) -> Result<Inference, InferenceError> {
        match &self.state {
            EngineState::Loaded(classifier) => {
                check_input_shape(&input)?;
                let logits = classifier.logits(&input)?;
                let probabilities = ProbabilityVector::from_logits(&logits)?;
                Ok(Inference {
                    probabilities,
                    mode: InferenceMode::Model,
                })
            }
            EngineState::Unavailable { .. } => {
                drop(input);
                if !self.fallback_delay.is_zero() {
                    thread::sleep(self.fallback_delay);
                }
                Ok(Inference {
                    probabilities: self.fallback,
                    mode: InferenceMode::Demo,
                })
            }
        }
    }
}

fn default_fallback() -> ProbabilityVector {
    ProbabilityVector::from_constant(PRIMARY_DEMO_DISTRIBUTION)
}
