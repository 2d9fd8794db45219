use shared::ClassLabel;

use super::probability::ProbabilityVector;

pub const DEFAULT_UNCERTAINTY_THRESHOLD: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub predicted_class: ClassLabel,
    pub confidence: f32,
    pub uncertain: bool,
}

impl Assessment {
    pub fn predicted_index(&self) -> usize {
        self.predicted_class.index()
    }
}

/// Confidence gate over a probability vector.
#[derive(Debug, Clone, Copy)]
pub struct ResultAggregator {
    uncertainty_threshold: f32,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_UNCERTAINTY_THRESHOLD)
    }
}

impl ResultAggregator {
    pub fn new(uncertainty_threshold: f32) -> Self {
        Self {
            uncertainty_threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.uncertainty_threshold
    }

    /// A result is uncertain when its top percentage is strictly below the threshold.
    pub fn aggregate(&self, probabilities: &ProbabilityVector) -> Assessment {
        let predicted_class = probabilities.top_class();
        let confidence = probabilities.get(predicted_class);

        Assessment {
            predicted_class,
            confidence,
            uncertain: confidence < self.uncertainty_threshold,
        }
    }
}
