use serde::Serialize;
use shared::{ClassLabel, NUM_CLASSES};

/// Allowed drift of the summed percentages away from 100.
pub const SUM_TOLERANCE: f32 = 0.01;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbabilityError {
    #[error("Expected {expected} values, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("Value {value} for class {index} is outside [0, 100]")]
    OutOfRange { index: usize, value: f32 },
    #[error("Values sum to {sum}, expected 100 ± 0.01")]
    BadSum { sum: f32 },
    #[error("Non-finite logit at index {0}")]
    NonFiniteLogit(usize),
}

/// Percentages for Bacterial, Normal and Viral, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProbabilityVector([f32; NUM_CLASSES]);

impl ProbabilityVector {
    pub fn try_new(values: [f32; NUM_CLASSES]) -> Result<Self, ProbabilityError> {
        for (index, &value) in values.iter().enumerate() {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                return Err(ProbabilityError::OutOfRange { index, value });
            }
        }
        let sum: f32 = values.iter().sum();
        if (sum - 100.0).abs() > SUM_TOLERANCE {
            return Err(ProbabilityError::BadSum { sum });
        }
        Ok(Self(values))
    }

    /// For compile-time constants whose invariants are checked by tests.
    pub(crate) const fn from_constant(values: [f32; NUM_CLASSES]) -> Self {
        Self(values)
    }

    pub fn from_slice(values: &[f32]) -> Result<Self, ProbabilityError> {
        let array: [f32; NUM_CLASSES] =
            values.try_into().map_err(|_| ProbabilityError::WrongLength {
                expected: NUM_CLASSES,
                actual: values.len(),
            })?;
        Self::try_new(array)
    }

    /// Softmax over raw head outputs, scaled to percentages.
    pub fn from_logits(logits: &[f32]) -> Result<Self, ProbabilityError> {
        if logits.len() != NUM_CLASSES {
            return Err(ProbabilityError::WrongLength {
                expected: NUM_CLASSES,
                actual: logits.len(),
            });
        }
        if let Some(index) = logits.iter().position(|l| !l.is_finite()) {
            return Err(ProbabilityError::NonFiniteLogit(index));
        }

        // Shift by the max so exp() cannot overflow; accumulate in f64.
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
        let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        let mut values = [0.0f32; NUM_CLASSES];
        for (slot, e) in values.iter_mut().zip(&exps) {
            *slot = ((e / total) * 100.0) as f32;
        }
        Self::try_new(values)
    }

    pub fn values(&self) -> [f32; NUM_CLASSES] {
        self.0
    }

    pub fn get(&self, label: ClassLabel) -> f32 {
        self.0[label.index()]
    }

    pub fn max(&self) -> f32 {
        self.0.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Label with the largest value; ties resolve to the earliest label in head order.
    pub fn top_class(&self) -> ClassLabel {
        ClassLabel::all().fold(ClassLabel::Bacterial, |best, label| {
            if self.get(label) > self.get(best) { label } else { best }
        })
    }

    pub fn argmax(&self) -> usize {
        self.top_class().index()
    }
}
