use chrono::{DateTime, Utc};
use shared::{ClassLabel, Fingerprint, InferenceMode};
use uuid::Uuid;

use crate::analysis::ProbabilityVector;
use crate::inference::InferenceError;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub id: Uuid,
    pub position: usize,
    pub file_name: String,
    pub fingerprint: Fingerprint,
    pub probabilities: ProbabilityVector,
    pub predicted_class: ClassLabel,
    pub confidence: f32,
    pub uncertain: bool,
    pub narrative: String,
    pub mode: InferenceMode,
}

impl ClassificationResult {
    pub fn predicted_index(&self) -> usize {
        self.predicted_class.index()
    }

    /// e.g. `Normal / Healthy (92.50%)`
    pub fn summary(&self) -> String {
        format!("{} ({:.2}%)", self.predicted_class, self.confidence)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem {
    pub position: usize,
    pub file_name: String,
    pub error: InferenceError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Classified(ClassificationResult),
    Failed(FailedItem),
}

impl ItemOutcome {
    pub fn position(&self) -> usize {
        match self {
            ItemOutcome::Classified(result) => result.position,
            ItemOutcome::Failed(failed) => failed.position,
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            ItemOutcome::Classified(result) => &result.file_name,
            ItemOutcome::Failed(failed) => &failed.file_name,
        }
    }

    pub fn as_result(&self) -> Option<&ClassificationResult> {
        match self {
            ItemOutcome::Classified(result) => Some(result),
            ItemOutcome::Failed(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&InferenceError> {
        match self {
            ItemOutcome::Classified(_) => None,
            ItemOutcome::Failed(failed) => Some(&failed.error),
        }
    }
}

/// Outcome of one batch, one entry per submitted image in submission order.
#[derive(Debug, Clone)]
pub struct Report {
    batch_id: Uuid,
    created_at: DateTime<Utc>,
    degraded: bool,
    items: Vec<ItemOutcome>,
}

impl Report {
    pub(crate) fn new(degraded: bool, items: Vec<ItemOutcome>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            degraded,
            items,
        }
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True when results came from the demo fallback rather than the model.
    pub fn degraded(&self) -> bool {
        self.degraded
    }

    pub fn items(&self) -> &[ItemOutcome] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn results(&self) -> impl Iterator<Item = &ClassificationResult> {
        self.items.iter().filter_map(ItemOutcome::as_result)
    }

    pub fn failures(&self) -> impl Iterator<Item = &FailedItem> {
        self.items.iter().filter_map(|item| match item {
            ItemOutcome::Failed(failed) => Some(failed),
            ItemOutcome::Classified(_) => None,
        })
    }
}
