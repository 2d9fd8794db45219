use chrono::{DateTime, Utc};
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{AsRefStr, Display as StrumDisplay, EnumCount as EnumCountMacro, EnumIter};
use uuid::Uuid;

pub const NUM_CLASSES: usize = <ClassLabel as EnumCount>::COUNT;

/// Diagnostic categories, in the order of the classifier head outputs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumCountMacro,
    AsRefStr,
    StrumDisplay,
)]
#[serde(rename_all = "snake_case")]
pub enum ClassLabel {
    #[strum(to_string = "Bacterial Pneumonia")]
    Bacterial,
    #[strum(to_string = "Normal / Healthy")]
    Normal,
    #[strum(to_string = "Viral Pneumonia")]
    Viral,
}

impl ClassLabel {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        ClassLabel::iter().nth(index)
    }

    /// Every label in head order.
    pub fn all() -> impl Iterator<Item = ClassLabel> {
        ClassLabel::iter()
    }

    pub fn display_names() -> Vec<String> {
        ClassLabel::iter().map(|label| label.to_string()).collect()
    }
}

/// Whether a result came from the trained network or the demo fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    Model,
    Demo,
}

impl InferenceMode {
    pub fn is_degraded(self) -> bool {
        matches!(self, InferenceMode::Demo)
    }
}

/// Hex SHA-256 of the uploaded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClassificationResponse {
    pub id: Uuid,
    pub probabilities: Vec<f32>,
    pub class_labels: Vec<String>,
    pub predicted_class: ClassLabel,
    pub predicted_index: usize,
    pub confidence: f32,
    pub uncertain: bool,
    pub narrative: String,
    pub mode: InferenceMode,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum VerificationResponse {
    Rejected,
    Narrative(String),
    Error(String),
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemResponse {
    Classified {
        position: usize,
        file_name: String,
        fingerprint: Fingerprint,
        result: ClassificationResponse,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        verification: Option<VerificationResponse>,
    },
    Failed {
        position: usize,
        file_name: String,
        error: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub degraded: bool,
    pub items: Vec<ItemResponse>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EngineStatusResponse {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    pub max_images: usize,
    pub uncertainty_threshold: f32,
    pub class_labels: Vec<String>,
    pub verification_enabled: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub requested: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub allowed: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_follow_head_order() {
        assert_eq!(NUM_CLASSES, 3);
        assert_eq!(ClassLabel::from_index(0), Some(ClassLabel::Bacterial));
        assert_eq!(ClassLabel::from_index(1), Some(ClassLabel::Normal));
        assert_eq!(ClassLabel::from_index(2), Some(ClassLabel::Viral));
        assert_eq!(ClassLabel::from_index(3), None);
        for label in ClassLabel::iter() {
            assert_eq!(ClassLabel::from_index(label.index()), Some(label));
        }
    }

    #[test]
    fn display_names_are_human_readable() {
        assert_eq!(
            ClassLabel::display_names(),
            vec!["Bacterial Pneumonia", "Normal / Healthy", "Viral Pneumonia"]
        );
    }

    #[test]
    fn verification_response_is_tagged() {
        let json = serde_json::to_value(VerificationResponse::Narrative("clear".into())).unwrap();
        assert_eq!(json["status"], "narrative");
        assert_eq!(json["text"], "clear");

        let json = serde_json::to_value(VerificationResponse::Rejected).unwrap();
        assert_eq!(json["status"], "rejected");
    }
}
