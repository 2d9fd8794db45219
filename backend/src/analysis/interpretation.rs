use std::collections::HashMap;

use rand::Rng;
use rand::seq::IndexedRandom;
use shared::ClassLabel;

pub const TEMPLATES_PER_CLASS: usize = 5;
pub const INCONCLUSIVE: &str = "inconclusive diagnosis";

#[derive(Debug, thiserror::Error)]
pub enum InterpretationError {
    #[error("Class {class_index} has {count} templates, expected 5")]
    WrongTemplateCount { class_index: usize, count: usize },
}

lazy_static::lazy_static! {
    static ref STANDARD_BANK: InterpretationBank = InterpretationBank {
        templates: HashMap::from([
            (ClassLabel::Bacterial.index(), BACTERIAL.iter().map(|t| t.to_string()).collect()),
            (ClassLabel::Normal.index(), NORMAL.iter().map(|t| t.to_string()).collect()),
            (ClassLabel::Viral.index(), VIRAL.iter().map(|t| t.to_string()).collect()),
        ]),
    };
}

const BACTERIAL: [&str; TEMPLATES_PER_CLASS] = [
    "Focal lobar consolidation with air bronchograms, consistent with a bacterial process. \
     Correlate with fever, leukocytosis and sputum culture.",
    "Dense segmental opacity with well-defined margins; pattern favors bacterial pneumonia. \
     A small parapneumonic effusion cannot be excluded on this projection.",
    "Asymmetric airspace consolidation confined to one lobe, typical of bacterial infection. \
     Cardiac silhouette and costophrenic angles otherwise preserved.",
    "Homogeneous alveolar filling in the lower zone with silhouetting of the adjacent border, \
     suggestive of bacterial pneumonia. Follow-up imaging after treatment is advised.",
    "Patchy confluent consolidation with localized volume preservation; findings point to a \
     bacterial etiology. Clinical and laboratory correlation recommended.",
];

const NORMAL: [&str; TEMPLATES_PER_CLASS] = [
    "Lungs are clear and well expanded. No focal consolidation, effusion or pneumothorax.",
    "Normal cardiomediastinal silhouette with sharp costophrenic angles. \
     No acute cardiopulmonary abnormality identified.",
    "Symmetric lung parenchyma without airspace opacity or interstitial markings. \
     Diaphragmatic contours are normal.",
    "No radiographic evidence of pneumonia. Pulmonary vasculature and hila within normal limits.",
    "Clear lung fields bilaterally with preserved aeration. Bony thorax unremarkable.",
];

const VIRAL: [&str; TEMPLATES_PER_CLASS] = [
    "Bilateral diffuse interstitial opacities with peribronchial cuffing, \
     compatible with a viral pneumonia pattern.",
    "Patchy bilateral ground-glass densities without lobar consolidation; \
     findings favor a viral etiology.",
    "Increased perihilar interstitial markings with hyperinflation, \
     a distribution typical of viral lower respiratory infection.",
    "Reticular and reticulonodular opacities in both lungs without focal consolidation, \
     suggestive of viral pneumonitis.",
    "Symmetric interstitial thickening with subtle multifocal haziness; \
     pattern consistent with viral pneumonia. Correlate with respiratory panel.",
];

/// Narrative templates keyed by class index. Never mutated once built.
#[derive(Debug, Clone)]
pub struct InterpretationBank {
    templates: HashMap<usize, Vec<String>>,
}

impl InterpretationBank {
    /// The process-wide bank, built on first access.
    pub fn standard() -> &'static InterpretationBank {
        &STANDARD_BANK
    }

    pub fn new(templates: HashMap<usize, Vec<String>>) -> Result<Self, InterpretationError> {
        for (&class_index, entries) in &templates {
            if entries.len() != TEMPLATES_PER_CLASS {
                return Err(InterpretationError::WrongTemplateCount {
                    class_index,
                    count: entries.len(),
                });
            }
        }
        Ok(Self { templates })
    }

    pub fn templates(&self, class_index: usize) -> Option<&[String]> {
        self.templates.get(&class_index).map(Vec::as_slice)
    }

    /// Uniformly picks one template for the class, or the inconclusive literal.
    pub fn select<R: Rng + ?Sized>(&self, class_index: usize, rng: &mut R) -> &str {
        self.templates(class_index)
            .and_then(|entries| entries.choose(rng))
            .map(String::as_str)
            .unwrap_or(INCONCLUSIVE)
    }
}

/// Pairs a bank with the random source used to draw from it.
pub struct InterpretationSelector<'a, R> {
    bank: &'a InterpretationBank,
    rng: R,
}

impl<'a, R: Rng> InterpretationSelector<'a, R> {
    pub fn new(bank: &'a InterpretationBank, rng: R) -> Self {
        Self { bank, rng }
    }

    pub fn select(&mut self, class_index: usize) -> String {
        self.bank.select(class_index, &mut self.rng).to_string()
    }
}
