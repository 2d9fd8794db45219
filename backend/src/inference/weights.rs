use std::path::{Path, PathBuf};

use super::classifier::{Classifier, ClassifierError};
use super::engine::{EngineState, InferenceEngine};
use crate::config::{DeviceKind, TriageConfig};

/// Builds the engine from configuration. Never fails: any problem locating or
/// loading weights leaves the engine in the unavailable state.
pub fn load_engine(config: &TriageConfig) -> InferenceEngine {
    let device = config.model.device;
    let candidates = config.model.weight_candidates();
    let state = locate_and_load(&candidates, |path| open_classifier(path, device));

    match config.fallback.distribution() {
        Ok(fallback) => InferenceEngine::new(state, fallback, config.fallback.delay()),
        Err(e) => {
            log::error!("Invalid fallback configuration, using the primary profile: {}", e);
            match state {
                EngineState::Loaded(classifier) => InferenceEngine::loaded(classifier),
                EngineState::Unavailable { reason } => InferenceEngine::unavailable(reason),
            }
        }
    }
}

/// Tries each existing candidate in order; the first that loads wins.
pub fn locate_and_load<F>(candidates: &[PathBuf], loader: F) -> EngineState
where
    F: Fn(&Path) -> Result<Box<dyn Classifier>, ClassifierError>,
{
    let existing: Vec<&PathBuf> = candidates.iter().filter(|p| p.is_file()).collect();
    if existing.is_empty() {
        let searched = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return EngineState::Unavailable {
            reason: format!("no weights found (searched: {})", searched),
        };
    }

    let mut failures = Vec::new();
    for path in existing {
        match loader(path) {
            Ok(classifier) => {
                log::info!("Classifier ready: {}", classifier.name());
                return EngineState::Loaded(classifier);
            }
            Err(e) => {
                log::warn!("Could not load weights from {}: {}", path.display(), e);
                failures.push(e.to_string());
            }
        }
    }

    EngineState::Unavailable {
        reason: failures.join("; "),
    }
}

#[cfg(feature = "torch")]
fn open_classifier(path: &Path, device: DeviceKind) -> Result<Box<dyn Classifier>, ClassifierError> {
    let classifier = super::torch::TorchClassifier::load(path, device)?;
    Ok(Box::new(classifier))
}

#[cfg(not(feature = "torch"))]
fn open_classifier(path: &Path, _device: DeviceKind) -> Result<Box<dyn Classifier>, ClassifierError> {
    Err(ClassifierError::BackendDisabled(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InputTensor;
    use std::fs;
    use std::sync::Mutex;

    struct Named(String);

    impl Classifier for Named {
        fn name(&self) -> &str {
            &self.0
        }

        fn logits(&self, _input: &InputTensor) -> Result<Vec<f32>, ClassifierError> {
            Ok(vec![0.0, 0.0, 0.0])
        }
    }

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cxr-weights-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(dir.join("models")).unwrap();
        dir
    }

    #[test]
    fn nothing_found_is_unavailable() {
        let dir = scratch_dir();
        let candidates = vec![dir.join("models/w.safetensors"), dir.join("w.safetensors")];
        let state = locate_and_load(&candidates, |_| panic!("loader must not run"));
        match state {
            EngineState::Unavailable { reason } => assert!(reason.contains("no weights found")),
            EngineState::Loaded(_) => panic!("expected unavailable"),
        }
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn nested_path_is_tried_before_root() {
        let dir = scratch_dir();
        let nested = dir.join("models/w.safetensors");
        let root = dir.join("w.safetensors");
        fs::write(&nested, b"nested").unwrap();
        fs::write(&root, b"root").unwrap();

        let attempts = Mutex::new(Vec::new());
        let state = locate_and_load(&[nested.clone(), root.clone()], |path| {
            attempts.lock().unwrap().push(path.to_path_buf());
            Ok(Box::new(Named(path.display().to_string())) as Box<dyn Classifier>)
        });

        assert_eq!(*attempts.lock().unwrap(), vec![nested.clone()]);
        match state {
            EngineState::Loaded(classifier) => {
                assert_eq!(classifier.name(), nested.display().to_string())
            }
            EngineState::Unavailable { .. } => panic!("expected loaded"),
        }
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn incompatible_nested_weights_fall_through_to_root() {
        let dir = scratch_dir();
        let nested = dir.join("models/w.safetensors");
        let root = dir.join("w.safetensors");
        fs::write(&nested, b"bad").unwrap();
        fs::write(&root, b"good").unwrap();

        let state = locate_and_load(&[nested.clone(), root.clone()], |path| {
            if path == nested.as_path() {
                Err(ClassifierError::Load {
                    path: path.display().to_string(),
                    message: "shape mismatch for fc.weight".into(),
                })
            } else {
                Ok(Box::new(Named("root".into())) as Box<dyn Classifier>)
            }
        });

        assert!(matches!(state, EngineState::Loaded(ref c) if c.name() == "root"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn all_candidates_failing_is_unavailable() {
        let dir = scratch_dir();
        let root = dir.join("w.safetensors");
        fs::write(&root, b"bad").unwrap();

        let state = locate_and_load(&[dir.join("models/w.safetensors"), root], |path| {
            Err(ClassifierError::BackendDisabled(path.display().to_string()))
        });
        match state {
            EngineState::Unavailable { reason } => assert!(reason.contains("torch")),
            EngineState::Loaded(_) => panic!("expected unavailable"),
        }
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn load_engine_degrades_without_weights() {
        let dir = scratch_dir();
        let mut config = TriageConfig::default();
        config.model.weights_dir = dir.join("models");
        config.model.weights_file = dir.join("absent.safetensors").display().to_string();
        config.fallback.delay_ms = 0;

        let engine = load_engine(&config);
        assert!(!engine.is_available());
        assert!(engine.unavailable_reason().is_some());
        fs::remove_dir_all(dir).ok();
    }
}
