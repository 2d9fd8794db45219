use super::preprocess::{CHANNELS, INPUT_SIZE, InputTensor};

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Input shape {0:?} does not match [1, 3, 224, 224]")]
    InputShape(Vec<usize>),
    #[error("Failed to load weights from {path}: {message}")]
    Load { path: String, message: String },
    #[error("Inference backend error: {0}")]
    Backend(String),
    #[error("Model lock poisoned")]
    Poisoned,
    #[error("Built without the `torch` feature; cannot load {0}")]
    BackendDisabled(String),
}

/// A network mapping one preprocessed image to three class logits.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Raw head outputs, no softmax applied. Runs without gradient tracking.
    fn logits(&self, input: &InputTensor) -> Result<Vec<f32>, ClassifierError>;
}

pub fn check_input_shape(input: &InputTensor) -> Result<(), ClassifierError> {
    let side = INPUT_SIZE as usize;
    if input.shape() != [1, CHANNELS, side, side] {
        return Err(ClassifierError::InputShape(input.shape().to_vec()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn accepts_expected_shape() {
        assert!(check_input_shape(&Array4::zeros((1, 3, 224, 224))).is_ok());
    }

    #[test]
    fn rejects_other_shapes() {
        let err = check_input_shape(&Array4::zeros((2, 3, 224, 224))).unwrap_err();
        assert!(matches!(err, ClassifierError::InputShape(shape) if shape == vec![2, 3, 224, 224]));
        assert!(check_input_shape(&Array4::zeros((1, 1, 224, 224))).is_err());
    }
}
