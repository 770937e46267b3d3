use shared::{ClassificationResult, Method};
use tch::{Kind, Tensor};

use super::ClassifyError;

/// A loaded network that maps a preprocessed batch to raw `{fake, real}` logits.
/// Implementations must not mutate themselves when called.
pub trait Classifier: Send {
    fn logits(&self, batch: &Tensor) -> Result<Tensor, ClassifyError>;
}

/// Softmax over exactly two logits, returned as `[p_fake, p_real]`. NaN or
/// infinite outputs are an inference failure.
pub fn class_probabilities(logits: &Tensor) -> Result<[f64; 2], ClassifyError> {
    let probabilities = logits.f_softmax(-1, Kind::Float)?.f_view([-1])?;
    let values = Vec::<f32>::try_from(&probabilities)?;
    match values.as_slice() {
        [fake, real] if fake.is_finite() && real.is_finite() => Ok([*fake as f64, *real as f64]),
        [fake, real] => Err(ClassifyError::InferenceFailure(format!(
            "non-finite class probabilities [{}, {}]",
            fake, real
        ))),
        other => Err(ClassifyError::InferenceFailure(format!(
            "expected 2 class logits, got {}",
            other.len()
        ))),
    }
}

/// Runs one forward pass without gradient tracking and scores the argmax class.
pub fn classify(model: &dyn Classifier, batch: &Tensor) -> Result<ClassificationResult, ClassifyError> {
    let logits = tch::no_grad(|| model.logits(batch))?;
    let [fake, _real] = class_probabilities(&logits)?;
    ClassificationResult::from_fake_probability(fake * 100.0, Method::MlModel).ok_or_else(|| {
        ClassifyError::InferenceFailure(format!("fake probability {} is not finite", fake))
    })
}
