use std::sync::Arc;

use shared::ClassificationResult;

use super::heuristic::HeuristicAnalyzer;
use super::preprocess::Preprocessor;
use super::provisioner::LoadedModel;
use super::{ClassifyError, RawImage};

/// The path a request takes, decided once per request by the provisioner's
/// readiness check.
#[derive(Clone)]
pub enum Predictor {
    ModelBacked(Arc<LoadedModel>),
    Heuristic,
}

impl Predictor {
    pub fn is_model_backed(&self) -> bool {
        matches!(self, Predictor::ModelBacked(_))
    }

    /// Always yields a result: a failing model degrades to the heuristic, a
    /// failing heuristic to a random split.
    pub fn predict(
        &self,
        image: &RawImage,
        preprocessor: &Preprocessor,
        analyzer: &HeuristicAnalyzer,
    ) -> ClassificationResult {
        match self {
            Predictor::ModelBacked(model) => match run_model(model, image, preprocessor) {
                Ok(result) => result,
                Err(e) => {
                    log::warn!("Prediction error, using simple analysis: {}", e);
                    analyzer.classify(image)
                }
            },
            Predictor::Heuristic => analyzer.classify(image),
        }
    }
}

fn run_model(
    model: &LoadedModel,
    image: &RawImage,
    preprocessor: &Preprocessor,
) -> Result<ClassificationResult, ClassifyError> {
    let batch = preprocessor.to_batch(image)?;
    let result = model.classify(&batch);
    drop(batch);
    result
}
