use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use shared::{ClassificationResult, ComputeTarget};
use tch::{Device, Tensor};
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::artifact::ArtifactLocator;
use super::heuristic::HeuristicAnalyzer;
use super::inference::{self, Classifier};
use super::network::SneakerNet;
use super::predictor::Predictor;
use super::preprocess::Preprocessor;
use super::reclaim::ResourceReclaimer;
use super::{panic_message, ClassifyError, RawImage};
use crate::config::ServiceConfig;

/// Builds a classifier from a weight file on a device.
pub type ModelLoader =
    Arc<dyn Fn(&Path, Device) -> Result<Box<dyn Classifier>, ClassifyError> + Send + Sync>;

pub fn compute_target(device: Device) -> ComputeTarget {
    match device {
        Device::Cpu => ComputeTarget::Cpu,
        _ => ComputeTarget::Accelerator,
    }
}

/// A model that finished loading. Never mutated afterwards.
pub struct LoadedModel {
    classifier: Mutex<Box<dyn Classifier>>,
    artifact_path: PathBuf,
    device: Device,
}

impl LoadedModel {
    pub fn new(classifier: Box<dyn Classifier>, artifact_path: PathBuf, device: Device) -> Self {
        Self {
            classifier: Mutex::new(classifier),
            artifact_path,
            device,
        }
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact_path
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn classify(&self, batch: &Tensor) -> Result<ClassificationResult, ClassifyError> {
        // tch modules are Send but not Sync; the forward call only reads weights
        let classifier = match self.classifier.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inference::classify(&**classifier, batch)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    pub loaded: bool,
    pub backing_artifact_path: Option<PathBuf>,
    pub compute_target: ComputeTarget,
}

#[derive(Debug, thiserror::Error)]
#[error("model not ready: {reason}")]
pub struct NotReady {
    pub reason: ClassifyError,
}

/// Owns the lazily loaded model and everything a classification needs.
/// Loading happens on first use, at most one attempt at a time, and is
/// retried on later requests until it succeeds once.
pub struct ModelProvisioner {
    locator: ArtifactLocator,
    loader: ModelLoader,
    device: Device,
    model: OnceCell<Arc<LoadedModel>>,
    preprocessor: Preprocessor,
    analyzer: HeuristicAnalyzer,
    reclaimer: ResourceReclaimer,
}

impl ModelProvisioner {
    pub fn new(config: &ServiceConfig) -> Self {
        Self::with_loader(config, Arc::new(SneakerNet::boxed), Device::cuda_if_available())
    }

    pub fn with_loader(config: &ServiceConfig, loader: ModelLoader, device: Device) -> Self {
        Self {
            locator: ArtifactLocator::new(&config.artifact),
            loader,
            device,
            model: OnceCell::new(),
            preprocessor: Preprocessor::new(&config.preprocessing),
            analyzer: HeuristicAnalyzer::new(config.heuristics.clone()),
            reclaimer: ResourceReclaimer::new(&config.memory),
        }
    }

    pub fn locator(&self) -> &ArtifactLocator {
        &self.locator
    }

    pub fn reclaimer(&self) -> &ResourceReclaimer {
        &self.reclaimer
    }

    pub fn is_ready(&self) -> bool {
        self.model.initialized()
    }

    pub fn state(&self) -> ModelState {
        let model = self.model.get();
        ModelState {
            loaded: model.is_some(),
            backing_artifact_path: model.map(|m| m.artifact_path().to_path_buf()),
            compute_target: compute_target(model.map(|m| m.device()).unwrap_or(self.device)),
        }
    }

    pub async fn try_load(&self) -> Result<Arc<LoadedModel>, NotReady> {
        self.model
            .get_or_try_init(|| self.load())
            .await
            .cloned()
            .map_err(|reason| NotReady { reason })
    }

    async fn load(&self) -> Result<Arc<LoadedModel>, ClassifyError> {
        log::info!("Loading classifier on {:?}", self.device);
        let path = self.locator.locate().await.ok_or_else(|| {
            ClassifyError::ArtifactUnavailable("no weight file found or downloadable".into())
        })?;

        let loader = self.loader.clone();
        let device = self.device;
        let weights = path.clone();
        let classifier = tokio::task::spawn_blocking(move || loader(&weights, device))
            .await
            .map_err(|e| {
                let detail = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                ClassifyError::ArtifactUnavailable(format!("loader task failed: {}", detail))
            })??;

        log::info!("Loaded production model from: {}", path.display());
        Ok(Arc::new(LoadedModel::new(classifier, path, device)))
    }

    pub async fn predictor(&self) -> Predictor {
        match self.try_load().await {
            Ok(model) => Predictor::ModelBacked(model),
            Err(not_ready) => {
                log::warn!("Using simple analysis: {}", not_ready);
                Predictor::Heuristic
            }
        }
    }

    /// Classifies one decoded upload and reclaims its buffers. Never fails.
    pub async fn predict(&self, request_id: Uuid, image: RawImage) -> ClassificationResult {
        let predictor = self.predictor().await;
        log::debug!(
            "[{}] Classifying with {}",
            request_id,
            if predictor.is_model_backed() { "model" } else { "heuristics" }
        );
        let preprocessor = self.preprocessor.clone();
        let analyzer = self.analyzer.clone();

        let outcome = tokio::task::spawn_blocking(move || {
            let result = predictor.predict(&image, &preprocessor, &analyzer);
            (result, image)
        })
        .await;

        match outcome {
            Ok((result, image)) => {
                log::info!(
                    "[{}] {} ({:.2}%) via {}",
                    request_id,
                    result.prediction,
                    result.confidence,
                    result.method
                );
                self.reclaimer.reclaim(request_id, image);
                result
            }
            Err(e) => {
                log::error!("[{}] Classification worker failed: {}", request_id, e);
                self.reclaimer.reclaim(request_id, ());
                ClassificationResult::undetermined()
            }
        }
    }
}
