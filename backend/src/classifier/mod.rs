pub mod artifact;
pub mod heuristic;
pub mod inference;
pub mod network;
pub mod predictor;
pub mod preprocess;
pub mod provisioner;
pub mod raw_image;
pub mod reclaim;

pub use provisioner::ModelProvisioner;
pub use raw_image::RawImage;

/// Failures inside the classification path. Only `InvalidImageFormat` is ever
/// reported to a client; the others select a fallback.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Invalid image format: {0}")]
    InvalidImageFormat(String),
    #[error("Model artifact unavailable: {0}")]
    ArtifactUnavailable(String),
    #[error("Inference failed: {0}")]
    InferenceFailure(String),
    #[error("Image analysis failed: {0}")]
    AnalysisFailure(String),
}

impl From<tch::TchError> for ClassifyError {
    fn from(err: tch::TchError) -> Self {
        ClassifyError::InferenceFailure(err.to_string())
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
