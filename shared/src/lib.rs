use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Prediction {
    Fake,
    Real,
    Unknown,
}

/// Which path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Method {
    MlModel,
    SimpleAnalysis,
    RandomFallback,
    FallbackMode,
}

/// Response body of `POST /api/predict`. All numbers are percentages rounded
/// to two decimals; `confidence` is always the probability of `prediction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub prediction: Prediction,
    pub confidence: f64,
    pub fake_probability: f64,
    pub real_probability: f64,
    pub method: Method,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl ClassificationResult {
    /// Builds a result from the fake-class probability in percent. The real
    /// probability is its complement and the larger side wins; ties go to fake.
    /// `None` for NaN or infinite input.
    pub fn from_fake_probability(fake_probability: f64, method: Method) -> Option<Self> {
        if !fake_probability.is_finite() {
            return None;
        }
        let fake = fake_probability.clamp(0.0, 100.0);
        let real = 100.0 - fake;
        let (prediction, confidence) = if fake >= real {
            (Prediction::Fake, fake)
        } else {
            (Prediction::Real, real)
        };
        Some(Self {
            prediction,
            confidence: round2(confidence),
            fake_probability: round2(fake),
            real_probability: round2(real),
            method,
        })
    }

    /// Builds a result for a fixed prediction and its confidence in percent.
    pub fn from_confidence(prediction: Prediction, confidence: f64, method: Method) -> Self {
        let confidence = confidence.clamp(0.0, 100.0);
        let (fake, real) = match prediction {
            Prediction::Real => (100.0 - confidence, confidence),
            _ => (confidence, 100.0 - confidence),
        };
        Self {
            prediction,
            confidence: round2(confidence),
            fake_probability: round2(fake),
            real_probability: round2(real),
            method,
        }
    }

    /// Result used when no classifier could run at all.
    pub fn undetermined() -> Self {
        Self {
            prediction: Prediction::Unknown,
            confidence: 50.0,
            fake_probability: 50.0,
            real_probability: 50.0,
            method: Method::FallbackMode,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComputeTarget {
    Cpu,
    Accelerator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemoryStatus {
    Normal,
    Warning,
    Critical,
    Unavailable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryReport {
    pub status: MemoryStatus,
    pub rss_mb: f64,
    pub threshold_mb: f64,
    pub critical_mb: f64,
}

/// Response body of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_status: String,
    pub model_found: bool,
    pub model_size_bytes: Option<u64>,
    pub model_path: String,
    pub model_download_url: Option<String>,
    pub model_loaded: bool,
    pub compute_target: ComputeTarget,
    pub working_directory: String,
    pub timestamp: String,
    pub memory_optimized: bool,
    pub memory: MemoryReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_probability_drives_prediction() {
        let result = ClassificationResult::from_fake_probability(73.456, Method::MlModel).unwrap();
        assert_eq!(result.prediction, Prediction::Fake);
        assert_eq!(result.confidence, 73.46);
        assert_eq!(result.real_probability, 26.54);
        assert!((result.fake_probability + result.real_probability - 100.0).abs() < 0.1);
    }

    #[test]
    fn non_finite_probability_is_refused() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(ClassificationResult::from_fake_probability(value, Method::MlModel), None);
        }
        let tie = ClassificationResult::from_fake_probability(50.0, Method::MlModel).unwrap();
        assert_eq!(tie.prediction, Prediction::Fake);
    }

    #[test]
    fn confidence_matches_predicted_class() {
        let result = ClassificationResult::from_confidence(Prediction::Real, 95.0, Method::SimpleAnalysis);
        assert_eq!(result.real_probability, 95.0);
        assert_eq!(result.fake_probability, 5.0);
        assert_eq!(result.confidence, result.real_probability.max(result.fake_probability));
    }

    #[test]
    fn string_forms_are_snake_case() {
        use std::str::FromStr;
        assert_eq!(Method::MlModel.to_string(), "ml_model");
        assert_eq!(Method::RandomFallback.to_string(), "random_fallback");
        assert_eq!(Prediction::from_str("real").ok(), Some(Prediction::Real));
    }

    #[test]
    fn undetermined_keeps_probabilities_balanced() {
        let result = ClassificationResult::undetermined();
        assert_eq!(result.prediction, Prediction::Unknown);
        assert_eq!(result.fake_probability + result.real_probability, 100.0);
        assert_eq!(result.confidence, 50.0);
    }
}
