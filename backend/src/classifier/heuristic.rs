use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::{ClassificationResult, Method, Prediction};

use super::{ClassifyError, RawImage};

/// Scoring constants for degraded mode. Empirical; tune through the
/// `heuristics` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicThresholds {
    pub dimension_min: u32,
    pub dimension_max: u32,
    pub dimension_points: u32,
    pub brightness_min: f64,
    pub brightness_max: f64,
    pub brightness_points: u32,
    pub contrast_min: f64,
    pub contrast_points: u32,
    pub real_score_min: u32,
    pub real_confidence_bonus: u32,
    pub real_confidence_cap: u32,
    pub fake_confidence_floor: u32,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            dimension_min: 200,
            dimension_max: 1000,
            dimension_points: 20,
            brightness_min: 50.0,
            brightness_max: 200.0,
            brightness_points: 30,
            contrast_min: 20.0,
            contrast_points: 30,
            real_score_min: 60,
            real_confidence_bonus: 20,
            real_confidence_cap: 95,
            fake_confidence_floor: 30,
        }
    }
}

/// Whole-image statistics over every channel value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageFeatures {
    pub height: u32,
    pub width: u32,
    pub brightness: f64,
    pub contrast: f64,
}

impl ImageFeatures {
    pub fn measure(image: &RawImage) -> Result<Self, ClassifyError> {
        let view = image.channel_view()?;
        let count = view.len();
        if count == 0 {
            return Err(ClassifyError::AnalysisFailure("image has no pixels".into()));
        }

        let (sum, sum_sq) = view.fold((0.0f64, 0.0f64), |(sum, sum_sq), &v| {
            let v = v as f64;
            (sum + v, sum_sq + v * v)
        });
        let n = count as f64;
        let brightness = sum / n;
        let variance = (sum_sq / n - brightness * brightness).max(0.0);

        Ok(Self {
            height: image.height(),
            width: image.width(),
            brightness,
            contrast: variance.sqrt(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicAnalyzer {
    thresholds: HeuristicThresholds,
}

impl HeuristicAnalyzer {
    pub fn new(thresholds: HeuristicThresholds) -> Self {
        Self { thresholds }
    }

    pub fn score(&self, features: &ImageFeatures) -> u32 {
        let t = &self.thresholds;
        let dims = t.dimension_min..=t.dimension_max;
        let mut score = 0;
        if dims.contains(&features.height) && dims.contains(&features.width) {
            score += t.dimension_points;
        }
        if (t.brightness_min..=t.brightness_max).contains(&features.brightness) {
            score += t.brightness_points;
        }
        if features.contrast > t.contrast_min {
            score += t.contrast_points;
        }
        score
    }

    pub fn verdict(&self, score: u32) -> ClassificationResult {
        let t = &self.thresholds;
        if score >= t.real_score_min {
            let confidence = (score + t.real_confidence_bonus).min(t.real_confidence_cap);
            ClassificationResult::from_confidence(
                Prediction::Real,
                confidence as f64,
                Method::SimpleAnalysis,
            )
        } else {
            let confidence = 100u32.saturating_sub(score).max(t.fake_confidence_floor);
            ClassificationResult::from_confidence(
                Prediction::Fake,
                confidence as f64,
                Method::SimpleAnalysis,
            )
        }
    }

    pub fn analyze(&self, image: &RawImage) -> Result<ClassificationResult, ClassifyError> {
        let features = ImageFeatures::measure(image)?;
        let score = self.score(&features);
        log::debug!(
            "Heuristic features {}x{} brightness={:.1} contrast={:.1} score={}",
            features.width,
            features.height,
            features.brightness,
            features.contrast,
            score
        );
        Ok(self.verdict(score))
    }

    /// `analyze`, or a random split when the pixels cannot be analyzed.
    pub fn classify(&self, image: &RawImage) -> ClassificationResult {
        match self.analyze(image) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Simple analysis error: {}", e);
                random_fallback()
            }
        }
    }
}

/// Last resort: fake probability drawn uniformly from [30, 70].
pub fn random_fallback() -> ClassificationResult {
    let fake = rand::rng().random_range(30.0..=70.0);
    ClassificationResult::from_fake_probability(fake, Method::RandomFallback)
        .unwrap_or_else(ClassificationResult::undetermined)
}
