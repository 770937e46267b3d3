use image::imageops::{self, FilterType};
use ndarray::Array3;
use tch::Tensor;

use super::{ClassifyError, RawImage};
use crate::config::PreprocessingConfig;

/// Turns an arbitrary RGB image into the `[1, 3, H, W]` batch the classifier
/// expects: bilinear resize, scale to [0, 1], per-channel mean/std.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    input_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn new(config: &PreprocessingConfig) -> Self {
        Self {
            input_size: config.input_size,
            mean: config.mean,
            std: config.std,
        }
    }

    /// Channel-first normalized pixels.
    pub fn normalize(&self, image: &RawImage) -> Array3<f32> {
        let size = self.input_size;
        let resized = imageops::resize(image.pixels(), size, size, FilterType::Triangle);
        Array3::from_shape_fn((3, size as usize, size as usize), |(c, y, x)| {
            let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - self.mean[c]) / self.std[c]
        })
    }

    pub fn to_batch(&self, image: &RawImage) -> Result<Tensor, ClassifyError> {
        let side = self.input_size as i64;
        let (data, _) = self.normalize(image).into_raw_vec_and_offset();
        let batch = Tensor::f_from_slice(&data)?.f_view([1, 3, side, side])?;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{solid_image, two_tone_image};

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(&PreprocessingConfig::default())
    }

    #[test]
    fn output_has_model_geometry_for_any_input() {
        let pre = preprocessor();
        for (w, h) in [(13, 7), (224, 224), (640, 480)] {
            let array = pre.normalize(&solid_image(w, h, 120));
            assert_eq!(array.shape(), &[3, 224, 224]);
        }
    }

    #[test]
    fn white_pixels_map_to_channel_normalized_one() {
        let array = preprocessor().normalize(&solid_image(50, 50, 255));
        let expected = [
            (1.0 - 0.485) / 0.229,
            (1.0 - 0.456) / 0.224,
            (1.0 - 0.406) / 0.225,
        ];
        for (c, want) in expected.iter().enumerate() {
            assert!((array[[c, 10, 10]] - want).abs() < 1e-5);
            assert!((array[[c, 223, 0]] - want).abs() < 1e-5);
        }
    }

    #[test]
    fn normalization_is_deterministic() {
        let pre = preprocessor();
        let image = two_tone_image(300, 200, 20, 220);
        assert_eq!(pre.normalize(&image), pre.normalize(&image));
    }

    #[test]
    fn batch_tensor_is_single_item() {
        let batch = preprocessor().to_batch(&solid_image(64, 32, 0)).unwrap();
        assert_eq!(batch.size(), vec![1, 3, 224, 224]);
    }
}
