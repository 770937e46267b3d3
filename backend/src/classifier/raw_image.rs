use image::RgbImage;
use ndarray::ArrayView3;

use super::ClassifyError;

/// A decoded upload: 8-bit RGB pixels of whatever size the client sent.
/// Owned by one request and handed to the reclaimer once classified.
#[derive(Debug, Clone)]
pub struct RawImage {
    pixels: RgbImage,
}

impl RawImage {
    pub fn decode(bytes: &[u8]) -> Result<Self, ClassifyError> {
        if bytes.is_empty() {
            return Err(ClassifyError::InvalidImageFormat("empty payload".into()));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ClassifyError::InvalidImageFormat(e.to_string()))?;
        Ok(Self {
            pixels: decoded.to_rgb8(),
        })
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Height x width x channel view over the pixel buffer.
    pub fn channel_view(&self) -> Result<ArrayView3<'_, u8>, ClassifyError> {
        let shape = (self.height() as usize, self.width() as usize, 3);
        ArrayView3::from_shape(shape, self.pixels.as_raw().as_slice())
            .map_err(|e| ClassifyError::AnalysisFailure(e.to_string()))
    }
}
