use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
///
/// Two embeddings are only comparable when the same model produced both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Build an embedding without a model version tag.
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Accumulates in f64 so that scores derived from the distance are
    /// stable across platforms.
    pub fn euclidean_distance(&self, other: &Embedding) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| {
                let d = f64::from(*a) - f64::from(*b);
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }
}

/// A validated, fully parsed image ready for face detection.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pixels: RgbImage,
    format: Option<ImageFormat>,
}

impl DecodedImage {
    pub fn new(pixels: RgbImage, format: ImageFormat) -> Self {
        Self {
            pixels,
            format: Some(format),
        }
    }

    /// Wrap raw RGB pixels that did not come from an encoded container.
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self {
            pixels,
            format: None,
        }
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

    /// Container format the image was decoded from, if any.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.3, -0.2, 0.9]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_euclidean_distance_symmetric() {
        let a = Embedding::new(vec![0.1, 0.5, -0.7]);
        let b = Embedding::new(vec![-0.4, 0.2, 0.3]);
        assert_eq!(a.euclidean_distance(&b), b.euclidean_distance(&a));
    }

    #[test]
    fn test_decoded_image_dimensions() {
        let image = DecodedImage::new(RgbImage::new(64, 48), ImageFormat::Png);
        assert_eq!(image.width(), 64);
        assert_eq!(image.height(), 48);
        assert_eq!(image.format(), Some(ImageFormat::Png));
        assert_eq!(DecodedImage::from_rgb(RgbImage::new(1, 1)).format(), None);
    }
}
