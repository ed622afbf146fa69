//! SCRFD + ArcFace pipeline producing one embedding per detected face.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{DecodedImage, Embedding};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// SCRFD detection model file name inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// One isolated detector/recognizer pair.
///
/// Inference needs `&mut self`, so concurrent callers each need their own
/// instance.
pub struct FaceEmbedder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceEmbedder {
    /// Load both models from `model_dir`. Fails fast if either file is missing.
    pub fn load(model_dir: &Path, intra_threads: usize) -> Result<Self, EmbedderError> {
        let detector = FaceDetector::load(&scrfd_model_path(model_dir), intra_threads)?;
        let recognizer = FaceRecognizer::load(&arcface_model_path(model_dir), intra_threads)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }

    /// Embed every detected face, in detector order (confidence descending).
    ///
    /// An image with no detectable face yields an empty vector.
    pub fn embed(&mut self, image: &DecodedImage) -> Result<Vec<Embedding>, EmbedderError> {
        let faces = self.detector.detect(image)?;
        if let Some(best) = faces.first() {
            tracing::debug!(
                faces = faces.len(),
                confidence = best.confidence,
                "embedding detected faces"
            );
        }

        faces
            .iter()
            .map(|face| {
                self.recognizer
                    .extract(image, face)
                    .map_err(EmbedderError::from)
            })
            .collect()
    }
}

/// Path to the SCRFD detection model.
pub fn scrfd_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join(SCRFD_MODEL_FILE)
}

/// Path to the ArcFace recognition model.
pub fn arcface_model_path(model_dir: &Path) -> PathBuf {
    model_dir.join(ARCFACE_MODEL_FILE)
}

/// Default model directory: `$XDG_DATA_HOME/facematch/models`, falling back
/// to `~/.local/share/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("models")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths() {
        let dir = Path::new("/opt/models");
        assert_eq!(scrfd_model_path(dir), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(arcface_model_path(dir), PathBuf::from("/opt/models/w600k_r50.onnx"));
    }

    #[test]
    fn test_default_model_dir_suffix() {
        assert!(default_model_dir().ends_with("facematch/models"));
    }

    #[test]
    fn test_load_fails_fast_without_models() {
        let err = FaceEmbedder::load(Path::new("/nonexistent/facematch-models"), 1)
            .err()
            .expect("missing models must fail");
        assert!(matches!(
            err,
            EmbedderError::Detector(DetectorError::ModelNotFound(_))
        ));
    }
}
