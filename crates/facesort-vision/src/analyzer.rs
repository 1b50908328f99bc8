//! Detection plus embedding extraction, the `Detector` the router consumes.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use facesort_core::{Detector, QueryFace};
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

/// SCRFD model file inside the model directory.
pub const DETECTION_MODEL: &str = "det_10g.onnx";
/// ArcFace model file inside the model directory.
pub const RECOGNITION_MODEL: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Settings for loading both models.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub model_dir: PathBuf,
    pub detector_threshold: f32,
    pub intra_threads: usize,
}

impl AnalyzerConfig {
    pub fn detection_model(&self) -> PathBuf {
        self.model_dir.join(DETECTION_MODEL)
    }

    pub fn recognition_model(&self) -> PathBuf {
        self.model_dir.join(RECOGNITION_MODEL)
    }
}

/// Finds faces in a photo and embeds each one.
pub struct FaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceAnalyzer {
    /// Load both models. Fails fast if either file is missing.
    pub fn load(config: &AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&config.detection_model(), config.intra_threads)?
            .with_confidence_threshold(config.detector_threshold);
        let recognizer = FaceRecognizer::load(&config.recognition_model(), config.intra_threads)?;
        tracing::info!(model_dir = %config.model_dir.display(), "face analyzer ready");
        Ok(Self {
            detector,
            recognizer,
        })
    }

    /// Detect every face in `image` and extract its embedding.
    ///
    /// Faces are returned in detector order (highest confidence first).
    /// Detections without landmarks cannot be aligned and are dropped.
    pub fn analyze(&mut self, image: &RgbImage) -> Result<Vec<QueryFace>, AnalyzerError> {
        let boxes = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(boxes.len());

        for region in boxes {
            if region.landmarks.is_none() {
                tracing::debug!(confidence = region.confidence, "dropping detection without landmarks");
                continue;
            }
            let embedding = self.recognizer.extract(image, &region)?;
            faces.push(QueryFace::new(embedding, region));
        }

        Ok(faces)
    }
}

impl Detector<RgbImage> for FaceAnalyzer {
    type Error = AnalyzerError;

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<QueryFace>, AnalyzerError> {
        self.analyze(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_model_paths() {
        let cfg = AnalyzerConfig {
            model_dir: PathBuf::from("/models/buffalo_l"),
            detector_threshold: 0.5,
            intra_threads: 1,
        };
        assert_eq!(cfg.detection_model(), Path::new("/models/buffalo_l/det_10g.onnx"));
        assert_eq!(cfg.recognition_model(), Path::new("/models/buffalo_l/w600k_r50.onnx"));
    }

    #[test]
    fn test_missing_models_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AnalyzerConfig {
            model_dir: dir.path().to_path_buf(),
            detector_threshold: 0.5,
            intra_threads: 1,
        };
        let err = FaceAnalyzer::load(&cfg).err().unwrap();
        assert!(matches!(err, AnalyzerError::Detector(DetectorError::ModelNotFound(_))));
    }
}
