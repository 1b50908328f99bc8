//! ArcFace embeddings (buffalo_l `w600k_r50`) on ONNX Runtime.
//!
//! Each detected face is warped to the canonical 112x112 crop and turned
//! into a 512-d identity vector.

use crate::alignment::{self, ALIGNED_SIZE};
use facesort_core::{BoundingBox, Embedding};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// Symmetric normalization to [-1, 1]; SCRFD divides by 128 instead.
const PIXEL_CENTER: f32 = 127.5;
const PIXEL_SCALE: f32 = 127.5;
pub const ARCFACE_EMBEDDING_DIM: usize = 512;
const MODEL_TAG: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0}; download buffalo_l from insightface and set FACESORT_MODEL_DIR")]
    ModelNotFound(String),
    #[error("unexpected recognizer output: {0}")]
    InferenceFailed(String),
    #[error("detection carries no landmarks, cannot align face")]
    NoLandmarks,
    #[error("onnx runtime: {0}")]
    Ort(#[from] ort::Error),
}

/// Turns aligned face crops into embeddings.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, RecognizerError> {
        if !model_path.is_file() {
            return Err(RecognizerError::ModelNotFound(model_path.display().to_string()));
        }
        let session = crate::session::open(model_path, intra_threads, "arcface")?;
        Ok(Self { session })
    }

    /// Embed the face at `face` in `image`.
    ///
    /// The vector is returned as the model produced it, without
    /// L2 normalization; a zero output therefore stays detectable.
    pub fn extract(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Embedding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let crop = alignment::align_face(image, landmarks);
        let tensor = to_tensor(&crop);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;
        let (_, values) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(e.to_string()))?;

        if values.len() != ARCFACE_EMBEDDING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "{} values, wanted {ARCFACE_EMBEDDING_DIM}",
                values.len()
            )));
        }

        let mut embedding = Embedding::new(values.to_vec());
        embedding.model_version = Some(MODEL_TAG.to_string());
        Ok(embedding)
    }
}

/// 112x112 RGB crop to a `[1, 3, 112, 112]` float tensor.
fn to_tensor(crop: &RgbImage) -> Array4<f32> {
    let side = ALIGNED_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, px) in crop.enumerate_pixels() {
        for (c, &v) in px.0.iter().enumerate() {
            tensor[[0, c, y as usize, x as usize]] = (f32::from(v) - PIXEL_CENTER) / PIXEL_SCALE;
        }
    }
    tensor
}
