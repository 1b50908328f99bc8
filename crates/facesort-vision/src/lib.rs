//! facesort-vision: face detection, embedding and photo I/O.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference, plus the `image`-backed
//! codec and annotator the photo router writes through.

pub mod alignment;
pub mod analyzer;
pub mod annotate;
pub mod codec;
pub mod detector;
mod font;
pub mod recognizer;
mod session;

pub use analyzer::{AnalyzerConfig, AnalyzerError, FaceAnalyzer};
pub use annotate::BoxAnnotator;
pub use codec::{CodecError, PhotoCodec};
pub use detector::{DetectorError, FaceDetector};
pub use recognizer::{FaceRecognizer, RecognizerError};

use std::path::PathBuf;

/// Where insightface unpacks the buffalo_l model pack.
pub fn default_model_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".insightface/models/buffalo_l")
}
