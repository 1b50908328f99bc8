use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimilarityError {
    #[error("degenerate vector: cosine similarity is undefined for a zero-norm embedding")]
    DegenerateVector,
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
}

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Face embedding vector (typically 512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    #[serde(default)]
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// L2 norm of the vector.
    pub fn norm(&self) -> f32 {
        self.values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// A vector is degenerate when its norm is zero or not finite.
    pub fn is_degenerate(&self) -> bool {
        let norm = self.norm();
        !(norm.is_finite() && norm > 0.0)
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Zero-norm inputs
    /// yield [`SimilarityError::DegenerateVector`] instead of NaN.
    pub fn similarity(&self, other: &Embedding) -> Result<f32, SimilarityError> {
        if self.values.len() != other.values.len() {
            return Err(SimilarityError::DimensionMismatch {
                left: self.values.len(),
                right: other.values.len(),
            });
        }

        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(*a), f64::from(*b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if !(denom.is_finite() && denom > 0.0) {
            return Err(SimilarityError::DegenerateVector);
        }

        Ok((dot / denom).clamp(-1.0, 1.0) as f32)
    }
}

/// One detected face in a photo.
///
/// The region and payload are never inspected by matching; they ride along
/// to the annotator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFace {
    pub embedding: Embedding,
    pub region: BoundingBox,
    /// Detector-specific extras (age, pose, ...), passed through untouched.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl QueryFace {
    pub fn new(embedding: Embedding, region: BoundingBox) -> Self {
        Self {
            embedding,
            region,
            payload: None,
        }
    }
}

/// Best identity for one query face.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: String,
    /// Cosine similarity of the best reference embedding [-1, 1].
    pub similarity: f32,
    pub face: QueryFace,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![0.3, -1.2, 4.0]);
        let b = Embedding::new(vec![0.3, -1.2, 4.0]);
        assert_relative_eq!(a.similarity(&b).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_similarity_scale_invariant() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        let b = Embedding::new(vec![10.0, 20.0, 30.0]);
        assert_relative_eq!(a.similarity(&b).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        assert!(a.similarity(&b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert_relative_eq!(a.similarity(&b).unwrap(), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), Err(SimilarityError::DegenerateVector));
        assert_eq!(b.similarity(&a), Err(SimilarityError::DegenerateVector));
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(
            a.similarity(&b),
            Err(SimilarityError::DimensionMismatch { left: 3, right: 2 })
        );
    }

    #[test]
    fn test_degenerate_detection() {
        assert!(Embedding::new(vec![0.0; 4]).is_degenerate());
        assert!(Embedding::new(vec![f32::NAN, 1.0]).is_degenerate());
        assert!(!Embedding::new(vec![0.0, 0.1]).is_degenerate());
    }

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(a.iou(&a), 1.0, epsilon = 1e-6);
        assert!(a.iou(&bbox(20.0, 20.0, 10.0, 10.0)).abs() < 1e-6);
        // Overlap 5x10 = 50, union 150.
        assert_relative_eq!(a.iou(&bbox(5.0, 0.0, 10.0, 10.0)), 50.0 / 150.0, epsilon = 1e-6);
        assert_eq!(bbox(0.0, 0.0, 0.0, 0.0).iou(&bbox(0.0, 0.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_embedding_json_without_model_version() {
        let e: Embedding = serde_json::from_str(r#"{"values":[1.0,2.0]}"#).unwrap();
        assert_eq!(e.values, vec![1.0, 2.0]);
        assert!(e.model_version.is_none());
    }
}
