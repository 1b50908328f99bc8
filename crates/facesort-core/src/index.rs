//! Nearest-identity lookup over an in-memory gallery.

use crate::gallery::{EmbeddingStore, GalleryError, Identity};
use crate::types::{Embedding, MatchResult, QueryFace, SimilarityError};

/// Read-only index answering "which identity is this face closest to".
///
/// Exact linear scan: every reference embedding of every identity is
/// compared. An identity scores the maximum similarity over its references.
/// Ties across identities go to the identity enumerated first.
#[derive(Debug)]
pub struct IdentityIndex {
    identities: Vec<Identity>,
    dim: usize,
}

impl IdentityIndex {
    /// Build an index from a loaded store.
    ///
    /// Identities without embeddings are dropped, as are references whose
    /// dimension differs from the first reference seen. Fails with
    /// [`GalleryError::Empty`] when nothing usable remains.
    pub fn new(store: EmbeddingStore) -> Result<Self, GalleryError> {
        let mut dim = None;
        let mut identities = Vec::new();

        for mut identity in store.into_identities() {
            identity.embeddings.retain(|e| {
                let expected = *dim.get_or_insert(e.dim());
                if e.dim() != expected {
                    tracing::warn!(
                        identity = %identity.name,
                        expected,
                        actual = e.dim(),
                        "dropping reference embedding with mismatched dimension"
                    );
                }
                e.dim() == expected
            });

            if identity.is_usable() {
                identities.push(identity);
            } else {
                tracing::warn!(identity = %identity.name, "identity excluded from matching: no embeddings");
            }
        }

        match dim {
            Some(dim) if !identities.is_empty() => Ok(Self { identities, dim }),
            _ => Err(GalleryError::Empty),
        }
    }

    /// Embedding dimension shared by every reference.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    /// Find the best matching identity for one detected face.
    pub fn best_match(&self, face: &QueryFace) -> Result<MatchResult, SimilarityError> {
        let (idx, similarity) = self.best_identity(&face.embedding)?;
        Ok(MatchResult {
            identity: self.identities[idx].name.clone(),
            similarity,
            face: face.clone(),
        })
    }

    /// Index and score of the best identity for `query`.
    pub fn best_identity(&self, query: &Embedding) -> Result<(usize, f32), SimilarityError> {
        if query.dim() != self.dim {
            return Err(SimilarityError::DimensionMismatch {
                left: query.dim(),
                right: self.dim,
            });
        }
        if query.is_degenerate() {
            return Err(SimilarityError::DegenerateVector);
        }

        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx = 0;

        for (i, identity) in self.identities.iter().enumerate() {
            let sim = identity_score(identity, query)?;
            // Strict comparison keeps the first-enumerated identity on ties.
            if sim > best_sim {
                best_sim = sim;
                best_idx = i;
            }
        }

        Ok((best_idx, best_sim))
    }

    /// Score every face against the index, best first.
    ///
    /// Faces whose embedding cannot be compared are logged and left out.
    pub fn rank_faces(&self, faces: &[QueryFace]) -> Vec<MatchResult> {
        let mut results: Vec<MatchResult> = faces
            .iter()
            .enumerate()
            .filter_map(|(i, face)| match self.best_match(face) {
                Ok(result) => Some(result),
                Err(error) => {
                    tracing::warn!(face = i, %error, "face cannot be scored");
                    None
                }
            })
            .collect();

        // Stable sort: equal scores keep detector order.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results
    }
}

/// Maximum similarity between `query` and any reference of `identity`.
fn identity_score(identity: &Identity, query: &Embedding) -> Result<f32, SimilarityError> {
    let mut best = f32::NEG_INFINITY;
    for reference in &identity.embeddings {
        best = best.max(query.similarity(reference)?);
    }
    Ok(best)
}
