//! facesort-core: face identity matching and photo routing.
//!
//! Loads a gallery of reference embeddings, finds the best identity for
//! each detected face and routes matching photos into per-identity folders.
//! Detection, image I/O and annotation are supplied by the caller through
//! the traits in [`router`].

pub mod decision;
pub mod discovery;
pub mod gallery;
pub mod index;
pub mod naming;
pub mod router;
pub mod types;
pub mod vector_file;

pub use decision::{accept, DEFAULT_THRESHOLD};
pub use discovery::{discover_photos, DEFAULT_PHOTO_EXTENSIONS};
pub use gallery::{EmbeddingStore, GalleryError, Identity};
pub use index::IdentityIndex;
pub use naming::{DuplicateCounters, DuplicateNameResolver, FlatNamer};
pub use router::{
    Annotator, Detector, ImageCodec, OutputLayout, PhotoRouter, RouteSummary, RouterError,
    RouterOptions,
};
pub use types::{BoundingBox, Embedding, MatchResult, QueryFace, SimilarityError};
