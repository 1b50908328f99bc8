//! Embedding gallery loaded from a directory tree.
//!
//! Layout: `<root>/<identity>/<any name>.npy|.json`, one vector per file.
//! Subdirectories and vector files are visited in sorted name order so the
//! identity order (and therefore match tie-breaking) is reproducible.

use crate::types::Embedding;
use crate::vector_file::{self, VectorFileError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("embedding directory not found: {0}")]
    RootNotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no registered identity has a usable embedding")]
    Empty,
}

/// A registered person and their reference embeddings.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub embeddings: Vec<Embedding>,
}

impl Identity {
    /// Usable identities have at least one reference embedding.
    pub fn is_usable(&self) -> bool {
        !self.embeddings.is_empty()
    }
}

/// A vector file that could not be loaded.
#[derive(Debug)]
pub struct SkippedVector {
    pub identity: String,
    pub path: PathBuf,
    pub error: VectorFileError,
}

/// Identities loaded from disk, in enumeration order.
#[derive(Debug, Default)]
pub struct EmbeddingStore {
    identities: Vec<Identity>,
    skipped: Vec<SkippedVector>,
}

impl EmbeddingStore {
    /// Load every identity under `root`.
    pub fn load(root: &Path) -> Result<Self, GalleryError> {
        Self::load_filtered(root, None)
    }

    /// Load identities under `root`, optionally restricted to one name.
    ///
    /// A missing `target` yields an empty store, not an error. Unreadable
    /// vector files are skipped and recorded; only an unreadable `root` fails.
    pub fn load_filtered(root: &Path, target: Option<&str>) -> Result<Self, GalleryError> {
        if !root.is_dir() {
            return Err(GalleryError::RootNotFound(root.to_path_buf()));
        }

        let mut store = Self::default();
        for dir in sorted_entries(root)? {
            if !dir.is_dir() {
                continue;
            }
            let Some(name) = visible_name(&dir) else {
                continue;
            };
            if target.is_some_and(|t| t != name) {
                continue;
            }
            let identity = store.load_identity(name.to_string(), &dir);
            store.identities.push(identity);
        }

        tracing::info!(
            root = %root.display(),
            identities = store.identities.len(),
            embeddings = store.embedding_count(),
            skipped = store.skipped.len(),
            "loaded embedding gallery"
        );
        Ok(store)
    }

    fn load_identity(&mut self, name: String, dir: &Path) -> Identity {
        let files = match sorted_entries(dir) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(identity = %name, error = %e, "cannot list identity directory");
                return Identity {
                    name,
                    embeddings: Vec::new(),
                };
            }
        };

        let mut embeddings = Vec::new();
        for path in files {
            if !path.is_file() || visible_name(&path).is_none() || !vector_file::is_vector_file(&path) {
                continue;
            }
            match vector_file::read_vector(&path) {
                Ok(embedding) => embeddings.push(embedding),
                Err(error) => {
                    tracing::warn!(
                        identity = %name,
                        path = %path.display(),
                        %error,
                        "skipping unreadable embedding file"
                    );
                    self.skipped.push(SkippedVector {
                        identity: name.clone(),
                        path,
                        error,
                    });
                }
            }
        }

        if embeddings.is_empty() {
            tracing::warn!(identity = %name, "identity has no usable embeddings");
        } else {
            tracing::debug!(identity = %name, count = embeddings.len(), "identity loaded");
        }

        Identity { name, embeddings }
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn into_identities(self) -> Vec<Identity> {
        self.identities
    }

    pub fn get(&self, name: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.name == name)
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn embedding_count(&self) -> usize {
        self.identities.iter().map(|i| i.embeddings.len()).sum()
    }

    /// Vector files that failed to load.
    pub fn skipped(&self) -> &[SkippedVector] {
        &self.skipped
    }
}

impl FromIterator<Identity> for EmbeddingStore {
    fn from_iter<T: IntoIterator<Item = Identity>>(iter: T) -> Self {
        Self {
            identities: iter.into_iter().collect(),
            skipped: Vec::new(),
        }
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let io_err = |source| GalleryError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

/// File name as UTF-8, or `None` for hidden or non-UTF-8 names.
fn visible_name(path: &Path) -> Option<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.starts_with('.'))
}
