//! Per-photo pipeline: detect, match, decide, route.
//!
//! Detection, image I/O and annotation are collaborators behind traits so
//! the routing policy can run against real models or in-memory fakes.

use crate::decision;
use crate::index::IdentityIndex;
use crate::naming::{self, FlatNamer};
use crate::types::{MatchResult, QueryFace};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Folder under the output directory holding annotated copies.
pub const CONFIRM_DIR: &str = "_confirm";

/// Extension of annotated copies.
pub const CONFIRM_EXTENSION: &str = "jpg";

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Reads, writes and copies photos.
pub trait ImageCodec {
    type Image;
    type Error: std::error::Error + Send + Sync + 'static;

    fn read(&self, path: &Path) -> Result<Self::Image, Self::Error>;
    fn write(&self, path: &Path, image: &Self::Image) -> Result<(), Self::Error>;
    /// Copy the original bytes of `src` to `dst`.
    fn copy(&self, src: &Path, dst: &Path) -> Result<(), Self::Error>;
}

/// Finds faces and computes their embeddings.
pub trait Detector<I> {
    type Error: std::error::Error + Send + Sync + 'static;

    fn detect(&mut self, image: &I) -> Result<Vec<QueryFace>, Self::Error>;
}

/// Burns face boxes and labels into a copy of an image.
pub trait Annotator<I> {
    fn draw_overlay(&self, image: &I, faces: &[&QueryFace], labels: &[&str]) -> I;
}

#[derive(Error, Debug)]
pub enum RouterError {
    /// The index holds no identity. `IdentityIndex::new` already refuses an
    /// empty gallery; `run` re-checks because the router only borrows it.
    #[error("no registered faces")]
    GalleryEmpty,
    #[error("no photos found")]
    NoPhotos,
}

/// Failure scoped to a single photo; the batch continues.
#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: BoxError },
    #[error("face detection failed for {path}: {source}")]
    Detect { path: PathBuf, source: BoxError },
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to copy to {path}: {source}")]
    Copy { path: PathBuf, source: BoxError },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: BoxError },
}

/// How routed photos are laid out under each identity folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// Reproduce the path relative to the photo root.
    #[default]
    Mirror,
    /// Drop subdirectories; duplicate base names get a counter suffix.
    Flat,
}

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub photo_root: PathBuf,
    pub output_dir: PathBuf,
    pub threshold: f32,
    pub layout: OutputLayout,
    /// Write annotated copies under [`CONFIRM_DIR`].
    pub confirm: bool,
}

/// A routed photo and the matches that passed the threshold.
#[derive(Debug, Clone)]
pub struct PhotoRecord {
    pub path: PathBuf,
    pub matches: Vec<MatchResult>,
    /// Path under each identity folder the photo was copied to.
    pub relative_path: PathBuf,
}

impl PhotoRecord {
    /// Matched identity names, first-seen order, without repeats.
    pub fn identities(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for m in &self.matches {
            if !names.contains(&m.identity.as_str()) {
                names.push(&m.identity);
            }
        }
        names
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoFaces,
    NoMatch,
}

#[derive(Debug)]
pub enum PhotoOutcome {
    Skipped(SkipReason),
    Routed(PhotoRecord),
}

/// Running counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSummary {
    pub found: usize,
    pub processed: usize,
    pub matched: usize,
    pub skipped: usize,
    pub failed: usize,
    pub faces_detected: usize,
    /// Faces whose embedding could not be compared (degenerate or wrong size).
    pub faces_unscorable: usize,
    /// Photos fully written per identity (copy plus annotated copy when
    /// enabled).
    pub copies: BTreeMap<String, usize>,
}

/// Routes photos into per-identity folders.
pub struct PhotoRouter<'a, C, D, A> {
    index: &'a IdentityIndex,
    codec: C,
    detector: D,
    annotator: A,
    options: RouterOptions,
    summary: RouteSummary,
    /// Annotated copy paths handed out this run.
    confirm_issued: HashSet<PathBuf>,
}

impl<'a, C, D, A> PhotoRouter<'a, C, D, A>
where
    C: ImageCodec,
    D: Detector<C::Image>,
    A: Annotator<C::Image>,
{
    pub fn new(
        index: &'a IdentityIndex,
        codec: C,
        detector: D,
        annotator: A,
        options: RouterOptions,
    ) -> Self {
        Self {
            index,
            codec,
            detector,
            annotator,
            options,
            summary: RouteSummary::default(),
            confirm_issued: HashSet::new(),
        }
    }

    /// Route every photo in order. Only global preconditions fail the run;
    /// per-photo errors are logged and counted.
    pub fn run(&mut self, photos: &[PathBuf]) -> Result<RouteSummary, RouterError> {
        if self.index.is_empty() {
            return Err(RouterError::GalleryEmpty);
        }
        if photos.is_empty() {
            return Err(RouterError::NoPhotos);
        }

        self.summary = RouteSummary {
            found: photos.len(),
            ..RouteSummary::default()
        };
        self.confirm_issued.clear();
        tracing::info!(found = photos.len(), "found photos");

        let mut namer = match self.options.layout {
            OutputLayout::Flat => Some(FlatNamer::new(photos)),
            OutputLayout::Mirror => None,
        };

        for (i, path) in photos.iter().enumerate() {
            tracing::info!(
                photo = %path.display(),
                n = i + 1,
                total = photos.len(),
                "processing photo"
            );

            match self.process_photo(path, namer.as_mut()) {
                Ok(PhotoOutcome::Routed(record)) => {
                    self.summary.matched += 1;
                    tracing::info!(
                        photo = %path.display(),
                        identities = ?record.identities(),
                        "photo routed"
                    );
                }
                Ok(PhotoOutcome::Skipped(reason)) => {
                    self.summary.skipped += 1;
                    tracing::info!(photo = %path.display(), ?reason, "photo skipped");
                }
                Err(error) => {
                    self.summary.failed += 1;
                    tracing::warn!(%error, "photo failed");
                }
            }
            self.summary.processed += 1;

            tracing::info!(
                processed = self.summary.processed,
                matched = self.summary.matched,
                skipped = self.summary.skipped,
                failed = self.summary.failed,
                "progress"
            );
        }

        Ok(self.summary.clone())
    }

    /// Run one photo through detection, matching and routing.
    ///
    /// `namer` must be given in flat layout and is consulted at most once,
    /// only when the photo is actually routed.
    pub fn process_photo(
        &mut self,
        path: &Path,
        namer: Option<&mut FlatNamer>,
    ) -> Result<PhotoOutcome, PhotoError> {
        let image = self.codec.read(path).map_err(|e| PhotoError::Read {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        let faces = self.detector.detect(&image).map_err(|e| PhotoError::Detect {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        self.summary.faces_detected += faces.len();
        tracing::debug!(photo = %path.display(), faces = faces.len(), "faces detected");

        if faces.is_empty() {
            return Ok(PhotoOutcome::Skipped(SkipReason::NoFaces));
        }

        let matches = self.match_faces(&faces);
        if matches.is_empty() {
            return Ok(PhotoOutcome::Skipped(SkipReason::NoMatch));
        }

        let relative_path = match namer {
            Some(namer) => PathBuf::from(namer.file_name(path)),
            None => self.mirrored_path(path),
        };

        let record = PhotoRecord {
            path: path.to_path_buf(),
            matches,
            relative_path,
        };
        self.write_outputs(&image, &record)?;
        Ok(PhotoOutcome::Routed(record))
    }

    /// Best identity per face, keeping those over the threshold.
    fn match_faces(&mut self, faces: &[QueryFace]) -> Vec<MatchResult> {
        let mut accepted = Vec::new();
        for (i, face) in faces.iter().enumerate() {
            match self.index.best_match(face) {
                Ok(result) if decision::accept(&result, self.options.threshold) => {
                    tracing::info!(
                        identity = %result.identity,
                        similarity = result.similarity,
                        "matched face"
                    );
                    accepted.push(result);
                }
                Ok(result) => {
                    tracing::debug!(
                        face = i,
                        identity = %result.identity,
                        similarity = result.similarity,
                        "best match below threshold"
                    );
                }
                Err(error) => {
                    self.summary.faces_unscorable += 1;
                    tracing::warn!(face = i, %error, "skipping face");
                }
            }
        }
        accepted
    }

    fn mirrored_path(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.options.photo_root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            _ => PathBuf::from(naming::base_name(path)),
        }
    }

    fn write_outputs(&mut self, image: &C::Image, record: &PhotoRecord) -> Result<(), PhotoError> {
        let annotated = if self.options.confirm {
            let faces: Vec<&QueryFace> = record.matches.iter().map(|m| &m.face).collect();
            let labels: Vec<&str> = record.matches.iter().map(|m| m.identity.as_str()).collect();
            Some(self.annotator.draw_overlay(image, &faces, &labels))
        } else {
            None
        };

        for identity in record.identities() {
            let dst = self.options.output_dir.join(identity).join(&record.relative_path);
            ensure_parent(&dst)?;
            self.codec.copy(&record.path, &dst).map_err(|e| PhotoError::Copy {
                path: dst.clone(),
                source: Box::new(e),
            })?;
            tracing::info!(path = %dst.display(), "saved");

            if let Some(annotated) = &annotated {
                let confirm = self.issue_confirm_path(identity, &record.relative_path);
                ensure_parent(&confirm)?;
                self.codec.write(&confirm, annotated).map_err(|e| PhotoError::Write {
                    path: confirm.clone(),
                    source: Box::new(e),
                })?;
                tracing::debug!(path = %confirm.display(), "saved annotated copy");
            }
            *self.summary.copies.entry(identity.to_string()).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Annotated copy path not yet used in this run.
    ///
    /// Forcing the `.jpg` extension can fold `a.jpg` and `a.png` onto one
    /// name; later arrivals get `a(1).jpg`, `a(2).jpg`, ...
    fn issue_confirm_path(&mut self, identity: &str, relative: &Path) -> PathBuf {
        let base = confirm_path(&self.options.output_dir, identity, relative);
        let mut candidate = base.clone();
        let mut n = 0usize;
        while self.confirm_issued.contains(&candidate) {
            n += 1;
            let name = naming::insert_suffix(&naming::base_name(&base), &format!("({n})"));
            candidate = base.with_file_name(name);
        }
        if n > 0 {
            tracing::debug!(path = %candidate.display(), "annotated copy name taken, suffixed");
        }
        self.confirm_issued.insert(candidate.clone());
        candidate
    }
}

/// Path of the annotated copy for `relative` routed to `identity`.
pub fn confirm_path(output_dir: &Path, identity: &str, relative: &Path) -> PathBuf {
    output_dir
        .join(CONFIRM_DIR)
        .join(identity)
        .join(relative)
        .with_extension(CONFIRM_EXTENSION)
}

fn ensure_parent(path: &Path) -> Result<(), PhotoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PhotoError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
