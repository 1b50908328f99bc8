//! Photo discovery: recursive walk in a stable order.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions picked up when none are configured.
pub const DEFAULT_PHOTO_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Find every photo under `root` whose extension is in `extensions`
/// (case-insensitive).
///
/// Directory entries are sorted by file name at each level, so the returned
/// order is the same on every run over an unchanged tree. That order is the
/// processing order used for duplicate-name suffixes.
pub fn discover_photos<S: AsRef<str>>(root: &Path, extensions: &[S]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(%error, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_extension(p, extensions))
        .collect()
}

fn has_extension<S: AsRef<str>>(path: &Path, extensions: &[S]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| ext.eq_ignore_ascii_case(want.as_ref())))
}
