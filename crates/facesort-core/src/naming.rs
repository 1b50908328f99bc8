//! Collision-free filenames for flattened output.
//!
//! When the source subdirectory structure is dropped, `x/a.jpg` and
//! `y/a.jpg` would land on the same name. Base names that occur more than
//! once in the whole input set get a counter suffix in processing order:
//! `a.jpg`, `a(1).jpg`, `a(2).jpg`, ...

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// Final path component as a string.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Base filenames that occur more than once across `paths`.
pub fn detect_duplicate_base_names<P: AsRef<Path>>(paths: &[P]) -> BTreeSet<String> {
    let mut seen = HashSet::new();
    let mut duplicates = BTreeSet::new();
    for path in paths {
        let name = base_name(path.as_ref());
        if !seen.insert(name.clone()) {
            duplicates.insert(name);
        }
    }
    duplicates
}

/// Insert `suffix` before the extension: `photo.jpg` + `(1)` -> `photo(1).jpg`.
pub fn insert_suffix(file_name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    }
}

/// Per-base-name occurrence counters, owned by the caller for one run.
#[derive(Debug, Default, Clone)]
pub struct DuplicateCounters {
    counts: HashMap<String, usize>,
}

impl DuplicateCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current count for `name`, then advance it.
    fn take(&mut self, name: &str) -> usize {
        let count = self.counts.entry(name.to_string()).or_insert(0);
        let current = *count;
        *count += 1;
        current
    }

    /// How many occurrences of `name` have been seen so far.
    pub fn get(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }
}

/// Assigns suffixes to paths whose base name is duplicated in the input.
#[derive(Debug, Clone)]
pub struct DuplicateNameResolver {
    duplicates: BTreeSet<String>,
}

impl DuplicateNameResolver {
    /// Compute the duplicate set once over the full discovered file list.
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self {
            duplicates: detect_duplicate_base_names(paths),
        }
    }

    pub fn duplicates(&self) -> &BTreeSet<String> {
        &self.duplicates
    }

    pub fn is_duplicate(&self, path: &Path) -> bool {
        self.duplicates.contains(&base_name(path))
    }

    /// Suffix for the next occurrence of `path`'s base name.
    ///
    /// `""` for unique names and for the first occurrence of a duplicated
    /// one, then `"(1)"`, `"(2)"`, ... Each call on a duplicated name
    /// advances its counter.
    pub fn next_suffix(&self, path: &Path, counters: &mut DuplicateCounters) -> String {
        let name = base_name(path);
        if !self.duplicates.contains(&name) {
            return String::new();
        }
        match counters.take(&name) {
            0 => String::new(),
            n => format!("({n})"),
        }
    }
}

/// Flat filename assignment for a whole run.
///
/// Wraps the resolver with its counters and remembers every name issued, so
/// a generated `a(1).jpg` can never collide with a literal `a(1).jpg` from
/// the input. On such a clash the counter for the base name keeps advancing
/// until a free name is found.
#[derive(Debug)]
pub struct FlatNamer {
    resolver: DuplicateNameResolver,
    counters: DuplicateCounters,
    issued: HashSet<String>,
}

impl FlatNamer {
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Self {
        Self {
            resolver: DuplicateNameResolver::new(paths),
            counters: DuplicateCounters::new(),
            issued: HashSet::new(),
        }
    }

    pub fn resolver(&self) -> &DuplicateNameResolver {
        &self.resolver
    }

    /// Output filename for `path`. Call once per routed photo, in
    /// processing order.
    pub fn file_name(&mut self, path: &Path) -> String {
        let base = base_name(path);
        let suffix = self.resolver.next_suffix(path, &mut self.counters);
        let mut name = insert_suffix(&base, &suffix);

        while self.issued.contains(&name) {
            let n = self.counters.take(&base);
            if n > 0 {
                name = insert_suffix(&base, &format!("({n})"));
            }
        }

        tracing::trace!(path = %path.display(), name = %name, "flat name assigned");
        self.issued.insert(name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_no_duplicates() {
        let files = paths(&["a.jpg", "b.jpg"]);
        let resolver = DuplicateNameResolver::new(&files);
        assert!(resolver.duplicates().is_empty());

        let mut counters = DuplicateCounters::new();
        for f in &files {
            assert_eq!(resolver.next_suffix(f, &mut counters), "");
        }
        assert_eq!(resolver.next_suffix(Path::new("a.jpg"), &mut counters), "");
    }

    #[test]
    fn test_single_file() {
        assert!(detect_duplicate_base_names(&paths(&["a.jpg"])).is_empty());
    }

    #[test]
    fn test_duplicates_across_directories() {
        let dups = detect_duplicate_base_names(&paths(&["x/a.jpg", "y/a.jpg"]));
        assert_eq!(dups.into_iter().collect::<Vec<_>>(), ["a.jpg"]);
    }

    #[test]
    fn test_suffix_sequence() {
        let files = paths(&["a.jpg", "x/a.jpg", "b.jpg"]);
        let resolver = DuplicateNameResolver::new(&files);
        assert_eq!(resolver.duplicates().iter().collect::<Vec<_>>(), ["a.jpg"]);

        let mut counters = DuplicateCounters::new();
        assert_eq!(resolver.next_suffix(Path::new("a.jpg"), &mut counters), "");
        assert_eq!(resolver.next_suffix(Path::new("x/a.jpg"), &mut counters), "(1)");
        assert_eq!(resolver.next_suffix(Path::new("b.jpg"), &mut counters), "");
        assert_eq!(resolver.next_suffix(Path::new("y/z/a.jpg"), &mut counters), "(2)");
        assert_eq!(counters.get("a.jpg"), 3);
        assert_eq!(counters.get("b.jpg"), 0);
    }

    #[test]
    fn test_fresh_counters_restart() {
        let files = paths(&["x/a.jpg", "y/a.jpg"]);
        let resolver = DuplicateNameResolver::new(&files);

        let mut first = DuplicateCounters::new();
        resolver.next_suffix(&files[0], &mut first);
        assert_eq!(resolver.next_suffix(&files[1], &mut first), "(1)");

        let mut second = DuplicateCounters::new();
        assert_eq!(resolver.next_suffix(&files[1], &mut second), "");
    }

    #[test]
    fn test_insert_suffix() {
        assert_eq!(insert_suffix("photo.jpg", "(1)"), "photo(1).jpg");
        assert_eq!(insert_suffix("photo.jpg", ""), "photo.jpg");
        assert_eq!(insert_suffix("IMG_0001.HEIC", "(12)"), "IMG_0001(12).HEIC");
        assert_eq!(insert_suffix("noext", "(2)"), "noext(2)");
        assert_eq!(insert_suffix("a.b.png", "(1)"), "a.b(1).png");
    }

    #[test]
    fn test_flat_namer_unique_names() {
        let files = paths(&["a.jpg", "x/a.jpg", "y/a.jpg", "b.jpg"]);
        let mut namer = FlatNamer::new(&files);
        let names: Vec<_> = files.iter().map(|f| namer.file_name(f)).collect();
        assert_eq!(names, ["a.jpg", "a(1).jpg", "a(2).jpg", "b.jpg"]);
    }

    #[test]
    fn test_flat_namer_avoids_literal_collision() {
        // A literal "a(1).jpg" is already in the input and routed first.
        let files = paths(&["a(1).jpg", "x/a.jpg", "y/a.jpg"]);
        let mut namer = FlatNamer::new(&files);
        let names: Vec<_> = files.iter().map(|f| namer.file_name(f)).collect();
        assert_eq!(names, ["a(1).jpg", "a.jpg", "a(2).jpg"]);
    }

    #[test]
    fn test_flat_namer_literal_after_generated() {
        let files = paths(&["x/a.jpg", "y/a.jpg", "z/a(1).jpg"]);
        let mut namer = FlatNamer::new(&files);
        let names: Vec<_> = files.iter().map(|f| namer.file_name(f)).collect();
        assert_eq!(names, ["a.jpg", "a(1).jpg", "a(1)(1).jpg"]);

        let unique: HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
