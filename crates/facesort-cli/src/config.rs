use anyhow::{bail, Context, Result};
use facesort_core::{DEFAULT_PHOTO_EXTENSIONS, DEFAULT_THRESHOLD};
use facesort_vision::analyzer::AnalyzerConfig;
use facesort_vision::codec::can_decode_extension;
use facesort_vision::detector::SCRFD_CONFIDENCE_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File looked up in the working directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "facesort.toml";

/// CLI configuration: defaults, then a TOML file, then `FACESORT_*`
/// environment variables. Command-line flags are applied last by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of `<identity>/<vector file>` reference embeddings.
    pub embedding_dir: PathBuf,
    /// Where routed photos are written.
    pub output_dir: PathBuf,
    /// Where `register` writes face crops and embeddings.
    pub register_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Minimum cosine similarity for a face to be routed.
    pub threshold: f32,
    /// Drop subdirectories in routed paths.
    pub flatten: bool,
    /// Write annotated confirmation copies.
    pub confirm: bool,
    /// Photo extensions, lower-case, without the dot.
    pub extensions: Vec<String>,
    /// SCRFD score threshold.
    pub detector_threshold: f32,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_dir: PathBuf::from("registered_faces"),
            output_dir: PathBuf::from("output"),
            register_dir: PathBuf::from("detected"),
            model_dir: facesort_vision::default_model_dir(),
            threshold: DEFAULT_THRESHOLD,
            flatten: false,
            confirm: true,
            extensions: DEFAULT_PHOTO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            detector_threshold: SCRFD_CONFIDENCE_THRESHOLD,
            intra_threads: 2,
        }
    }
}

/// On-disk shape of `facesort.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    embedding_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    register_dir: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    threshold: Option<f32>,
    flatten: Option<bool>,
    confirm: Option<bool>,
    extensions: Option<Vec<String>>,
    detector_threshold: Option<f32>,
    intra_threads: Option<usize>,
}

impl Config {
    /// Resolve configuration from the process environment.
    ///
    /// `explicit` (from `--config`) and `FACESORT_CONFIG` must point at an
    /// existing file; `./facesort.toml` is used only if present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    fn load_with(explicit: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        let file = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => match lookup("FACESORT_CONFIG") {
                Some(path) => Some(PathBuf::from(path)),
                None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.is_file()),
            },
        };

        if let Some(path) = file {
            if !path.is_file() {
                bail!("config file not found: {}", path.display());
            }
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            config
                .apply_toml(&text)
                .with_context(|| format!("invalid config file {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config file");
        }

        config.apply_env(lookup);
        config.validate()?;
        Ok(config)
    }

    fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;
        if let Some(v) = file.embedding_dir {
            self.embedding_dir = v;
        }
        if let Some(v) = file.output_dir {
            self.output_dir = v;
        }
        if let Some(v) = file.register_dir {
            self.register_dir = v;
        }
        if let Some(v) = file.model_dir {
            self.model_dir = v;
        }
        if let Some(v) = file.threshold {
            self.threshold = v;
        }
        if let Some(v) = file.flatten {
            self.flatten = v;
        }
        if let Some(v) = file.confirm {
            self.confirm = v;
        }
        if let Some(v) = file.extensions {
            self.extensions = normalize_extensions(v.iter().map(String::as_str));
        }
        if let Some(v) = file.detector_threshold {
            self.detector_threshold = v;
        }
        if let Some(v) = file.intra_threads {
            self.intra_threads = v;
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACESORT_EMBEDDING_DIR") {
            self.embedding_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACESORT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACESORT_REGISTER_DIR") {
            self.register_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACESORT_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        self.threshold = env_parse(&lookup, "FACESORT_THRESHOLD", self.threshold);
        self.flatten = env_bool(&lookup, "FACESORT_FLATTEN", self.flatten);
        self.confirm = env_bool(&lookup, "FACESORT_CONFIRM", self.confirm);
        if let Some(v) = lookup("FACESORT_EXTENSIONS") {
            self.extensions = normalize_extensions(v.split(','));
        }
        self.detector_threshold =
            env_parse(&lookup, "FACESORT_DETECTOR_THRESHOLD", self.detector_threshold);
        self.intra_threads = env_parse(&lookup, "FACESORT_INTRA_THREADS", self.intra_threads);
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            bail!("threshold must be a finite number");
        }
        if !(0.0..=1.0).contains(&self.detector_threshold) {
            bail!("detector_threshold must be within [0, 1], got {}", self.detector_threshold);
        }
        if self.extensions.is_empty() {
            bail!("at least one photo extension is required");
        }
        if let Some(ext) = self.extensions.iter().find(|e| !can_decode_extension(e)) {
            bail!("photo extension {ext:?} has no image decoder");
        }
        if self.intra_threads == 0 {
            bail!("intra_threads must be at least 1");
        }
        Ok(())
    }

    pub fn analyzer(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            model_dir: self.model_dir.clone(),
            detector_threshold: self.detector_threshold,
            intra_threads: self.intra_threads,
        }
    }
}

fn normalize_extensions<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    raw.map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

fn env_parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
                current
            }
        },
        None => current,
    }
}

fn env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        Some(v) => {
            tracing::warn!(key, value = %v, "ignoring unparseable environment value");
            current
        }
        None => current,
    }
}
