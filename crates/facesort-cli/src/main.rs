mod config;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use facesort_core::vector_file::write_npy;
use facesort_core::{
    discover_photos, Annotator, EmbeddingStore, GalleryError, IdentityIndex, MatchResult, OutputLayout, PhotoRouter,
    QueryFace, RouteSummary, RouterOptions,
};
use facesort_vision::codec::{read_rgb, write_rgb};
use facesort_vision::{BoxAnnotator, FaceAnalyzer, PhotoCodec};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facesort", version, about = "Sort photos into per-person folders by face")]
struct Cli {
    /// TOML configuration file (default: $FACESORT_CONFIG or ./facesort.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every photo containing a registered face into that person's folder
    Identify {
        /// Directory searched recursively for photos
        photo_dir: PathBuf,
        /// Registered embeddings, one subdirectory per person
        #[arg(long)]
        embedding_dir: Option<PathBuf>,
        /// Destination root for the per-person folders
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Minimum cosine similarity for a match
        #[arg(long)]
        threshold: Option<f32>,
        /// Put every photo directly in the person's folder
        #[arg(long)]
        flatten: bool,
        /// Skip the annotated copies under _confirm/
        #[arg(long)]
        no_confirm: bool,
    },
    /// Extract one embedding file per face found in an image
    Register {
        /// Image with the face(s) to register
        image: PathBuf,
        /// Where face_<n>.npy and result.jpg are written [default: register_dir]
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Score every face in an image against one registered person
    Check {
        /// Image to check
        image: PathBuf,
        /// Registered person to compare against
        #[arg(short, long)]
        user: String,
        /// Registered embeddings, one subdirectory per person
        #[arg(long)]
        embedding_dir: Option<PathBuf>,
        /// Only report the best N faces
        #[arg(long)]
        top_n: Option<usize>,
        /// Annotated output image
        #[arg(short, long, default_value = "check.jpg")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(model_dir) = cli.model_dir {
        config.model_dir = model_dir;
    }

    match cli.command {
        Commands::Identify {
            photo_dir,
            embedding_dir,
            output_dir,
            threshold,
            flatten,
            no_confirm,
        } => {
            if let Some(dir) = embedding_dir {
                config.embedding_dir = dir;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            if let Some(t) = threshold {
                config.threshold = t;
            }
            config.flatten |= flatten;
            config.confirm &= !no_confirm;
            config.validate()?;
            identify(&config, &photo_dir)
        }
        Commands::Register { image, output_dir } => {
            if let Some(dir) = output_dir {
                config.register_dir = dir;
            }
            register(&config, &image)
        }
        Commands::Check {
            image,
            user,
            embedding_dir,
            top_n,
            output,
        } => {
            if let Some(dir) = embedding_dir {
                config.embedding_dir = dir;
            }
            check(&config, &image, &user, top_n, &output)
        }
    }
}

fn identify(config: &Config, photo_dir: &Path) -> Result<()> {
    if !photo_dir.is_dir() {
        bail!("photo directory not found: {}", photo_dir.display());
    }

    let store = EmbeddingStore::load(&config.embedding_dir)
        .with_context(|| format!("failed to load embeddings from {}", config.embedding_dir.display()))?;
    let index = match IdentityIndex::new(store) {
        Ok(index) => index,
        Err(GalleryError::Empty) => bail!(
            "no registered faces in {}; run `facesort register` and move face_<n>.npy files into <name>/ folders",
            config.embedding_dir.display()
        ),
        Err(e) => return Err(e.into()),
    };
    println!("Loaded {} registered people", index.len());

    let photos = discover_photos(photo_dir, &config.extensions);
    if photos.is_empty() {
        bail!(
            "no photos found in {} (extensions: {})",
            photo_dir.display(),
            config.extensions.join(", ")
        );
    }

    let analyzer = FaceAnalyzer::load(&config.analyzer()).context("failed to load face models")?;
    let options = RouterOptions {
        photo_root: photo_dir.to_path_buf(),
        output_dir: config.output_dir.clone(),
        threshold: config.threshold,
        layout: if config.flatten {
            OutputLayout::Flat
        } else {
            OutputLayout::Mirror
        },
        confirm: config.confirm,
    };

    let mut router = PhotoRouter::new(&index, PhotoCodec::new(), analyzer, BoxAnnotator::new(), options);
    let summary = router.run(&photos)?;
    print_summary(&summary, &config.output_dir);
    Ok(())
}

fn print_summary(summary: &RouteSummary, output_dir: &Path) {
    println!();
    println!("Photos found:     {}", summary.found);
    println!("Processed:        {}", summary.processed);
    println!("Matched:          {}", summary.matched);
    println!("Skipped:          {}", summary.skipped);
    println!("Failed:           {}", summary.failed);
    println!("Faces detected:   {}", summary.faces_detected);
    if summary.faces_unscorable > 0 {
        println!("Faces unscorable: {}", summary.faces_unscorable);
    }
    if !summary.copies.is_empty() {
        println!("Copies in {}:", output_dir.display());
        for (identity, count) in &summary.copies {
            println!("  {identity}: {count}");
        }
    }
}

fn register(config: &Config, image_path: &Path) -> Result<()> {
    let image = read_rgb(image_path).with_context(|| format!("failed to read {}", image_path.display()))?;
    let mut analyzer = FaceAnalyzer::load(&config.analyzer()).context("failed to load face models")?;
    let faces = analyzer.analyze(&image)?;

    if faces.is_empty() {
        println!("no faces detected");
        return Ok(());
    }

    std::fs::create_dir_all(&config.register_dir)
        .with_context(|| format!("failed to create {}", config.register_dir.display()))?;

    let labels: Vec<String> = (1..=faces.len()).map(|n| format!("face_{n}")).collect();
    for (face, label) in faces.iter().zip(&labels) {
        let path = config.register_dir.join(format!("{label}.npy"));
        write_npy(&path, &face.embedding).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), confidence = face.region.confidence, "wrote embedding");
    }

    let face_refs: Vec<&QueryFace> = faces.iter().collect();
    let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
    let result_path = config.register_dir.join("result.jpg");
    let annotated = BoxAnnotator::new().draw_overlay(&image, &face_refs, &label_refs);
    write_rgb(&result_path, &annotated).with_context(|| format!("failed to write {}", result_path.display()))?;

    println!("{} face(s) detected", faces.len());
    println!("Embeddings and result.jpg written to {}", config.register_dir.display());
    println!(
        "Move the face_<n>.npy files you want into {}/<name>/",
        config.embedding_dir.display()
    );
    Ok(())
}

fn check(config: &Config, image_path: &Path, user: &str, top_n: Option<usize>, output: &Path) -> Result<()> {
    let store = EmbeddingStore::load_filtered(&config.embedding_dir, Some(user))
        .with_context(|| format!("failed to load embeddings from {}", config.embedding_dir.display()))?;
    let index = IdentityIndex::new(store).map_err(|e| match e {
        GalleryError::Empty => anyhow!(
            "no usable embeddings registered for '{user}' in {}",
            config.embedding_dir.display()
        ),
        other => other.into(),
    })?;

    let image = read_rgb(image_path).with_context(|| format!("failed to read {}", image_path.display()))?;
    let mut analyzer = FaceAnalyzer::load(&config.analyzer()).context("failed to load face models")?;
    let faces = analyzer.analyze(&image)?;

    if faces.is_empty() {
        println!("no faces detected");
        return Ok(());
    }

    let ranked = top_ranked(index.rank_faces(&faces), top_n);
    let labels: Vec<String> = (1..=ranked.len()).map(|rank| format!("face_{rank}")).collect();
    for (label, m) in labels.iter().zip(&ranked) {
        println!("{label}: {:.3}", m.similarity);
    }

    let face_refs: Vec<&QueryFace> = ranked.iter().map(|m| &m.face).collect();
    let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();
    let annotated = BoxAnnotator::new().draw_overlay(&image, &face_refs, &label_refs);
    write_rgb(output, &annotated).with_context(|| format!("failed to write {}", output.display()))?;
    println!("Annotated image written to {}", output.display());
    Ok(())
}

/// Keep the best `top_n` of an already descending ranking (all when `None`).
fn top_ranked(mut ranked: Vec<MatchResult>, top_n: Option<usize>) -> Vec<MatchResult> {
    if let Some(n) = top_n {
        ranked.truncate(n);
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use facesort_core::{BoundingBox, Embedding};

    fn result(similarity: f32) -> MatchResult {
        MatchResult {
            identity: "alice".into(),
            similarity,
            face: QueryFace::new(
                Embedding::new(vec![1.0, 0.0]),
                BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                    confidence: 0.9,
                    landmarks: None,
                },
            ),
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_identify_flags_parse() {
        let cli = Cli::try_parse_from([
            "facesort",
            "identify",
            "photos",
            "-o",
            "sorted",
            "--threshold",
            "0.6",
            "--flatten",
            "--no-confirm",
        ])
        .unwrap();
        match cli.command {
            Commands::Identify {
                photo_dir,
                output_dir,
                threshold,
                flatten,
                no_confirm,
                ..
            } => {
                assert_eq!(photo_dir, PathBuf::from("photos"));
                assert_eq!(output_dir, Some(PathBuf::from("sorted")));
                assert_eq!(threshold, Some(0.6));
                assert!(flatten && no_confirm);
            }
            _ => panic!("expected identify"),
        }
    }

    #[test]
    fn test_check_defaults() {
        let cli = Cli::try_parse_from(["facesort", "check", "group.jpg", "--user", "bob"]).unwrap();
        match cli.command {
            Commands::Check {
                user, top_n, output, ..
            } => {
                assert_eq!(user, "bob");
                assert_eq!(top_n, None);
                assert_eq!(output, PathBuf::from("check.jpg"));
            }
            _ => panic!("expected check"),
        }
    }

    #[test]
    fn test_register_output_flag() {
        let cli = Cli::try_parse_from(["facesort", "register", "face.jpg"]).unwrap();
        match cli.command {
            Commands::Register { image, output_dir } => {
                assert_eq!(image, PathBuf::from("face.jpg"));
                assert_eq!(output_dir, None);
            }
            _ => panic!("expected register"),
        }
        let cli = Cli::try_parse_from(["facesort", "register", "face.jpg", "-o", "crops"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Register { output_dir: Some(dir), .. } if dir == PathBuf::from("crops")
        ));
    }

    #[test]
    fn test_register_and_identify_write_to_separate_dirs() {
        let config = Config::default();
        assert_ne!(config.register_dir, config.output_dir);
    }

    #[test]
    fn test_check_requires_user() {
        assert!(Cli::try_parse_from(["facesort", "check", "group.jpg"]).is_err());
    }

    #[test]
    fn test_top_ranked() {
        let ranked = vec![result(0.9), result(0.5), result(0.1)];
        assert_eq!(top_ranked(ranked.clone(), None).len(), 3);
        let top = top_ranked(ranked.clone(), Some(2));
        assert_eq!(top.len(), 2);
        assert!((top[1].similarity - 0.5).abs() < 1e-6);
        assert_eq!(top_ranked(ranked, Some(10)).len(), 3);
    }
}
