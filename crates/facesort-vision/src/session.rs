//! ONNX Runtime session setup shared by both models.

use ort::session::Session;
use std::path::Path;

/// Open `model_path` for CPU inference and log its tensor signature.
pub(crate) fn open(model_path: &Path, intra_threads: usize, model: &'static str) -> Result<Session, ort::Error> {
    let session = Session::builder()?
        .with_intra_threads(intra_threads)?
        .commit_from_file(model_path)?;

    tracing::info!(
        model,
        path = %model_path.display(),
        intra_threads,
        inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "onnx session ready"
    );
    Ok(session)
}
