//! Reading and writing single embedding vectors on disk.
//!
//! Two formats are understood: NumPy `.npy` (what InsightFace tooling
//! produces) and `.json` (a bare number array or a serialized [`Embedding`]).

use crate::types::Embedding;
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const NPY_ALIGNMENT: usize = 64;

#[derive(Error, Debug)]
pub enum VectorFileError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported vector file extension: {0:?}")]
    UnsupportedExtension(String),
    #[error("not an npy file (bad magic)")]
    BadMagic,
    #[error("unsupported npy version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },
    #[error("malformed npy header: {0}")]
    MalformedHeader(String),
    #[error("unsupported dtype {0:?} (expected <f4, >f4, <f8 or >f8)")]
    UnsupportedDtype(String),
    #[error("fortran-ordered arrays are not supported")]
    FortranOrder,
    #[error("shape {0:?} is not a single vector")]
    NotAVector(Vec<usize>),
    #[error("truncated data: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("vector is empty")]
    Empty,
    #[error("vector has zero norm")]
    Degenerate,
}

/// File extensions [`read_vector`] accepts.
pub const VECTOR_EXTENSIONS: [&str; 2] = ["npy", "json"];

/// Whether `path` has an extension [`read_vector`] understands.
pub fn is_vector_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VECTOR_EXTENSIONS.iter().any(|v| e.eq_ignore_ascii_case(v)))
}

/// Load one embedding from `path`, dispatching on the extension.
///
/// Empty and zero-norm vectors are rejected here so that nothing degenerate
/// ever reaches the gallery.
pub fn read_vector(path: &Path) -> Result<Embedding, VectorFileError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let embedding = match ext.as_str() {
        "npy" => Embedding::new(parse_npy(&fs::read(path)?)?),
        "json" => parse_json(&fs::read(path)?)?,
        _ => return Err(VectorFileError::UnsupportedExtension(ext)),
    };

    if embedding.values.is_empty() {
        return Err(VectorFileError::Empty);
    }
    if embedding.is_degenerate() {
        return Err(VectorFileError::Degenerate);
    }
    Ok(embedding)
}

/// Write `embedding` as a 1-D little-endian float32 `.npy` file.
pub fn write_npy(path: &Path, embedding: &Embedding) -> Result<(), VectorFileError> {
    let mut file = fs::File::create(path)?;
    file.write_all(&encode_npy(&embedding.values))?;
    Ok(())
}

fn parse_json(bytes: &[u8]) -> Result<Embedding, VectorFileError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    if value.is_array() {
        Ok(Embedding::new(serde_json::from_value(value)?))
    } else {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, Copy)]
enum Dtype {
    F32 { little: bool },
    F64 { little: bool },
}

impl Dtype {
    fn size(self) -> usize {
        match self {
            Dtype::F32 { .. } => 4,
            Dtype::F64 { .. } => 8,
        }
    }
}

fn parse_npy(bytes: &[u8]) -> Result<Vec<f32>, VectorFileError> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(VectorFileError::BadMagic);
    }
    let (major, minor) = (bytes[6], bytes[7]);

    // v1 stores the header length as u16, v2/v3 as u32.
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10usize),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(VectorFileError::MalformedHeader("short preamble".into()));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        _ => return Err(VectorFileError::UnsupportedVersion { major, minor }),
    };

    let data_start = header_start
        .checked_add(header_len)
        .ok_or_else(|| VectorFileError::MalformedHeader("header length overflows".into()))?;
    let header = bytes
        .get(header_start..data_start)
        .ok_or_else(|| VectorFileError::MalformedHeader("header runs past end of file".into()))?;
    let header = std::str::from_utf8(header)
        .map_err(|e| VectorFileError::MalformedHeader(e.to_string()))?;

    let dtype = parse_descr(header)?;
    if header_bool(header, "fortran_order")? {
        return Err(VectorFileError::FortranOrder);
    }
    let shape = parse_shape(header)?;

    // One vector per file: at most one axis may be longer than 1.
    if shape.is_empty() || shape.iter().filter(|&&d| d != 1).count() > 1 {
        return Err(VectorFileError::NotAVector(shape));
    }
    let expected = shape
        .iter()
        .try_fold(dtype.size(), |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| VectorFileError::MalformedHeader(format!("shape {shape:?} overflows")))?;

    let data = &bytes[data_start..];
    if data.len() < expected {
        return Err(VectorFileError::Truncated {
            expected,
            actual: data.len(),
        });
    }

    let values = match dtype {
        Dtype::F32 { little } => data[..expected]
            .chunks_exact(4)
            .map(|c| {
                let raw = [c[0], c[1], c[2], c[3]];
                if little {
                    f32::from_le_bytes(raw)
                } else {
                    f32::from_be_bytes(raw)
                }
            })
            .collect(),
        Dtype::F64 { little } => data[..expected]
            .chunks_exact(8)
            .map(|c| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(c);
                let v = if little {
                    f64::from_le_bytes(raw)
                } else {
                    f64::from_be_bytes(raw)
                };
                v as f32
            })
            .collect(),
    };

    Ok(values)
}

/// Return the text following `'key':` in a numpy header dict.
fn header_value<'a>(header: &'a str, key: &str) -> Result<&'a str, VectorFileError> {
    let needle = format!("'{key}':");
    let pos = header
        .find(&needle)
        .ok_or_else(|| VectorFileError::MalformedHeader(format!("missing key {key}")))?;
    Ok(header[pos + needle.len()..].trim_start())
}

fn parse_descr(header: &str) -> Result<Dtype, VectorFileError> {
    let rest = header_value(header, "descr")?;
    let quote = rest
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| VectorFileError::MalformedHeader("descr is not a string".into()))?;
    let end = rest[1..]
        .find(quote)
        .ok_or_else(|| VectorFileError::MalformedHeader("unterminated descr".into()))?;
    let descr = &rest[1..1 + end];

    match descr {
        "<f4" => Ok(Dtype::F32 { little: true }),
        ">f4" => Ok(Dtype::F32 { little: false }),
        "<f8" => Ok(Dtype::F64 { little: true }),
        ">f8" => Ok(Dtype::F64 { little: false }),
        other => Err(VectorFileError::UnsupportedDtype(other.to_string())),
    }
}

fn header_bool(header: &str, key: &str) -> Result<bool, VectorFileError> {
    let rest = header_value(header, key)?;
    if rest.starts_with("True") {
        Ok(true)
    } else if rest.starts_with("False") {
        Ok(false)
    } else {
        Err(VectorFileError::MalformedHeader(format!("{key} is not a bool")))
    }
}

fn parse_shape(header: &str) -> Result<Vec<usize>, VectorFileError> {
    let rest = header_value(header, "shape")?;
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.find(')').map(|end| &r[..end]))
        .ok_or_else(|| VectorFileError::MalformedHeader("shape is not a tuple".into()))?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| VectorFileError::MalformedHeader(format!("bad shape entry {s:?}")))
        })
        .collect()
}

fn encode_npy(values: &[f32]) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({},), }}",
        values.len()
    );
    // Magic + version + u16 length = 10 bytes; pad so data starts aligned.
    let unpadded = 10 + dict.len() + 1;
    let padding = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(10 + header_len + values.len() * 4);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
