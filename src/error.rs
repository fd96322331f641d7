use std::path::PathBuf;

use burn::config::ConfigError;
use burn::record::RecorderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A tensor does not match the shape the architecture was built for.
    #[error("shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A restored checkpoint did not populate the whole parameter set.
    #[error("checkpoint {path:?} is incomplete: {actual} of {expected} parameter tensors restored with the declared shape")]
    CheckpointIncomplete {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("missing asset: {0:?}")]
    MissingAsset(PathBuf),

    #[error("non-finite {what}: {value}")]
    NumericalDegeneracy { what: &'static str, value: f32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot parse {path:?} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("mesh {0:?} has no surface area to sample")]
    DegenerateMesh(PathBuf),

    #[error("no meshes found in {0:?}")]
    EmptyDataset(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("recorder error: {0:?}")]
    Recorder(RecorderError),

    #[error("config error: {0:?}")]
    Config(ConfigError),
}

impl From<RecorderError> for Error {
    fn from(err: RecorderError) -> Self {
        Self::Recorder(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl Error {
    pub(crate) fn shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

/// Fails with [`Error::NumericalDegeneracy`] for NaN or infinite values.
pub fn ensure_finite(what: &'static str, value: f32) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::NumericalDegeneracy { what, value })
    }
}
