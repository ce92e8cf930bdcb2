use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    General(String),
    #[error("a file already exists under {0}")]
    AlreadyExists(PathBuf),
    #[error("unknown pyramid type: {0:?}")]
    UnsupportedPyramidKind(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt container: {0}")]
    Corrupt(String),
    #[error("invalid extension specification: {0:?}")]
    InvalidExtensionSpec(String),
    #[error("channel axis {axis} is out of range for an array of rank {rank}")]
    InvalidChannelAxis { axis: isize, rank: usize },
    #[error("invalid chunk shape {chunks:?} for array shape {shape:?}")]
    InvalidChunkShape { chunks: Vec<u64>, shape: Vec<u64> },
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("element type mismatch: array holds {actual}, requested {requested}")]
    ElementTypeMismatch {
        actual: &'static str,
        requested: &'static str,
    },
    #[error("unsupported element type: {0}")]
    UnsupportedElementType(String),
    #[error("container at {0} is open read-only")]
    ReadOnly(PathBuf),
    #[error("open mode {0} is not valid here")]
    InvalidOpenMode(&'static str),
    #[error("unsupported source {path}: {reason}")]
    UnsupportedSource { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Storage(#[from] zarrs::storage::StorageError),
    #[error(transparent)]
    ArrayCreate(#[from] zarrs::array::ArrayCreateError),
    #[error(transparent)]
    Array(#[from] zarrs::array::ArrayError),
    #[error(transparent)]
    GroupCreate(#[from] zarrs::group::GroupCreateError),
    #[error(transparent)]
    Wrapped(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn general(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn wrap(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped(Box::new(error))
    }

    pub(crate) fn unsupported_source(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedSource {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
