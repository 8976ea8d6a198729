use thiserror::Error;

/// Every public operation in this crate returns one of these kinds on
/// failure. Decoders never panic: a corrupted volume yields an `Error`,
/// never a crash, and a failure never taints unrelated requests.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupted metadata: {0}")]
    CorruptedMetadata(String),

    #[error("inconsistent extents: {0}")]
    InconsistentExtents(String),

    #[error("recursion limit exceeded (depth {0})")]
    RecursionLimit(u32),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<xfs_decode::DecodeError> for Error {
    fn from(value: xfs_decode::DecodeError) -> Self {
        Error::CorruptedMetadata(value.to_string())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
