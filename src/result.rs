//! Error types and the related `Result<T>`

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// The ZIP archive contained invalid data per the spec.
    #[error("invalid Zip archive: {0}")]
    InvalidArchive(&'static str),

    /// The ZIP archive uses an unsupported feature
    /// (spanned volumes, Zip64, encryption, exotic compression, ...)
    #[error("unsupported Zip archive: {0}")]
    Unsupported(String),

    /// A value to be written does not fit in its on-disk field.
    ///
    /// The classic format caps names, extra fields, and comments at
    /// 65535 bytes, entry counts at 65535, and sizes and offsets at
    /// 2^32 - 1. Anything bigger needs Zip64, which we don't write.
    #[error("too large for the Zip format: {0}")]
    TooLarge(&'static str),

    /// A caller-provided value was out of range
    /// (DOS date/time fields, back-buffer chunk sizes, ...)
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// The reader or writer can no longer perform the requested operation,
    /// e.g. a writer that already failed or was closed.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}
