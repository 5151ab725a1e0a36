use thiserror::Error;

/// Enum with all errors in this crate.
///
/// Invalid input, unsupported axis shapes and inconsistent internal state are kept apart so
/// callers can react to each of them differently.
#[derive(Error, Debug)]
pub enum GridIndexError {
    /// Invalid size, bounds or tolerance when constructing a range, a grid or an index.
    #[error("Construction error: {0}")]
    Construction(String),

    /// Text could not be parsed into a value.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The number of points offered to a backend differs from what it was opened for.
    #[error("Integrity error: expected {expected} items, got {actual}")]
    Integrity { expected: usize, actual: usize },

    /// A valid request this crate does not support for the given axis shape.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// A query was issued against an index that was never successfully built.
    #[error("Concurrency violation: {0}")]
    ConcurrencyViolation(String),

    /// Unknown loader or invalid option.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A persisted index blob is corrupt or of an incompatible version.
    #[error("Index format error: {0}")]
    Format(String),

    /// The exclusive build lock for an identity could not be acquired in time.
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GridIndexError>;
