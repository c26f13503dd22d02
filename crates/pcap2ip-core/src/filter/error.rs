use thiserror::Error;

/// Filter expression compile errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("empty filter expression")]
    Empty,
    #[error("cannot parse filter `{expression}`: {message}")]
    Parse { expression: String, message: String },
}
