//! Domain-level errors (no external dependencies)

use std::path::PathBuf;
use thiserror::Error;

/// Domain errors represent malformed tree data or invalid tree shapes.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("invalid tree file {path}, line {line}: {message}")]
    InvalidTreeFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("tree arrays differ in length: {masses} masses, {ids} ids")]
    MismatchedArrays { masses: usize, ids: usize },

    #[error("empty merger tree")]
    EmptyTree,
}
