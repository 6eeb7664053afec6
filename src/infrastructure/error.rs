//! Infrastructure-level errors (wraps application errors)

use std::path::PathBuf;

use thiserror::Error;

use crate::application::ApplicationError;

/// Infrastructure errors wrap application errors and add I/O-level concerns.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("{0}")]
    Application(#[from] ApplicationError),

    #[error("I/O error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl InfraError {
    /// Create an I/O error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Errors raised by a tree store back end.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database {path} holds {stored} steps per tree, requested {requested}")]
    StepMismatch {
        path: PathBuf,
        stored: usize,
        requested: usize,
    },

    #[error("not a merger-tree database: {0}")]
    NotATreeDatabase(PathBuf),

    #[error("value {0} does not fit a signed 64-bit column")]
    ValueOutOfRange(u64),

    #[error("negative value {0} in unsigned column")]
    NegativeValue(i64),

    #[error("invalid tree for halo {halo_id}: {message}")]
    InvalidTree { halo_id: u64, message: String },

    #[error("corrupt metadata: {0}")]
    CorruptMeta(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
