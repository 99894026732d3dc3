//! Error types for the per-period conversion.

use std::fmt;

use thiserror::Error;

/// Result type for the conversion core.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can stop a period from producing its output.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input file is absent. Expected; the period is skipped.
    #[error("missing input: {0}")]
    MissingInput(String),

    /// The surface archive could not be read, extracted, or lacks a required member.
    #[error("archive read error: {0}")]
    ArchiveRead(String),

    /// A dataset could not be opened or decoded.
    #[error("dataset read error: {0}")]
    DatasetRead(String),

    /// Daily aggregation failed, usually on an undecodable time coordinate.
    #[error("aggregation error: {0}")]
    Aggregation(String),

    /// A pressure-level variable could not be expanded into per-level variables.
    #[error("flatten error: {0}")]
    Flatten(String),

    /// Two collections define the same variable name.
    #[error("variable name collision: {}", .names.join(", "))]
    NameCollision { names: Vec<String> },

    /// The merged dataset could not be persisted.
    #[error("write error: {0}")]
    Write(String),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingInput(_) => ErrorKind::MissingInput,
            Self::ArchiveRead(_) => ErrorKind::ArchiveRead,
            Self::DatasetRead(_) => ErrorKind::DatasetRead,
            Self::Aggregation(_) => ErrorKind::Aggregation,
            Self::Flatten(_) => ErrorKind::Flatten,
            Self::NameCollision { .. } => ErrorKind::NameCollision,
            Self::Write(_) => ErrorKind::Write,
        }
    }
}

/// Fieldless mirror of [`Error`], reported with failed periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingInput,
    ArchiveRead,
    DatasetRead,
    Aggregation,
    Flatten,
    NameCollision,
    Write,
}

impl ErrorKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MissingInput => "MissingInputError",
            Self::ArchiveRead => "ArchiveReadError",
            Self::DatasetRead => "DatasetReadError",
            Self::Aggregation => "AggregationError",
            Self::Flatten => "FlattenError",
            Self::NameCollision => "NameCollisionError",
            Self::Write => "WriteError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
