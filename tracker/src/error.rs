//! Error type shared by the lifecycle core and the service facade.

use std::fmt;

use thiserror::Error;

/// Kind of record a lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Test,
    Bank,
    Cycle,
    Reading,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordKind::Test => "test",
            RecordKind::Bank => "bank",
            RecordKind::Cycle => "cycle",
            RecordKind::Reading => "reading",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Requested record does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: RecordKind, id: String },

    /// Input rejected; messages are in stable order.
    #[error("validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// Request is well-formed but conflicts with the record's current state.
    #[error("{0}")]
    Conflict(String),

    /// Store or filesystem failure.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type TrackerResult<T> = Result<T, TrackerError>;

impl TrackerError {
    pub fn not_found(kind: RecordKind, id: impl ToString) -> Self {
        TrackerError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Convert a non-empty list of validation messages into an error.
    pub fn check(errors: Vec<String>) -> TrackerResult<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TrackerError::Invalid(errors))
        }
    }
}
