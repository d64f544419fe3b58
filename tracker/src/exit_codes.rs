//! Stable exit codes for tracker CLI commands.

use crate::error::TrackerError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Storage, layout or config failure, or any other error.
pub const FAILED: i32 = 1;
/// A referenced test, bank, cycle or reading does not exist.
pub const NOT_FOUND: i32 = 2;
/// Input was rejected by validation or conflicts with the record's state.
pub const REJECTED: i32 = 3;

pub fn for_error(err: &TrackerError) -> i32 {
    match err {
        TrackerError::NotFound { .. } => NOT_FOUND,
        TrackerError::Invalid(_) | TrackerError::Conflict(_) => REJECTED,
        TrackerError::Storage(_) => FAILED,
    }
}
