//! Error taxonomy.
//!
//! `DuplicateInsert` and `MissingRemove` are debug-only programmer errors
//! and are surfaced as `debug_assert!` panics at the call site rather than
//! as `Result` variants here — the classifier itself does not deduplicate
//! or validate removal, so there is nothing for a caller to recover from.

use thiserror::Error;

/// Failures the classifier's control-plane API can report.
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Insert could not allocate a subtable or rule; classifier state is
    /// unchanged.
    #[error("allocation failure while inserting rule")]
    AllocationFailure,

    /// `optimize()` was asked to pin a specialization that is not compiled
    /// in for this build; the subtable falls back to the generic lookup.
    #[error("requested lookup specialization unavailable, falling back to generic")]
    CapabilityUnavailable,
}

/// Result type for classifier control-plane operations.
pub type ClassifierResult<T> = Result<T, ClassifierError>;
