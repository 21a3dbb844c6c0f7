//! Error types for the versioned slot store.
//!
//! Every failure is returned as a typed value. A failing operation never
//! produces a partially updated repository: operations borrow the input and
//! only hand back a new value on success.

use thiserror::Error;

use crate::storage::types::{Conflict, InvalidNameError};

/// the main error type for repository operations
#[derive(Debug, Error)]
pub enum VcsError {
    /// branch name failed validation
    #[error("invalid branch name: {0}")]
    InvalidBranchName(InvalidNameError),

    /// a branch with this name already exists
    #[error("branch already exists: {0}")]
    DuplicateBranchName(String),

    /// the named branch does not exist
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// commit was requested with nothing staged
    #[error("nothing to commit: staging area is empty")]
    EmptyStagingArea,

    /// commit message is blank
    #[error("commit message cannot be empty")]
    EmptyCommitMessage,

    /// commit author is blank
    #[error("commit author cannot be empty")]
    EmptyAuthor,

    /// tag name failed validation
    #[error("invalid tag name: {0}")]
    InvalidTagName(InvalidNameError),

    /// a tag with this name already exists
    #[error("tag already exists: {0}")]
    DuplicateTagName(String),

    /// the referenced commit does not exist
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// staged changes touch slots with unresolved merge conflicts
    #[error("unresolved merge conflicts on: {}", slots_display(.conflicts))]
    MergeConflictsDetected { conflicts: Vec<Conflict> },

    /// slot name failed validation
    #[error("invalid slot name: {0}")]
    InvalidSlotName(InvalidNameError),

    /// there is no pending conflict for this slot
    #[error("no pending conflict for slot: {0}")]
    ConflictNotFound(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// a loaded repository violates its structural invariants
    #[error("corrupted repository: {0}")]
    Corrupted(String),
}

fn slots_display(conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.slot_name.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl VcsError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VcsError::BranchNotFound(_) | VcsError::CommitNotFound(_) | VcsError::ConflictNotFound(_)
        )
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            VcsError::DuplicateBranchName(_)
                | VcsError::DuplicateTagName(_)
                | VcsError::MergeConflictsDetected { .. }
        )
    }

    /// check if this error comes from rejected caller input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            VcsError::InvalidBranchName(_)
                | VcsError::InvalidTagName(_)
                | VcsError::InvalidSlotName(_)
                | VcsError::EmptyCommitMessage
                | VcsError::EmptyAuthor
                | VcsError::EmptyStagingArea
        )
    }
}

/// result type alias for repository operations
pub type VcsResult<T> = Result<T, VcsError>;
