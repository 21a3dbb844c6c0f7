//! storage layer for slotvcs
//!
//! this module provides the versioned slot store itself: commits, branches,
//! tags, staging, diffs and merges over an immutable `Repository` value.
//! Every mutating operation borrows a repository and returns a new one.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Repository                            │
//! │   (aggregate: branches, commits, staging, working, tags)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌──────────────┬──────┴───────┬──────────────┐
//!        │              │              │              │
//!        ▼              ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐
//!  │   merge   │  │   diff    │  │   refs    │  │  staging  │
//!  │(conflicts)│  │  (slots)  │  │(branches, │  │ (working  │
//!  │           │  │           │  │   tags)   │  │  vs head) │
//!  └───────────┘  └───────────┘  └───────────┘  └───────────┘
//!        │              │              │              │
//!        └──────────────┴──────┬───────┴──────────────┘
//!                              ▼
//!                        ┌─────────────┐
//!                        │   commit    │
//!                        │  (history)  │
//!                        └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```
//! use slotvcs::storage::{BranchOptions, InitOptions, MergeOptions, Repository, StageSelector};
//!
//! let repo = Repository::init(InitOptions::default())
//!     .set_working_slot("prompt", "Hello")?
//!     .stage_changes(&StageSelector::All)
//!     .commit("Add initial prompt", "alice")?;
//!
//! let repo = repo
//!     .create_branch("feature", &BranchOptions::default())?
//!     .switch_branch("feature")?
//!     .set_working_slot("prompt", "Feature content")?
//!     .stage_changes(&StageSelector::All)
//!     .commit("Rework prompt", "bob")?
//!     .switch_branch("main")?;
//!
//! let merged = repo.merge_branch("feature", &MergeOptions::default())?;
//! assert!(merged.has_pending_merge());
//! # Ok::<(), slotvcs::storage::VcsError>(())
//! ```

mod commit;
mod diff;
mod error;
mod merge;
mod refs;
mod repository;
mod staging;
mod types;

// Re-export public API
pub use commit::{apply_staged, find_merge_base, Commit, CommitBuilder, CommitLog, CommitMessage, HistoryIterator};
pub use diff::{apply_diff, diff_snapshots, DiffRef};
pub use error::{VcsError, VcsResult};
pub use merge::{merge_snapshots, merge_with_base, MergeOptions, MergeStrategy, Resolution, SnapshotMerge};
pub use refs::{Branch, BranchOptions, Tag};
pub use repository::{HistoryOptions, InitOptions, Repository, DEFAULT_AUTHOR};
pub use staging::{stage_slot, StageSelector};
pub use types::{
    BranchName, ChangeType, CommitId, Conflict, Content, InvalidNameError, RepositoryId, SlotChange,
    SlotName, Snapshot, StagedChange, TagName,
};
