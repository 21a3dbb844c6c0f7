//! Shared ownership of a repository value.
//!
//! The storage layer is purely functional: every operation takes a
//! `Repository` and returns a new one. Concurrent writers deriving values
//! from the same base would silently diverge, so whoever owns the
//! repository must apply mutations one at a time. [`RepositoryHandle`] is
//! that owner for in-process use.
//!
//! # Usage
//!
//! ```
//! use slotvcs::session::RepositoryHandle;
//! use slotvcs::storage::{InitOptions, Repository, StageSelector};
//!
//! let handle = RepositoryHandle::new(Repository::init(InitOptions::default()));
//!
//! handle.apply(|repo| {
//!     repo.set_working_slot("prompt", "Hello")
//!         .map(|repo| repo.stage_changes(&StageSelector::All))?
//!         .commit("Add initial prompt", "alice")
//! }).unwrap();
//!
//! assert_eq!(handle.snapshot().commit_count(), 1);
//! ```

mod handle;

pub use handle::RepositoryHandle;
