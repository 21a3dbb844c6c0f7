//! slotvcs - a versioned content store for named content slots
//!
//! This crate is a small, in-process version-control engine for structured
//! documents such as prompt text and its metadata. Content lives in named
//! slots; slots are edited in a working set, staged, committed onto branches,
//! tagged, diffed and merged with slot-level conflict detection.
//!
//! The [`storage::Repository`] value is immutable: every operation returns a
//! new repository, and a failed operation leaves the input untouched.
//! [`session::RepositoryHandle`] serializes writers when several threads
//! share one repository.
//!
//! # Example
//!
//! ```
//! use slotvcs::storage::{InitOptions, Repository, StageSelector};
//!
//! let repo = Repository::init(InitOptions::default())
//!     .set_working_slot("prompt", "Hello")
//!     .unwrap()
//!     .stage_changes(&StageSelector::All)
//!     .commit("Add initial prompt", "alice")
//!     .unwrap();
//!
//! assert_eq!(repo.head_snapshot().get("prompt"), Some(&"Hello".into()));
//! ```

pub mod session;
pub mod storage;
