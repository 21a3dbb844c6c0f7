//!  Branch and tag management.
//!
//!  Branches are movable pointers to commits, tags are fixed ones. This
//!  module handles:
//! - branch creation from any existing branch
//! - switching the current branch
//! - tag creation against commits in the log
//!
//! Switching branches deliberately keeps working slots and the staging
//! area as they are: uncommitted edits follow the caller to the new branch.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::storage::error::{VcsError, VcsResult};
use crate::storage::repository::Repository;
use crate::storage::types::{BranchName, CommitId, TagName};

/// A named pointer to the tip of a line of commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: BranchName,
    /// None until the branch's first commit
    pub head_commit_id: Option<CommitId>,
    /// branch this one was created from
    pub source_branch: Option<BranchName>,
}

impl Branch {
    pub(crate) fn new(name: BranchName, head_commit_id: Option<CommitId>, source_branch: Option<BranchName>) -> Self {
        Self {
            name,
            head_commit_id,
            source_branch,
        }
    }

    /// check if the branch has no commits yet
    pub fn is_unborn(&self) -> bool {
        self.head_commit_id.is_none()
    }
}

/// A fixed, named reference to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: TagName,
    pub commit_id: CommitId,
    pub created_at: DateTime<Utc>,
}

/// Branch creation options.
#[derive(Debug, Clone, Default)]
pub struct BranchOptions {
    /// Branch to fork from. Defaults to the current branch.
    pub source_branch: Option<String>,
}

impl BranchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_branch(mut self, name: impl Into<String>) -> Self {
        self.source_branch = Some(name.into());
        self
    }
}

impl Repository {
    // ==================== Branches ====================

    /// Create a branch at the head of `options.source_branch` (default: current).
    ///
    /// The current branch is not changed.
    pub fn create_branch(&self, name: &str, options: &BranchOptions) -> VcsResult<Self> {
        let branch_name = BranchName::new(name).map_err(VcsError::InvalidBranchName)?;
        if self.branches.contains_key(&branch_name) {
            return Err(VcsError::DuplicateBranchName(name.to_string()));
        }

        let source = match &options.source_branch {
            Some(source) => self
                .branches
                .get(source.as_str())
                .ok_or_else(|| VcsError::BranchNotFound(source.clone()))?,
            None => self.current_branch(),
        };

        let branch = Branch::new(branch_name.clone(), source.head_commit_id, Some(source.name.clone()));
        debug!("created branch {} from {}", branch_name, source.name);

        let mut next = self.clone();
        next.branches.insert(branch_name, branch);
        Ok(next)
    }

    /// Make `name` the current branch.
    ///
    /// Working slots and staged changes are carried over unchanged.
    pub fn switch_branch(&self, name: &str) -> VcsResult<Self> {
        let branch = self
            .branches
            .get(name)
            .ok_or_else(|| VcsError::BranchNotFound(name.to_string()))?;

        debug!("switched from {} to {}", self.current_branch, branch.name);
        let mut next = self.clone();
        next.current_branch = branch.name.clone();
        Ok(next)
    }

    /// The checked-out branch.
    pub fn current_branch(&self) -> &Branch {
        self.branches
            .get(&self.current_branch)
            .expect("current branch always exists")
    }

    pub fn branch(&self, name: &str) -> Option<&Branch> {
        self.branches.get(name)
    }

    /// All branches, ordered by name.
    pub fn branches(&self) -> impl Iterator<Item = &Branch> {
        self.branches.values()
    }

    // ==================== Tags ====================

    /// Tag an existing commit.
    pub fn create_tag(&self, name: &str, commit_id: CommitId) -> VcsResult<Self> {
        let tag_name = TagName::new(name).map_err(VcsError::InvalidTagName)?;
        if self.tags.contains_key(&tag_name) {
            return Err(VcsError::DuplicateTagName(name.to_string()));
        }
        if !self.commits.contains_key(&commit_id) {
            return Err(VcsError::CommitNotFound(commit_id.to_string()));
        }

        let tag = Tag {
            name: tag_name.clone(),
            commit_id,
            created_at: Utc::now(),
        };
        debug!("tagged {} as {}", commit_id, tag_name);

        let mut next = self.clone();
        next.tags.insert(tag_name, tag);
        Ok(next)
    }

    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    /// All tags, ordered by name.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }
}
