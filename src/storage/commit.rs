//!  Commit creation and history traversal
//!
//!  commits are the atomic units of change in the store:
//! - each commit carries a fully materialized snapshot, so reading a branch
//!   never requires replaying history
//! - every commit has at most one parent, merges included
//! - history walks follow parent links from a branch head
//!
//! this module handles commit creation, snapshot materialization, history
//! walking and merge-base lookup

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::error::{VcsError, VcsResult};
use crate::storage::types::{ChangeType, CommitId, SlotChange, Snapshot, StagedChange};

/// The commit log, keyed by id. Commits are shared between repository values.
pub type CommitLog = BTreeMap<CommitId, Arc<Commit>>;

/// An immutable commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    /// None for the root commit of a branch
    pub parent_id: Option<CommitId>,
    /// slot map after applying this commit
    pub snapshot: Snapshot,
    pub changes: Vec<SlotChange>,
}

impl Commit {
    /// check if this is a root commit
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

/// builder for creating commits with a fluent interface
#[derive(Debug, Default)]
pub struct CommitBuilder {
    parent: Option<CommitId>,
    message: String,
    author: String,
    snapshot: Snapshot,
    changes: Vec<SlotChange>,
    timestamp: Option<DateTime<Utc>>,
}

impl CommitBuilder {
    /// create a new CommitBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// set the parent commit
    pub fn parent(mut self, parent: Option<CommitId>) -> Self {
        self.parent = parent;
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// set the materialized snapshot
    pub fn snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// set the change records
    pub fn changes(mut self, changes: Vec<SlotChange>) -> Self {
        self.changes = changes;
        self
    }

    /// pin the timestamp instead of using the current time
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// validate and create the commit with a fresh id
    pub fn build(self) -> VcsResult<Commit> {
        if self.message.trim().is_empty() {
            return Err(VcsError::EmptyCommitMessage);
        }
        if self.author.trim().is_empty() {
            return Err(VcsError::EmptyAuthor);
        }

        Ok(Commit {
            id: CommitId::generate(),
            message: self.message,
            author: self.author,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            parent_id: self.parent,
            snapshot: self.snapshot,
            changes: self.changes,
        })
    }
}

/// apply staged changes on top of a base snapshot
///
/// returns the new snapshot and the change records for the commit
pub fn apply_staged(base: &Snapshot, staged: &[StagedChange]) -> (Snapshot, Vec<SlotChange>) {
    let mut snapshot = base.clone();
    let mut changes = Vec::with_capacity(staged.len());

    for change in staged {
        let old_content = snapshot.get(&change.slot_name).cloned();
        match (change.change_type, &change.content) {
            (ChangeType::Deletion, _) | (_, None) => {
                snapshot.remove(&change.slot_name);
            }
            (_, Some(content)) => {
                snapshot.insert(change.slot_name.clone(), content.clone());
            }
        }
        changes.push(SlotChange {
            slot_name: change.slot_name.clone(),
            change_type: change.change_type,
            old_content,
            new_content: snapshot.get(&change.slot_name).cloned(),
        });
    }

    (snapshot, changes)
}

/// walk commit history by following parent links
///
/// stops early if a parent link points outside the log
pub struct HistoryIterator<'a> {
    commits: &'a CommitLog,
    next: Option<CommitId>,
}

impl<'a> HistoryIterator<'a> {
    /// create a new history iterator starting at `start` (inclusive)
    pub(crate) fn new(commits: &'a CommitLog, start: Option<CommitId>) -> Self {
        Self { commits, next: start }
    }
}

impl<'a> Iterator for HistoryIterator<'a> {
    type Item = &'a Commit;

    fn next(&mut self) -> Option<Self::Item> {
        let commit = self.commits.get(&self.next?)?;
        self.next = commit.parent_id;
        Some(commit.as_ref())
    }
}

/// find the merge base (nearest common ancestor) of two commits
///
/// with single-parent history this is the first commit on `b`'s chain that
/// is also on `a`'s chain. returns None if the histories never meet
pub fn find_merge_base(commits: &CommitLog, a: CommitId, b: CommitId) -> Option<CommitId> {
    let ancestors: HashSet<CommitId> = HistoryIterator::new(commits, Some(a)).map(|c| c.id).collect();

    HistoryIterator::new(commits, Some(b))
        .map(|c| c.id)
        .find(|id| ancestors.contains(id))
}

/// message formatting for generated commits
pub struct CommitMessage;

impl CommitMessage {
    /// format a message for a merge commit
    pub fn merge(source: &str, target: &str) -> String {
        format!("Merge branch '{}' into {}", source, target)
    }
}
