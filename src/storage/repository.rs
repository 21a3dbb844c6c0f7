//!   The repository aggregate.
//!
//!  This is the central component of the storage layer. A `Repository` owns
//!  the branches, the commit log, the staging area, the working slots,
//!  pending merge conflicts and tags.
//!
//! Every operation borrows the current value and returns a new one, so a
//! failing call can never leave a half-updated repository behind. Commits are
//! held behind `Arc`, so deriving a new value shares the whole commit log.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::commit::{self, Commit, CommitBuilder, CommitLog, HistoryIterator};
use crate::storage::error::{VcsError, VcsResult};
use crate::storage::refs::{Branch, Tag};
use crate::storage::types::{
    BranchName, CommitId, Conflict, Content, RepositoryId, SlotName, Snapshot, StagedChange, TagName,
};

/// Author recorded on merge commits when the caller supplies none.
pub const DEFAULT_AUTHOR: &str = "system";

/// Repository initialization options.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Name of the single branch the repository starts with.
    pub initial_branch: String,
    /// Opaque remote metadata, stored verbatim.
    pub remote_config: Option<Value>,
    /// Author used for generated commits (merges).
    pub default_author: String,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            initial_branch: BranchName::MAIN.to_string(),
            remote_config: None,
            default_author: DEFAULT_AUTHOR.to_string(),
        }
    }
}

impl InitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_branch(mut self, name: impl Into<String>) -> Self {
        self.initial_branch = name.into();
        self
    }

    pub fn remote_config(mut self, config: Value) -> Self {
        self.remote_config = Some(config);
        self
    }

    pub fn default_author(mut self, author: impl Into<String>) -> Self {
        self.default_author = author.into();
        self
    }
}

/// History query options.
#[derive(Debug, Clone, Default)]
pub struct HistoryOptions {
    /// Maximum number of commits returned.
    pub limit: Option<usize>,
    /// Only commits by exactly this author.
    pub author: Option<String>,
    /// Walk this branch instead of the current one.
    pub branch: Option<String>,
}

impl HistoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

/// A versioned content store for named slots.
///
/// Invariant: `current_branch` always keys an entry in `branches`.
/// Deserialization goes through [`Repository::validate`], so the invariant
/// also holds for values loaded from outside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RepositoryData")]
pub struct Repository {
    pub(crate) id: RepositoryId,
    pub(crate) current_branch: BranchName,
    pub(crate) branches: BTreeMap<BranchName, Branch>,
    pub(crate) commits: CommitLog,
    pub(crate) staging_area: Vec<StagedChange>,
    pub(crate) working_slots: Snapshot,
    pub(crate) merge_conflicts: Vec<Conflict>,
    pub(crate) tags: BTreeMap<TagName, Tag>,
    pub(crate) remote_config: Option<Value>,
    pub(crate) default_author: String,
}

/// Unchecked wire form of [`Repository`].
#[derive(Deserialize)]
struct RepositoryData {
    id: RepositoryId,
    current_branch: BranchName,
    branches: BTreeMap<BranchName, Branch>,
    commits: CommitLog,
    staging_area: Vec<StagedChange>,
    working_slots: Snapshot,
    merge_conflicts: Vec<Conflict>,
    tags: BTreeMap<TagName, Tag>,
    remote_config: Option<Value>,
    default_author: String,
}

impl TryFrom<RepositoryData> for Repository {
    type Error = VcsError;

    fn try_from(data: RepositoryData) -> Result<Self, Self::Error> {
        let repo = Self {
            id: data.id,
            current_branch: data.current_branch,
            branches: data.branches,
            commits: data.commits,
            staging_area: data.staging_area,
            working_slots: data.working_slots,
            merge_conflicts: data.merge_conflicts,
            tags: data.tags,
            remote_config: data.remote_config,
            default_author: data.default_author,
        };
        repo.validate()?;
        Ok(repo)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::init(InitOptions::default())
    }
}

impl Repository {
    /// Create a repository with a single empty branch.
    ///
    /// An unusable `initial_branch` or blank `default_author` falls back to the
    /// defaults, so initialization always succeeds.
    pub fn init(options: InitOptions) -> Self {
        let branch_name = BranchName::new(options.initial_branch).unwrap_or_else(|_| BranchName::main());
        let default_author = if options.default_author.trim().is_empty() {
            DEFAULT_AUTHOR.to_string()
        } else {
            options.default_author
        };

        let mut branches = BTreeMap::new();
        branches.insert(branch_name.clone(), Branch::new(branch_name.clone(), None, None));

        let repo = Self {
            id: RepositoryId::generate(),
            current_branch: branch_name,
            branches,
            commits: CommitLog::new(),
            staging_area: Vec::new(),
            working_slots: Snapshot::new(),
            merge_conflicts: Vec::new(),
            tags: BTreeMap::new(),
            remote_config: options.remote_config,
            default_author,
        };
        debug!("initialized repository {} on branch {}", repo.id, repo.current_branch);
        repo
    }

    // ==================== Accessors ====================

    pub fn id(&self) -> RepositoryId {
        self.id
    }

    /// Name of the checked-out branch.
    pub fn current_branch_name(&self) -> &BranchName {
        &self.current_branch
    }

    pub fn staging_area(&self) -> &[StagedChange] {
        &self.staging_area
    }

    pub fn working_slots(&self) -> &Snapshot {
        &self.working_slots
    }

    /// Content of one working slot.
    pub fn working_slot(&self, name: &str) -> Option<&Content> {
        self.working_slots.get(name)
    }

    pub fn remote_config(&self) -> Option<&Value> {
        self.remote_config.as_ref()
    }

    pub fn default_author(&self) -> &str {
        &self.default_author
    }

    /// Number of commits in the log, across all branches.
    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    pub fn get_commit(&self, id: CommitId) -> Option<&Commit> {
        self.commits.get(&id).map(Arc::as_ref)
    }

    /// All commits in the log, in id order.
    pub fn commits(&self) -> impl Iterator<Item = &Commit> {
        self.commits.values().map(Arc::as_ref)
    }

    /// Head commit id of the current branch.
    pub fn head_commit_id(&self) -> Option<CommitId> {
        self.branches.get(&self.current_branch).and_then(|b| b.head_commit_id)
    }

    pub fn head_commit(&self) -> Option<&Commit> {
        self.head_commit_id().and_then(|id| self.get_commit(id))
    }

    /// Materialized content of the current branch (empty before its first commit).
    pub fn head_snapshot(&self) -> Cow<'_, Snapshot> {
        self.snapshot_at(self.head_commit_id())
    }

    /// Materialized content of a branch.
    pub fn branch_snapshot(&self, name: &str) -> VcsResult<Cow<'_, Snapshot>> {
        let branch = self
            .branches
            .get(name)
            .ok_or_else(|| VcsError::BranchNotFound(name.to_string()))?;
        Ok(self.snapshot_at(branch.head_commit_id))
    }

    pub(crate) fn snapshot_at(&self, id: Option<CommitId>) -> Cow<'_, Snapshot> {
        match id.and_then(|id| self.commits.get(&id)) {
            Some(commit) => Cow::Borrowed(&commit.snapshot),
            None => Cow::Owned(Snapshot::new()),
        }
    }

    pub(crate) fn current_branch_mut(&mut self) -> &mut Branch {
        self.branches
            .get_mut(&self.current_branch)
            .expect("current branch always exists")
    }

    /// Append a commit and advance the current branch to it.
    pub(crate) fn push_commit(&mut self, commit: Commit) -> CommitId {
        let id = commit.id;
        self.commits.insert(id, Arc::new(commit));
        self.current_branch_mut().head_commit_id = Some(id);
        id
    }

    // ==================== Working Slots ====================

    /// Write content into a working slot.
    pub fn set_working_slot(&self, name: &str, content: impl Into<Content>) -> VcsResult<Self> {
        let slot = SlotName::new(name).map_err(VcsError::InvalidSlotName)?;
        let mut next = self.clone();
        next.working_slots.insert(slot, content.into());
        Ok(next)
    }

    /// Remove a working slot. Staging afterwards records a deletion if the
    /// slot exists in the head snapshot.
    pub fn remove_working_slot(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.working_slots.remove(name);
        next
    }

    // ==================== Commit ====================

    /// Commit the staging area onto the current branch.
    ///
    /// Working slots are left untouched.
    pub fn commit(&self, message: &str, author: &str) -> VcsResult<Self> {
        if message.trim().is_empty() {
            return Err(VcsError::EmptyCommitMessage);
        }
        if author.trim().is_empty() {
            return Err(VcsError::EmptyAuthor);
        }
        if self.staging_area.is_empty() {
            return Err(VcsError::EmptyStagingArea);
        }

        let blocked: Vec<Conflict> = self
            .merge_conflicts
            .iter()
            .filter(|c| self.staging_area.iter().any(|s| s.slot_name == c.slot_name))
            .cloned()
            .collect();
        if !blocked.is_empty() {
            return Err(VcsError::MergeConflictsDetected { conflicts: blocked });
        }

        let parent = self.head_commit_id();
        let (snapshot, changes) = commit::apply_staged(&self.head_snapshot(), &self.staging_area);
        let commit = CommitBuilder::new()
            .parent(parent)
            .message(message)
            .author(author)
            .snapshot(snapshot)
            .changes(changes)
            .build()?;

        let mut next = self.clone();
        let id = next.push_commit(commit);
        next.staging_area.clear();

        debug!(
            "committed {} on {} ({} changes)",
            id,
            next.current_branch,
            self.staging_area.len()
        );
        Ok(next)
    }

    // ==================== History ====================

    /// Commits reachable from a branch head, most recent first.
    pub fn get_commit_history(&self, options: &HistoryOptions) -> VcsResult<Vec<&Commit>> {
        let start = match &options.branch {
            Some(name) => {
                self.branches
                    .get(name.as_str())
                    .ok_or_else(|| VcsError::BranchNotFound(name.clone()))?
                    .head_commit_id
            }
            None => self.head_commit_id(),
        };

        let commits = HistoryIterator::new(&self.commits, start)
            .filter(|c| options.author.as_ref().map_or(true, |a| &c.author == a))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(commits)
    }

    // ==================== Persistence ====================

    /// Serialize the whole repository value to JSON.
    pub fn to_json(&self) -> VcsResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reconstruct a repository from JSON, checking its invariants.
    pub fn from_json(json: &str) -> VcsResult<Self> {
        let data: RepositoryData = serde_json::from_str(json)?;
        Self::try_from(data)
    }

    /// Check structural invariants of a repository value.
    pub fn validate(&self) -> VcsResult<()> {
        if !self.branches.contains_key(&self.current_branch) {
            return Err(VcsError::Corrupted(format!(
                "current branch {} does not exist",
                self.current_branch
            )));
        }

        for (name, branch) in &self.branches {
            if name != &branch.name {
                return Err(VcsError::Corrupted(format!(
                    "branch keyed as {} is named {}",
                    name, branch.name
                )));
            }
            if let Some(head) = branch.head_commit_id {
                if !self.commits.contains_key(&head) {
                    return Err(VcsError::Corrupted(format!(
                        "branch {} points at missing commit {}",
                        name, head
                    )));
                }
            }
        }

        for (id, commit) in &self.commits {
            if id != &commit.id {
                return Err(VcsError::Corrupted(format!("commit keyed as {} has id {}", id, commit.id)));
            }
            if let Some(parent) = commit.parent_id {
                if !self.commits.contains_key(&parent) {
                    return Err(VcsError::Corrupted(format!(
                        "commit {} has missing parent {}",
                        id, parent
                    )));
                }
            }
        }

        for branch in self.branches.values() {
            let walked = HistoryIterator::new(&self.commits, branch.head_commit_id)
                .take(self.commits.len() + 1)
                .count();
            if walked > self.commits.len() {
                return Err(VcsError::Corrupted(format!("history of {} contains a cycle", branch.name)));
            }
        }

        for (name, tag) in &self.tags {
            if !self.commits.contains_key(&tag.commit_id) {
                return Err(VcsError::Corrupted(format!(
                    "tag {} points at missing commit {}",
                    name, tag.commit_id
                )));
            }
        }

        Ok(())
    }
}
