//! Merge engine.
//!
//! Two strategies are available:
//!
//! - [`MergeStrategy::HeadSnapshots`] (default) compares the two branch head
//!   snapshots directly. A slot defined on one side only, or identical on both,
//!   is merged; a slot both sides define differently is a conflict.
//! - [`MergeStrategy::MergeBase`] first finds the nearest common ancestor and
//!   only takes a side's value when that side changed the slot relative to the
//!   ancestor. Deletions propagate and modify/delete pairs conflict.
//!
//! A clean merge produces a single-parent merge commit on the current branch.
//! A conflicting merge creates no commit and leaves the conflicts on the
//! repository until they are restaged, resolved or aborted.

use log::{debug, warn};

use crate::storage::commit::{self, CommitBuilder, CommitMessage};
use crate::storage::diff::diff_snapshots;
use crate::storage::error::{VcsError, VcsResult};
use crate::storage::repository::Repository;
use crate::storage::staging::StageSelector;
use crate::storage::types::{CommitId, Conflict, Content, Snapshot};

/// How merge inputs are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    #[default]
    HeadSnapshots,
    MergeBase,
}

/// Merge options.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Author of the merge commit. Defaults to the repository's default author.
    pub author: Option<String>,
    /// Message of the merge commit. Defaults to "Merge branch '<source>' into <target>".
    pub message: Option<String>,
    pub strategy: MergeStrategy,
}

impl MergeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Which side wins when resolving a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// keep the current branch's value
    Current,
    /// take the merged branch's value
    Incoming,
    /// use hand-edited content
    Content(Content),
}

/// Result of combining two snapshots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapshotMerge {
    /// merged slots; conflicting slots are left out
    pub merged: Snapshot,
    pub conflicts: Vec<Conflict>,
}

impl SnapshotMerge {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Merge two head snapshots without looking at history.
pub fn merge_snapshots(current: &Snapshot, incoming: &Snapshot) -> SnapshotMerge {
    let mut result = SnapshotMerge::default();

    for (slot, ours) in current {
        match incoming.get(slot) {
            Some(theirs) if theirs != ours => result.conflicts.push(Conflict {
                slot_name: slot.clone(),
                current_content: Some(ours.clone()),
                incoming_content: Some(theirs.clone()),
            }),
            _ => {
                result.merged.insert(slot.clone(), ours.clone());
            }
        }
    }
    for (slot, theirs) in incoming {
        if !current.contains_key(slot) {
            result.merged.insert(slot.clone(), theirs.clone());
        }
    }

    result
}

/// Three-way merge of two snapshots against their common ancestor.
pub fn merge_with_base(base: &Snapshot, current: &Snapshot, incoming: &Snapshot) -> SnapshotMerge {
    let mut slots: Vec<_> = base.keys().chain(current.keys()).chain(incoming.keys()).collect();
    slots.sort();
    slots.dedup();

    let mut result = SnapshotMerge::default();
    for slot in slots {
        let (b, ours, theirs) = (base.get(slot), current.get(slot), incoming.get(slot));

        let chosen = if ours == theirs || theirs == b {
            ours
        } else if ours == b {
            theirs
        } else {
            result.conflicts.push(Conflict {
                slot_name: slot.clone(),
                current_content: ours.cloned(),
                incoming_content: theirs.cloned(),
            });
            continue;
        };

        if let Some(content) = chosen {
            result.merged.insert(slot.clone(), content.clone());
        }
    }

    result
}

impl Repository {
    /// Merge `source_branch_name` into the current branch.
    ///
    /// On conflicts the returned repository carries them in
    /// `merge_conflicts` and no commit is created.
    pub fn merge_branch(&self, source_branch_name: &str, options: &MergeOptions) -> VcsResult<Self> {
        let source = self
            .branches
            .get(source_branch_name)
            .ok_or_else(|| VcsError::BranchNotFound(source_branch_name.to_string()))?;

        let author = match &options.author {
            Some(author) if author.trim().is_empty() => return Err(VcsError::EmptyAuthor),
            Some(author) => author.clone(),
            None => self.default_author.clone(),
        };

        let Some(incoming_id) = source.head_commit_id else {
            debug!("branch {} has no commits, nothing to merge", source.name);
            let mut next = self.clone();
            next.merge_conflicts.clear();
            return Ok(next);
        };

        let current_id = self.head_commit_id();
        let current = self.head_snapshot();
        let incoming = self.snapshot_at(Some(incoming_id));

        let outcome = match options.strategy {
            MergeStrategy::HeadSnapshots => merge_snapshots(&current, &incoming),
            MergeStrategy::MergeBase => {
                let base = current_id.and_then(|ours| commit::find_merge_base(&self.commits, ours, incoming_id));
                merge_with_base(&self.snapshot_at(base), &current, &incoming)
            }
        };

        let mut next = self.clone();
        if !outcome.is_clean() {
            warn!(
                "merging {} into {} stopped on {} conflicting slot(s)",
                source.name,
                self.current_branch,
                outcome.conflicts.len()
            );
            next.merge_conflicts = outcome.conflicts;
            return Ok(next);
        }

        let message = options
            .message
            .clone()
            .unwrap_or_else(|| CommitMessage::merge(source.name.as_str(), self.current_branch.as_str()));
        let changes = diff_snapshots(&current, &outcome.merged);
        let merge_commit = CommitBuilder::new()
            .parent(current_id)
            .message(message)
            .author(author)
            .snapshot(outcome.merged)
            .changes(changes)
            .build()?;

        let id = next.push_commit(merge_commit);
        next.merge_conflicts.clear();
        debug!("merged {} into {} as {}", source.name, self.current_branch, id);
        Ok(next)
    }

    /// Nearest common ancestor of two commits in this repository.
    pub fn find_merge_base(&self, a: CommitId, b: CommitId) -> Option<CommitId> {
        commit::find_merge_base(&self.commits, a, b)
    }

    /// Conflicts left by the last merge attempt.
    pub fn merge_conflicts(&self) -> &[Conflict] {
        &self.merge_conflicts
    }

    /// check if a merge is waiting for conflict resolution
    pub fn has_pending_merge(&self) -> bool {
        !self.merge_conflicts.is_empty()
    }

    /// Resolve one conflict: write the chosen content to the working slot and stage it.
    pub fn resolve_conflict(&self, slot: &str, resolution: Resolution) -> VcsResult<Self> {
        let conflict = self
            .merge_conflicts
            .iter()
            .find(|c| c.slot_name.as_str() == slot)
            .ok_or_else(|| VcsError::ConflictNotFound(slot.to_string()))?;

        let chosen = match resolution {
            Resolution::Current => conflict.current_content.clone(),
            Resolution::Incoming => conflict.incoming_content.clone(),
            Resolution::Content(content) => Some(content),
        };

        let mut next = self.clone();
        match chosen {
            Some(content) => {
                next.working_slots.insert(conflict.slot_name.clone(), content);
            }
            None => {
                next.working_slots.remove(&conflict.slot_name);
            }
        }

        debug!("resolved conflict on {}", conflict.slot_name);
        Ok(next.stage_changes(&StageSelector::Slots(vec![conflict.slot_name.clone()])))
    }

    /// Drop all pending conflicts without merging.
    pub fn abort_merge(&self) -> Self {
        let mut next = self.clone();
        next.merge_conflicts.clear();
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::refs::BranchOptions;
    use crate::storage::repository::{InitOptions, DEFAULT_AUTHOR};
    use crate::storage::types::SlotName;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn commit_slot(repo: Repository, slot: &str, content: &str, message: &str) -> Repository {
        repo.set_working_slot(slot, content)
            .unwrap()
            .stage_changes(&StageSelector::All)
            .commit(message, "alice")
            .unwrap()
    }

    /// main: prompt=Hello; feature branched off and committed prompt=Feature content
    fn diverged() -> Repository {
        let repo = commit_slot(Repository::init(InitOptions::default()), "prompt", "Hello", "Add initial prompt")
            .create_branch("feature", &BranchOptions::default())
            .unwrap()
            .switch_branch("feature")
            .unwrap();
        commit_slot(repo, "prompt", "Feature content", "Feature prompt")
            .switch_branch("main")
            .unwrap()
    }

    fn slot(name: &str) -> SlotName {
        SlotName::new(name).unwrap()
    }

    #[test]
    fn test_branch_diverge_conflict() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt");
        let main_head = repo.head_commit_id();
        let commits = repo.commit_count();

        let merged = repo.merge_branch("feature", &MergeOptions::default()).unwrap();
        assert_eq!(
            merged.merge_conflicts(),
            &[Conflict {
                slot_name: slot("prompt"),
                current_content: Some(json!("Main branch content")),
                incoming_content: Some(json!("Feature content")),
            }]
        );
        assert_eq!(merged.commit_count(), commits);
        assert_eq!(merged.head_commit_id(), main_head);
        assert!(merged.has_pending_merge());
    }

    #[test]
    fn test_clean_merge() {
        // the working slots carried over from feature are staged along with metadata
        let repo = commit_slot(diverged(), "metadata", "{\"model\":\"small\"}", "Main metadata");
        let main_head = repo.head_commit_id();

        let merged = repo.merge_branch("feature", &MergeOptions::default()).unwrap();
        assert!(merged.merge_conflicts().is_empty());
        assert_eq!(merged.commit_count(), repo.commit_count() + 1);

        let head = merged.head_commit().unwrap();
        assert!(head.message.contains("Merge"));
        assert_eq!(head.author, DEFAULT_AUTHOR);
        assert_eq!(head.parent_id, main_head);
        assert_eq!(head.snapshot.get("prompt"), Some(&json!("Feature content")));
        assert_eq!(head.snapshot.get("metadata"), Some(&json!("{\"model\":\"small\"}")));
        assert_eq!(merged.branch("feature").unwrap().head_commit_id, repo.branch("feature").unwrap().head_commit_id);
    }

    #[test]
    fn test_merge_with_custom_author_and_message() {
        let merged = diverged()
            .merge_branch("feature", &MergeOptions::new().author("carol").message("Bring in feature"))
            .unwrap();
        // main's head snapshot only has prompt=Hello, which conflicts with the feature value
        assert!(merged.has_pending_merge());

        let merged = merged
            .abort_merge()
            .merge_branch(
                "feature",
                &MergeOptions::new()
                    .author("carol")
                    .message("Bring in feature")
                    .strategy(MergeStrategy::MergeBase),
            )
            .unwrap();
        let head = merged.head_commit().unwrap();
        assert_eq!(head.author, "carol");
        assert_eq!(head.message, "Bring in feature");
        assert_eq!(head.snapshot.get("prompt"), Some(&json!("Feature content")));
    }

    #[test]
    fn test_merge_errors() {
        let repo = diverged();
        assert!(matches!(
            repo.merge_branch("missing", &MergeOptions::default()).unwrap_err(),
            VcsError::BranchNotFound(_)
        ));
        assert!(matches!(
            repo.merge_branch("feature", &MergeOptions::new().author(" ")).unwrap_err(),
            VcsError::EmptyAuthor
        ));
    }

    #[test]
    fn test_merge_from_unborn_branch_is_noop() {
        let repo = Repository::init(InitOptions::default())
            .create_branch("empty", &BranchOptions::default())
            .unwrap();
        let repo = commit_slot(repo, "prompt", "Hello", "one");

        let merged = repo.merge_branch("empty", &MergeOptions::default()).unwrap();
        assert_eq!(merged, repo);
    }

    #[test]
    fn test_merge_into_unborn_branch() {
        let repo = Repository::init(InitOptions::default())
            .create_branch("fresh", &BranchOptions::default())
            .unwrap();
        let repo = commit_slot(repo, "prompt", "Hello", "one").switch_branch("fresh").unwrap();

        let merged = repo.merge_branch("main", &MergeOptions::default()).unwrap();
        let head = merged.head_commit().unwrap();
        assert!(head.is_root());
        assert_eq!(head.snapshot.get("prompt"), Some(&json!("Hello")));
    }

    #[test]
    fn test_merge_base_strategy_takes_changed_side() {
        // keep main's prompt as committed so only feature changes it
        let repo = diverged().set_working_slot("prompt", "Hello").unwrap();
        let repo = commit_slot(repo, "metadata", "m", "Main metadata");
        assert!(repo.merge_branch("feature", &MergeOptions::default()).unwrap().has_pending_merge());

        let merged = repo
            .merge_branch("feature", &MergeOptions::new().strategy(MergeStrategy::MergeBase))
            .unwrap();
        assert!(!merged.has_pending_merge());
        let snapshot = merged.head_snapshot();
        assert_eq!(snapshot.get("prompt"), Some(&json!("Feature content")));
        assert_eq!(snapshot.get("metadata"), Some(&json!("m")));
    }

    #[test]
    fn test_repository_merge_base() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt");
        let main_head = repo.head_commit_id().unwrap();
        let feature_head = repo.branch("feature").unwrap().head_commit_id.unwrap();

        let base = repo.find_merge_base(main_head, feature_head).unwrap();
        assert_eq!(base, repo.get_commit(main_head).unwrap().parent_id.unwrap());
        assert_eq!(repo.get_commit(base).unwrap().message, "Add initial prompt");
    }

    #[test]
    fn test_merge_base_strategy_propagates_deletion() {
        let repo = commit_slot(Repository::default(), "prompt", "Hello", "one");
        let repo = commit_slot(repo, "notes", "n", "two")
            .create_branch("cleanup", &BranchOptions::default())
            .unwrap()
            .switch_branch("cleanup")
            .unwrap()
            .remove_working_slot("notes")
            .stage_changes(&StageSelector::All)
            .commit("Drop notes", "bob")
            .unwrap()
            .switch_branch("main")
            .unwrap();

        let merged = repo
            .merge_branch("cleanup", &MergeOptions::new().strategy(MergeStrategy::MergeBase))
            .unwrap();
        assert_eq!(merged.head_snapshot().get("notes"), None);

        // head-snapshot merging keeps the slot, since only one side defines it
        let merged = repo.merge_branch("cleanup", &MergeOptions::default()).unwrap();
        assert_eq!(merged.head_snapshot().get("notes"), Some(&json!("n")));
    }

    #[test]
    fn test_merge_with_base_modify_delete_conflict() {
        let base: Snapshot = [(slot("a"), json!("1"))].into_iter().collect();
        let current: Snapshot = [(slot("a"), json!("2"))].into_iter().collect();
        let incoming = Snapshot::new();

        let outcome = merge_with_base(&base, &current, &incoming);
        assert_eq!(
            outcome.conflicts,
            vec![Conflict {
                slot_name: slot("a"),
                current_content: Some(json!("2")),
                incoming_content: None,
            }]
        );
        assert!(outcome.merged.is_empty());
    }

    #[test]
    fn test_merge_snapshots_excludes_conflicts() {
        let current: Snapshot = [(slot("a"), json!("1")), (slot("b"), json!("same"))].into_iter().collect();
        let incoming: Snapshot = [(slot("a"), json!("2")), (slot("b"), json!("same")), (slot("c"), json!("3"))]
            .into_iter()
            .collect();

        let outcome = merge_snapshots(&current, &incoming);
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.merged.get("a"), None);
        assert_eq!(outcome.merged.get("b"), Some(&json!("same")));
        assert_eq!(outcome.merged.get("c"), Some(&json!("3")));
    }

    #[test]
    fn test_resolve_conflict_then_commit() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt")
            .merge_branch("feature", &MergeOptions::default())
            .unwrap();

        let resolved = repo.resolve_conflict("prompt", Resolution::Incoming).unwrap();
        assert!(!resolved.has_pending_merge());
        assert_eq!(resolved.working_slot("prompt"), Some(&json!("Feature content")));
        assert_eq!(resolved.staging_area().len(), 1);

        let committed = resolved.commit("Take feature prompt", "alice").unwrap();
        let merged = committed.merge_branch("feature", &MergeOptions::default()).unwrap();
        assert!(!merged.has_pending_merge());
        assert_eq!(merged.commit_count(), committed.commit_count() + 1);
    }

    #[test]
    fn test_resolve_with_custom_content_and_missing_conflict() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt")
            .merge_branch("feature", &MergeOptions::default())
            .unwrap();

        let resolved = repo
            .resolve_conflict("prompt", Resolution::Content(json!("Both, combined")))
            .unwrap();
        assert_eq!(resolved.working_slot("prompt"), Some(&json!("Both, combined")));

        assert!(matches!(
            resolved.resolve_conflict("prompt", Resolution::Current).unwrap_err(),
            VcsError::ConflictNotFound(_)
        ));
    }

    #[test]
    fn test_commit_blocked_on_conflicting_staged_slot() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt")
            .set_working_slot("prompt", "Staged before merge")
            .unwrap()
            .stage_changes(&StageSelector::All)
            .merge_branch("feature", &MergeOptions::default())
            .unwrap();

        let err = repo.commit("Try anyway", "alice").unwrap_err();
        match err {
            VcsError::MergeConflictsDetected { conflicts } => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].slot_name.as_str(), "prompt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_staging_unrelated_slot_keeps_conflict() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt")
            .merge_branch("feature", &MergeOptions::default())
            .unwrap()
            .set_working_slot("metadata", "m")
            .unwrap()
            .stage_changes(&StageSelector::All);

        assert!(repo.has_pending_merge());
        assert_eq!(repo.merge_conflicts()[0].slot_name.as_str(), "prompt");
        assert!(repo.stage_changes(&StageSelector::All).has_pending_merge());

        // only metadata is staged, so committing it is allowed
        let committed = repo.commit("Metadata only", "alice").unwrap();
        assert!(committed.has_pending_merge());
    }

    #[test]
    fn test_staging_all_does_not_resolve_prestaged_conflict() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt")
            .set_working_slot("prompt", "Staged before merge")
            .unwrap()
            .stage_changes(&StageSelector::All)
            .merge_branch("feature", &MergeOptions::default())
            .unwrap()
            .set_working_slot("metadata", "m")
            .unwrap()
            .stage_changes(&StageSelector::All);

        assert!(repo.has_pending_merge());
        assert!(matches!(
            repo.commit("Sneak prompt through", "alice").unwrap_err(),
            VcsError::MergeConflictsDetected { .. }
        ));
    }

    #[test]
    fn test_restaging_edited_or_named_slot_clears_conflict() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt")
            .merge_branch("feature", &MergeOptions::default())
            .unwrap();

        let edited = repo
            .set_working_slot("prompt", "Hand merged")
            .unwrap()
            .stage_changes(&StageSelector::All);
        assert!(!edited.has_pending_merge());

        let kept = repo.stage_changes(&StageSelector::slots(["prompt"]).unwrap());
        assert!(!kept.has_pending_merge());
        assert!(kept.staging_area().is_empty());
    }

    #[test]
    fn test_abort_merge() {
        let repo = commit_slot(diverged(), "prompt", "Main branch content", "Main prompt")
            .merge_branch("feature", &MergeOptions::default())
            .unwrap();
        assert!(!repo.abort_merge().has_pending_merge());
    }
}
