//! Slot-level diffs between snapshots.
//!
//! Diffs compare whole content values per slot; there is no line-level
//! diffing. Either end of a diff can be a commit, a tag, the current head,
//! or the working slots.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::storage::error::{VcsError, VcsResult};
use crate::storage::repository::Repository;
use crate::storage::types::{ChangeType, CommitId, SlotChange, Snapshot, TagName};

/// One end of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffRef {
    /// head of the current branch
    Head,
    /// uncommitted working slots
    Working,
    Commit(CommitId),
    Tag(TagName),
}

impl DiffRef {
    pub const HEAD: &'static str = "HEAD";
    pub const WORKING: &'static str = "WORKING";
}

impl FromStr for DiffRef {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            Self::HEAD => Ok(DiffRef::Head),
            Self::WORKING => Ok(DiffRef::Working),
            _ => {
                if let Some(id) = CommitId::parse(s) {
                    Ok(DiffRef::Commit(id))
                } else if let Ok(tag) = TagName::new(s) {
                    Ok(DiffRef::Tag(tag))
                } else {
                    Err(VcsError::CommitNotFound(s.to_string()))
                }
            }
        }
    }
}

impl fmt::Display for DiffRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffRef::Head => f.write_str(Self::HEAD),
            DiffRef::Working => f.write_str(Self::WORKING),
            DiffRef::Commit(id) => write!(f, "{}", id),
            DiffRef::Tag(tag) => write!(f, "{}", tag),
        }
    }
}

/// Per-slot changes turning `old` into `new`, ordered by slot name.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> Vec<SlotChange> {
    let mut slots: Vec<_> = old.keys().chain(new.keys()).collect();
    slots.sort();
    slots.dedup();

    slots
        .into_iter()
        .filter_map(|slot| SlotChange::between(slot, old.get(slot), new.get(slot)))
        .collect()
}

/// Apply change records on top of a snapshot.
pub fn apply_diff(base: &Snapshot, changes: &[SlotChange]) -> Snapshot {
    let mut snapshot = base.clone();
    for change in changes {
        match (change.change_type, &change.new_content) {
            (ChangeType::Deletion, _) | (_, None) => {
                snapshot.remove(&change.slot_name);
            }
            (_, Some(content)) => {
                snapshot.insert(change.slot_name.clone(), content.clone());
            }
        }
    }
    snapshot
}

impl Repository {
    /// Resolve a diff ref to the snapshot it names.
    pub fn resolve_snapshot(&self, reference: &DiffRef) -> VcsResult<Cow<'_, Snapshot>> {
        match reference {
            DiffRef::Head => Ok(self.head_snapshot()),
            DiffRef::Working => Ok(Cow::Borrowed(&self.working_slots)),
            DiffRef::Commit(id) => self
                .get_commit(*id)
                .map(|c| Cow::Borrowed(&c.snapshot))
                .ok_or_else(|| VcsError::CommitNotFound(id.to_string())),
            DiffRef::Tag(name) => self
                .tags
                .get(name)
                .and_then(|t| self.get_commit(t.commit_id))
                .map(|c| Cow::Borrowed(&c.snapshot))
                .ok_or_else(|| VcsError::CommitNotFound(name.to_string())),
        }
    }

    /// Parse a ref string against this repository.
    ///
    /// Text shaped like a commit id that names no commit falls back to a tag
    /// of the same name.
    pub fn lookup_ref(&self, reference: &str) -> VcsResult<DiffRef> {
        let parsed: DiffRef = reference.parse()?;
        if let DiffRef::Commit(id) = parsed {
            if !self.commits.contains_key(&id) {
                if let Some(tag) = self.tags.get(reference) {
                    return Ok(DiffRef::Tag(tag.name.clone()));
                }
            }
        }
        Ok(parsed)
    }

    /// Diff two refs given as strings: commit ids, tag names, `HEAD` or `WORKING`.
    pub fn get_diff(&self, from_ref: &str, to_ref: &str) -> VcsResult<Vec<SlotChange>> {
        let from = self.lookup_ref(from_ref)?;
        let to = self.lookup_ref(to_ref)?;
        self.diff_refs(&from, &to)
    }

    pub fn diff_refs(&self, from: &DiffRef, to: &DiffRef) -> VcsResult<Vec<SlotChange>> {
        let old = self.resolve_snapshot(from)?;
        let new = self.resolve_snapshot(to)?;
        Ok(diff_snapshots(&old, &new))
    }
}
