//! Staging engine.
//!
//! Staged changes are derived by diffing working slots against the head
//! snapshot of the current branch. The staging area holds at most one entry
//! per slot; restaging a slot replaces its entry in place, and a slot whose
//! working content is back to the committed value loses its stale entry.

use std::collections::BTreeSet;

use log::trace;

use crate::storage::error::{VcsError, VcsResult};
use crate::storage::repository::Repository;
use crate::storage::types::{ChangeType, SlotName, Snapshot, StagedChange};

/// Which slots a staging operation looks at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StageSelector {
    /// every slot in the working set or the head snapshot
    #[default]
    All,
    /// only the named slots
    Slots(Vec<SlotName>),
}

impl StageSelector {
    /// build a selector from raw slot names
    pub fn slots<I, S>(names: I) -> VcsResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let slots = names
            .into_iter()
            .map(|n| SlotName::new(n.as_ref()).map_err(VcsError::InvalidSlotName))
            .collect::<VcsResult<Vec<_>>>()?;
        Ok(Self::Slots(slots))
    }

    /// resolve the concrete set of slots this selector covers
    fn covered(&self, snapshot: &Snapshot, working: &Snapshot) -> BTreeSet<SlotName> {
        match self {
            StageSelector::All => snapshot.keys().chain(working.keys()).cloned().collect(),
            StageSelector::Slots(slots) => slots.iter().cloned().collect(),
        }
    }
}

/// Compare one slot between the committed snapshot and the working set.
///
/// returns None if the slot is unchanged
pub fn stage_slot(slot: &SlotName, snapshot: &Snapshot, working: &Snapshot) -> Option<StagedChange> {
    let committed = snapshot.get(slot);
    let current = working.get(slot);

    ChangeType::between(committed, current).map(|change_type| StagedChange {
        slot_name: slot.clone(),
        change_type,
        content: current.cloned(),
    })
}

impl Repository {
    /// Stage the selected working slots against the current head snapshot.
    ///
    /// Pending merge conflicts are cleared for slots named explicitly by a
    /// [`StageSelector::Slots`] selector. With [`StageSelector::All`] only
    /// slots whose staged entry is new or changed lose their conflict.
    pub fn stage_changes(&self, selector: &StageSelector) -> Self {
        let snapshot = self.head_snapshot();
        let covered = selector.covered(&snapshot, &self.working_slots);

        let mut next = self.clone();
        let mut restaged = BTreeSet::new();
        for slot in &covered {
            let existing = next.staging_area.iter().position(|s| &s.slot_name == slot);
            match (stage_slot(slot, &snapshot, &self.working_slots), existing) {
                (Some(change), Some(pos)) => {
                    if next.staging_area[pos] != change {
                        trace!("restaged {} ({})", slot, change.change_type);
                        restaged.insert(slot.clone());
                        next.staging_area[pos] = change;
                    }
                }
                (Some(change), None) => {
                    trace!("staged {} ({})", slot, change.change_type);
                    restaged.insert(slot.clone());
                    next.staging_area.push(change);
                }
                (None, Some(pos)) => {
                    trace!("dropped stale staged entry for {}", slot);
                    next.staging_area.remove(pos);
                }
                (None, None) => {}
            }
        }

        let cleared = match selector {
            StageSelector::All => restaged,
            StageSelector::Slots(_) => covered,
        };
        next.merge_conflicts.retain(|c| !cleared.contains(&c.slot_name));
        next
    }

    /// Remove the selected slots from the staging area.
    pub fn unstage(&self, selector: &StageSelector) -> Self {
        let mut next = self.clone();
        match selector {
            StageSelector::All => next.staging_area.clear(),
            StageSelector::Slots(slots) => next.staging_area.retain(|s| !slots.contains(&s.slot_name)),
        }
        next
    }
}
