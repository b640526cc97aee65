//! The mutable working state of one merge run.
//!
//! A [`MergeScope`] owns the base model graph, the two change sets, the
//! pending/applied status of every change, and the cemetery of objects
//! deleted in the current speculative state. It performs no search logic
//! itself: the exploration engine is the single writer, flipping change
//! status and cemetery membership as transitions commit and undo.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Change, ChangeSet, Id, ModelGraph, Side};

// ---------------------------------------------------------------------------
// ChangeStatus
// ---------------------------------------------------------------------------

/// Whether a change has been applied in the current speculative state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    /// Not yet applied on the current trajectory.
    Pending,
    /// Applied by a committed transition; reverts to pending on undo.
    Applied,
}

// ---------------------------------------------------------------------------
// MergeScope
// ---------------------------------------------------------------------------

/// Shared mutable state of a merge run: base graph, both change sets with
/// their status, and the cemetery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeScope {
    graph: ModelGraph,
    local: ChangeSet,
    remote: ChangeSet,
    local_status: Vec<ChangeStatus>,
    remote_status: Vec<ChangeStatus>,
    cemetery: BTreeSet<Id>,
}

impl MergeScope {
    /// Build a scope over the base graph and the two sides' changes. All
    /// changes start out pending and the cemetery starts empty.
    #[must_use]
    pub fn new(graph: ModelGraph, local: ChangeSet, remote: ChangeSet) -> Self {
        let local_status = vec![ChangeStatus::Pending; local.len()];
        let remote_status = vec![ChangeStatus::Pending; remote.len()];
        Self {
            graph,
            local,
            remote,
            local_status,
            remote_status,
            cemetery: BTreeSet::new(),
        }
    }

    /// The current (speculatively merged) model graph.
    #[must_use]
    pub const fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    /// Mutable access for operation appliers.
    pub const fn graph_mut(&mut self) -> &mut ModelGraph {
        &mut self.graph
    }

    /// The change set of `side`.
    #[must_use]
    pub const fn changes(&self, side: Side) -> &ChangeSet {
        match side {
            Side::Local => &self.local,
            Side::Remote => &self.remote,
        }
    }

    /// The change at (`side`, `index`).
    #[must_use]
    pub fn change(&self, side: Side, index: usize) -> Option<&Change> {
        self.changes(side).get(index)
    }

    /// Status of the change at (`side`, `index`).
    #[must_use]
    pub fn status(&self, side: Side, index: usize) -> Option<ChangeStatus> {
        let statuses = match side {
            Side::Local => &self.local_status,
            Side::Remote => &self.remote_status,
        };
        statuses.get(index).copied()
    }

    /// Indices of still-pending changes on `side`, in recorded order.
    #[must_use]
    pub fn pending_indices(&self, side: Side) -> Vec<usize> {
        let statuses = match side {
            Side::Local => &self.local_status,
            Side::Remote => &self.remote_status,
        };
        statuses
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == ChangeStatus::Pending)
            .map(|(i, _)| i)
            .collect()
    }

    /// Returns `true` if any MUST-tagged change on either side is still
    /// pending.
    #[must_use]
    pub fn has_pending_must(&self) -> bool {
        [Side::Local, Side::Remote].into_iter().any(|side| {
            self.pending_indices(side).into_iter().any(|i| {
                self.change(side, i)
                    .is_some_and(|c| c.priority.is_must())
            })
        })
    }

    pub(crate) fn set_status(&mut self, side: Side, index: usize, status: ChangeStatus) {
        let statuses = match side {
            Side::Local => &mut self.local_status,
            Side::Remote => &mut self.remote_status,
        };
        if let Some(slot) = statuses.get_mut(index) {
            *slot = status;
        }
    }

    // -- Cemetery --

    /// Ids deleted in the current speculative state, in id order.
    #[must_use]
    pub const fn cemetery(&self) -> &BTreeSet<Id> {
        &self.cemetery
    }

    /// Returns `true` if `id` is currently deleted.
    #[must_use]
    pub fn is_buried(&self, id: &Id) -> bool {
        self.cemetery.contains(id)
    }

    pub(crate) fn bury(&mut self, id: Id) {
        self.cemetery.insert(id);
    }

    // -- Invariant checks --

    /// Returns `true` if `change` can be applied in the current state: every
    /// object it requires exists in the graph, and (for creates) its own id
    /// is still free.
    #[must_use]
    pub fn is_applicable(&self, change: &Change) -> bool {
        if change.required_ids().iter().any(|id| !self.graph.contains(id)) {
            return false;
        }
        if matches!(change.op, crate::model::ChangeOp::Create { .. }) {
            return !self.graph.contains(&change.src) && !self.is_buried(&change.src);
        }
        true
    }

    /// Pending non-delete changes whose required objects sit in the cemetery.
    ///
    /// A non-empty result marks the current state as violating the merge
    /// invariant: such a state is a dead end, not a solution.
    #[must_use]
    pub fn cemetery_conflicts(&self) -> Vec<(Side, usize, Id)> {
        let mut conflicts = Vec::new();
        for side in [Side::Local, Side::Remote] {
            for index in self.pending_indices(side) {
                let Some(change) = self.change(side, index) else {
                    continue;
                };
                if change.is_delete() {
                    continue;
                }
                for id in change.required_ids() {
                    if self.is_buried(id) {
                        conflicts.push((side, index, id.clone()));
                    }
                }
            }
        }
        conflicts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
