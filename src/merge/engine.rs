//! Design-space engine: states, transitions, apply and undo.
//!
//! A state is a [`MergeScope`] reached by committing some set of changes; a
//! transition commits one more pending change. The engine keeps the trajectory
//! from the initial state together with a snapshot per step, so undoing a
//! transition is a restore rather than an inverse operation. State identity is
//! content-addressed: two trajectories that commit the same set of changes
//! land on the same state id regardless of order.

use std::collections::BTreeSet;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::MergeError;
use crate::merge::apply::ApplierSet;
use crate::merge::scope::{ChangeStatus, MergeScope};
use crate::model::{Priority, Side};

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// One pending change offered as a step out of the current state.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Transition {
    /// Which side's change set the change lives in.
    pub side: Side,
    /// Index of the change within that side's change set.
    pub index: usize,
    /// Priority the change carries.
    pub priority: Priority,
    /// Stable label, `"{priority}:{side}:{index}"`.
    pub label: String,
}

impl Transition {
    #[must_use]
    pub fn new(side: Side, index: usize, priority: Priority) -> Self {
        let label = format!("{priority}:{side}:{index}");
        Self {
            side,
            index,
            priority,
            label,
        }
    }

    /// Returns `true` for MUST-tagged transitions.
    #[must_use]
    pub const fn is_must(&self) -> bool {
        self.priority.is_must()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

// ---------------------------------------------------------------------------
// States and outcomes
// ---------------------------------------------------------------------------

/// Content-addressed state identifier: lowercase hex of
/// `sha256(sorted committed labels)`.
pub type StateId = String;

/// What the engine observed about the state a transition landed on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepOutcome {
    /// Identity of the reached state.
    pub state_id: StateId,
    /// The reached state had been visited earlier in this run.
    pub already_visited: bool,
    /// The reached state satisfies every hard objective (a solution).
    pub satisfies_hard_objectives: bool,
    /// The reached state violates a global constraint (a dead end).
    pub constraints_violated: bool,
}

/// An additional hard objective a solution state must satisfy, on top of the
/// built-in "no pending MUST, no cemetery conflict" condition.
pub trait Objective {
    /// Returns `true` if the objective holds in `scope`.
    fn satisfied(&self, scope: &MergeScope) -> bool;
}

// ---------------------------------------------------------------------------
// DesignSpace
// ---------------------------------------------------------------------------

/// The read-and-navigate surface a search strategy needs.
pub trait DesignSpace {
    /// Eligible transitions out of the current state. Empty from goal states,
    /// constraint-violating states, and states whose every applicable
    /// transition has already been fired from them.
    fn transitions_from_current_state(&self) -> Vec<Transition>;

    /// Undo the most recent transition. Returns `false` at the initial state.
    fn undo_last(&mut self) -> bool;

    /// Number of transitions between the initial state and the current one.
    fn depth(&self) -> usize;

    /// The transition that produced the current state, if any.
    fn last_transition(&self) -> Option<&Transition>;
}

// ---------------------------------------------------------------------------
// ExplorerEngine
// ---------------------------------------------------------------------------

struct Step {
    transition: Transition,
    /// Scope as it was before the transition fired.
    snapshot: MergeScope,
}

/// Backtracking explorer over a [`MergeScope`].
///
/// Owns the scope and the trajectory. The strategy picks transitions; the
/// engine commits them through the registered appliers, tracks visited states
/// and fired `(state, transition)` pairs, and restores snapshots on undo.
pub struct ExplorerEngine {
    scope: MergeScope,
    appliers: ApplierSet,
    objectives: Vec<Box<dyn Objective>>,
    trajectory: Vec<Step>,
    committed: BTreeSet<String>,
    state_id: StateId,
    visited: BTreeSet<StateId>,
    fired: BTreeSet<(StateId, String)>,
}

impl ExplorerEngine {
    /// Start exploration at `scope` (no changes committed). The initial state
    /// counts as visited.
    #[must_use]
    pub fn new(scope: MergeScope, appliers: ApplierSet) -> Self {
        let committed = BTreeSet::new();
        let state_id = hash_state(&committed);
        let mut visited = BTreeSet::new();
        visited.insert(state_id.clone());
        Self {
            scope,
            appliers,
            objectives: Vec::new(),
            trajectory: Vec::new(),
            committed,
            state_id,
            visited,
            fired: BTreeSet::new(),
        }
    }

    /// Add a hard objective beyond the built-in goal condition.
    pub fn push_objective(&mut self, objective: Box<dyn Objective>) {
        self.objectives.push(objective);
    }

    /// The scope in its current speculative state.
    #[must_use]
    pub const fn scope(&self) -> &MergeScope {
        &self.scope
    }

    /// Identity of the current state.
    #[must_use]
    pub fn state_id(&self) -> &str {
        &self.state_id
    }

    /// Labels committed along the current trajectory, in firing order.
    #[must_use]
    pub fn trajectory(&self) -> Vec<Transition> {
        self.trajectory
            .iter()
            .map(|s| s.transition.clone())
            .collect()
    }

    /// Returns `true` if the current state is a solution: no pending MUST
    /// change on either side, no cemetery conflict, and every extra objective
    /// satisfied.
    #[must_use]
    pub fn is_goal(&self) -> bool {
        !self.scope.has_pending_must()
            && !self.is_cut()
            && self.objectives.iter().all(|o| o.satisfied(&self.scope))
    }

    /// Returns `true` if the current state violates a global constraint: some
    /// pending change requires an object the cemetery has swallowed.
    #[must_use]
    pub fn is_cut(&self) -> bool {
        !self.scope.cemetery_conflicts().is_empty()
    }

    /// Commit `transition` and report what kind of state it reached.
    ///
    /// On applier failure the scope is left untouched and the fault is
    /// surfaced; the transition still counts as fired from the old state, so
    /// re-enumeration will not offer it again.
    ///
    /// # Errors
    /// [`MergeError::UnknownTransition`] for a stale transition,
    /// [`MergeError::MissingApplier`] for an unserved change kind, and
    /// [`MergeError::Apply`] when the applier rejects the change.
    pub fn apply(&mut self, transition: &Transition) -> Result<StepOutcome, MergeError> {
        let change = self
            .scope
            .change(transition.side, transition.index)
            .cloned()
            .ok_or_else(|| MergeError::UnknownTransition {
                label: transition.label.clone(),
            })?;
        let applier =
            self.appliers
                .get(change.kind())
                .ok_or_else(|| MergeError::MissingApplier {
                    kind: change.kind(),
                })?;

        self.fired
            .insert((self.state_id.clone(), transition.label.clone()));

        let snapshot = self.scope.clone();
        if let Err(source) = applier.apply(&change, &mut self.scope) {
            self.scope = snapshot;
            return Err(MergeError::Apply {
                transition: transition.label.clone(),
                source,
            });
        }
        self.scope
            .set_status(transition.side, transition.index, ChangeStatus::Applied);

        self.trajectory.push(Step {
            transition: transition.clone(),
            snapshot,
        });
        self.committed.insert(transition.label.clone());
        self.state_id = hash_state(&self.committed);
        let already_visited = !self.visited.insert(self.state_id.clone());

        let outcome = StepOutcome {
            state_id: self.state_id.clone(),
            already_visited,
            satisfies_hard_objectives: self.is_goal(),
            constraints_violated: self.is_cut(),
        };
        tracing::debug!(
            transition = %transition.label,
            state = %outcome.state_id,
            visited = outcome.already_visited,
            goal = outcome.satisfies_hard_objectives,
            cut = outcome.constraints_violated,
            "transition committed"
        );
        Ok(outcome)
    }
}

impl DesignSpace for ExplorerEngine {
    fn transitions_from_current_state(&self) -> Vec<Transition> {
        // Goal and cut states terminate their trajectory.
        if self.is_cut() || self.is_goal() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for side in [Side::Local, Side::Remote] {
            for index in self.scope.pending_indices(side) {
                let Some(change) = self.scope.change(side, index) else {
                    continue;
                };
                if !self.scope.is_applicable(change) {
                    continue;
                }
                let t = Transition::new(side, index, change.priority);
                if self
                    .fired
                    .contains(&(self.state_id.clone(), t.label.clone()))
                {
                    continue;
                }
                out.push(t);
            }
        }
        out
    }

    fn undo_last(&mut self) -> bool {
        let Some(step) = self.trajectory.pop() else {
            return false;
        };
        self.scope = step.snapshot;
        self.committed.remove(&step.transition.label);
        self.state_id = hash_state(&self.committed);
        tracing::debug!(transition = %step.transition.label, "transition undone");
        true
    }

    fn depth(&self) -> usize {
        self.trajectory.len()
    }

    fn last_transition(&self) -> Option<&Transition> {
        self.trajectory.last().map(|s| &s.transition)
    }
}

fn hash_state(committed: &BTreeSet<String>) -> StateId {
    let mut hasher = Sha256::new();
    for label in committed {
        hasher.update(label.as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for b in &digest {
        use std::fmt::Write as _;
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
