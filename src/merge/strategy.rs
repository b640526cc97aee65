//! Search strategy: MUST-first randomized exploration with backtracking.
//!
//! The strategy is a policy over a [`DesignSpace`]. At every state it offers
//! MUST-tagged transitions exclusively while any exist, picks uniformly at
//! random among the eligible ones, and backtracks out of exhausted states.
//! After the first solution it switches to "only new MUST" mode: MUST
//! transitions it has already traversed are withheld, so further solutions
//! are reached through fresh mandatory content (MAY transitions stay
//! eligible throughout).
//!
//! All search state is owned by the strategy instance; two concurrent runs
//! never share a transition ledger or an RNG.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::merge::engine::{DesignSpace, StepOutcome, Transition};

// ---------------------------------------------------------------------------
// MergeStrategy
// ---------------------------------------------------------------------------

/// Backtracking transition-selection policy for merge search.
pub struct MergeStrategy {
    rng: StdRng,
    interrupted: bool,
    only_new_must: bool,
    used_must: BTreeSet<String>,
}

impl MergeStrategy {
    /// A strategy seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_os_rng())
    }

    /// A strategy with a fixed seed, for reproducible runs.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            interrupted: false,
            only_new_must: false,
            used_must: BTreeSet::new(),
        }
    }

    /// Request cooperative shutdown; the next [`Self::next_transition`] call
    /// returns `None`.
    pub fn interrupt(&mut self) {
        self.interrupted = true;
    }

    /// Returns `true` once [`Self::interrupt`] has been called.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Pick the next transition to fire, backtracking as far as needed to
    /// find an eligible one. Returns `None` when interrupted or when the
    /// whole space below the initial state is exhausted.
    ///
    /// `last_step_succeeded` is part of the engine's call protocol; the
    /// policy does not branch on it (a failed step already left its mark via
    /// [`Self::state_processed`]).
    pub fn next_transition(
        &mut self,
        space: &mut impl DesignSpace,
        _last_step_succeeded: bool,
    ) -> Option<Transition> {
        loop {
            if self.interrupted {
                return None;
            }
            let mut options = self.eligible(space);
            if options.is_empty() {
                if !space.undo_last() {
                    return None;
                }
                tracing::debug!(depth = space.depth(), "no eligible transition, backtracking");
                continue;
            }
            let pick = self.rng.random_range(0..options.len());
            let transition = options.swap_remove(pick);
            tracing::debug!(transition = %transition.label, "transition chosen");
            return Some(transition);
        }
    }

    /// Digest the outcome of the step the engine just committed and steer the
    /// trajectory accordingly:
    ///
    /// - revisited state: undo (back to the last MUST frontier if the step
    ///   itself was a MUST);
    /// - solution: switch to "only new MUST" mode and backtrack to the last
    ///   MUST frontier;
    /// - fresh MUST step: record it; hitting an already-recorded MUST while
    ///   in "only new MUST" mode means the pool of fresh MUSTs is spent, so
    ///   the mode is dropped.
    pub fn state_processed(&mut self, space: &mut impl DesignSpace, outcome: &StepOutcome) {
        let last = space.last_transition().cloned();

        if outcome.already_visited {
            if last.as_ref().is_some_and(Transition::is_must) {
                Self::undo_until_must(space);
            } else {
                space.undo_last();
            }
            return;
        }

        if outcome.satisfies_hard_objectives {
            tracing::debug!(state = %outcome.state_id, "solution state reached");
            self.only_new_must = true;
            Self::undo_until_must(space);
            return;
        }

        // Bookkeeping runs for cut states too; the engine offers no
        // transitions there and next_transition backtracks on its own.
        if let Some(t) = last {
            if t.is_must() && !self.used_must.insert(t.label) && self.only_new_must {
                self.only_new_must = false;
            }
        }
    }

    fn eligible(&self, space: &impl DesignSpace) -> Vec<Transition> {
        let mut options: Vec<Transition> = space
            .transitions_from_current_state()
            .into_iter()
            .filter(|t| !t.label.is_empty())
            .collect();
        if self.only_new_must {
            options.retain(|t| !self.used_must.contains(&t.label));
        } else if options.iter().any(Transition::is_must) {
            options.retain(Transition::is_must);
        }
        options
    }

    /// Undo until some MUST transition is available again or the initial
    /// state is reached.
    fn undo_until_must(space: &mut impl DesignSpace) {
        while space.undo_last() {
            if space
                .transitions_from_current_state()
                .iter()
                .any(Transition::is_must)
            {
                return;
            }
        }
    }
}

impl Default for MergeStrategy {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
