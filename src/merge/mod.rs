//! Guided three-way merge: scope, analysis, appliers, engine, strategy.
//!
//! The pipeline is setup → analyze → search:
//!
//! - **scope**: the shared state of a run — base graph, both change sets with
//!   their applied/pending status, and the cemetery of deleted ids.
//! - **dependency**: up-front delete-dependency analysis; finds the ids each
//!   non-delete change relies on and the opposite-side deletes that would
//!   swallow them.
//! - **apply**: operation appliers that commit one change to the scope,
//!   routed by change kind.
//! - **engine**: the design space — content-addressed states, transition
//!   enumeration, snapshot-based undo.
//! - **strategy**: MUST-first randomized backtracking over the engine.
//! - **explore**: [`MergeRun`], the validated front door that drives the
//!   strategy to a [`MergeReport`].
//!
//! # Determinism guarantee
//!
//! Given the same base graph, change sets, and seed, a run visits the same
//! states in the same order and reports the same solutions. Everything that
//! iterates is ordered (`BTreeMap`/`BTreeSet`), and the only randomness is
//! the injected, seedable transition picker.

pub mod apply;
pub mod dependency;
pub mod engine;
pub mod explore;
pub mod scope;
pub mod strategy;

pub use apply::{ApplierSet, ApplyError, DefaultApplier, OperationApplier};
pub use dependency::{ArenaResolver, DeleteRef, DependencyIndex, IdResolver};
pub use engine::{DesignSpace, ExplorerEngine, Objective, StateId, StepOutcome, Transition};
pub use explore::{MergeOptions, MergeReport, MergeRun, MergeSolution, Metamodel};
pub use scope::{ChangeStatus, MergeScope};
pub use strategy::MergeStrategy;
