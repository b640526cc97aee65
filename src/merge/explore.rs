//! Run orchestration: wire scope, engine, and strategy into one merge run.
//!
//! [`MergeRun`] is the front door. It validates the inputs (metamodel kinds,
//! applier coverage), performs delete-dependency analysis up front, then
//! drives the [`MergeStrategy`] over an [`ExplorerEngine`] until the solution
//! or step budget is spent, collecting each solution state's trajectory and
//! merged graph into a [`MergeReport`].

use std::collections::BTreeSet;

use crate::config::RunConfig;
use crate::error::MergeError;
use crate::merge::apply::ApplierSet;
use crate::merge::dependency::{ArenaResolver, DependencyIndex, IdResolver};
use crate::merge::engine::{ExplorerEngine, Objective, StateId, Transition};
use crate::merge::scope::MergeScope;
use crate::merge::strategy::MergeStrategy;
use crate::model::{ChangeOp, ChangeSet, ModelGraph};

// ---------------------------------------------------------------------------
// Metamodel
// ---------------------------------------------------------------------------

/// The object kinds a model may contain.
///
/// An empty metamodel accepts every kind; declaring at least one kind turns
/// on validation of create descriptors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metamodel {
    kinds: BTreeSet<String>,
}

impl Metamodel {
    /// Declare a kind.
    pub fn declare(&mut self, kind: impl Into<String>) {
        self.kinds.insert(kind.into());
    }

    /// Returns `true` if `kind` may appear in a model.
    #[must_use]
    pub fn accepts(&self, kind: &str) -> bool {
        self.kinds.is_empty() || self.kinds.contains(kind)
    }
}

// ---------------------------------------------------------------------------
// MergeOptions
// ---------------------------------------------------------------------------

/// Pluggable pieces of a merge run.
pub struct MergeOptions {
    /// Operation appliers, routed by change kind.
    pub appliers: ApplierSet,
    /// Identifier resolution for dependency analysis.
    pub resolver: Box<dyn IdResolver>,
    /// Extra hard objectives a solution must satisfy.
    pub objectives: Vec<Box<dyn Objective>>,
    /// Kind validation for create descriptors.
    pub metamodel: Metamodel,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            appliers: ApplierSet::defaults(),
            resolver: Box::new(ArenaResolver),
            objectives: Vec::new(),
            metamodel: Metamodel::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Solutions
// ---------------------------------------------------------------------------

/// One accepted merge.
#[derive(Clone, Debug)]
pub struct MergeSolution {
    /// Identity of the solution state.
    pub state_id: StateId,
    /// The transitions that led there, in firing order.
    pub trajectory: Vec<Transition>,
    /// The merged model graph.
    pub graph: ModelGraph,
}

/// What a finished run produced.
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Accepted merges, in discovery order. Distinct by state identity.
    pub solutions: Vec<MergeSolution>,
    /// Transitions committed over the whole run, including backtracked ones.
    pub steps: u64,
    /// The run stopped on its step budget rather than by exhausting the
    /// space or filling the solution quota.
    pub interrupted: bool,
}

// ---------------------------------------------------------------------------
// MergeRun
// ---------------------------------------------------------------------------

/// A validated, ready-to-execute merge run.
pub struct MergeRun {
    scope: MergeScope,
    options: MergeOptions,
    dependency_index: DependencyIndex,
    config: RunConfig,
}

impl std::fmt::Debug for MergeRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeRun")
            .field("scope", &self.scope)
            .field("dependency_index", &self.dependency_index)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MergeRun {
    /// Validate inputs and analyze delete dependencies.
    ///
    /// Priority prefixes set in `config` are applied to the change sets
    /// before anything else, so analysis and search see the final MUST/MAY
    /// tags. An unset prefix leaves that side's tags as the caller built
    /// them.
    ///
    /// # Errors
    /// [`MergeError::UnknownKind`] when a create descriptor's kind fails
    /// metamodel validation, [`MergeError::MissingApplier`] when a present
    /// change kind has no applier, and [`MergeError::AmbiguousIdentifier`]
    /// when dependency analysis resolves an id to several objects.
    pub fn new(
        graph: ModelGraph,
        mut local: ChangeSet,
        mut remote: ChangeSet,
        options: MergeOptions,
        config: RunConfig,
    ) -> Result<Self, MergeError> {
        if let Some(n) = config.priorities.local_must_prefix {
            local.mark_must_prefix(n);
        }
        if let Some(n) = config.priorities.remote_must_prefix {
            remote.mark_must_prefix(n);
        }

        for change in local.iter().chain(remote.iter()) {
            if let ChangeOp::Create { descriptor, .. } = &change.op {
                if !options.metamodel.accepts(&descriptor.kind) {
                    return Err(MergeError::UnknownKind {
                        kind: descriptor.kind.clone(),
                    });
                }
            }
            if options.appliers.get(change.kind()).is_none() {
                return Err(MergeError::MissingApplier {
                    kind: change.kind(),
                });
            }
        }

        let scope = MergeScope::new(graph, local, remote);
        let dependency_index = DependencyIndex::build(&scope, options.resolver.as_ref())?;
        if !dependency_index.is_empty() {
            tracing::debug!(
                blocked = dependency_index.len(),
                "delete dependencies detected"
            );
        }
        Ok(Self {
            scope,
            options,
            dependency_index,
            config,
        })
    }

    /// The delete-dependency index computed during setup. Each entry pairs an
    /// id some non-delete change relies on with a delete (on the other side)
    /// that would swallow it.
    #[must_use]
    pub const fn dependency_index(&self) -> &DependencyIndex {
        &self.dependency_index
    }

    /// Run the search to completion.
    ///
    /// Stops when `max_solutions` merges are found, the space is exhausted,
    /// or `max_steps` transitions have been committed (the run then reports
    /// itself interrupted).
    ///
    /// # Errors
    /// [`MergeError::Apply`] if an applier rejects a change the engine judged
    /// applicable; this indicates model corruption and aborts the run.
    pub fn execute(self) -> Result<MergeReport, MergeError> {
        let Self {
            scope,
            options,
            config,
            ..
        } = self;
        let mut engine = ExplorerEngine::new(scope, options.appliers);
        for objective in options.objectives {
            engine.push_objective(objective);
        }
        let mut strategy = config
            .search
            .seed
            .map_or_else(MergeStrategy::new, MergeStrategy::with_seed);

        let mut report = MergeReport::default();
        if engine.is_goal() {
            // Nothing mandatory to do: the base graph already is a merge.
            record_solution(&engine, &mut report);
        }

        while report.solutions.len() < config.search.max_solutions {
            if report.steps >= config.search.max_steps {
                strategy.interrupt();
            }
            let Some(transition) = strategy.next_transition(&mut engine, true) else {
                break;
            };
            report.steps += 1;
            let outcome = engine.apply(&transition)?;
            if outcome.satisfies_hard_objectives && !outcome.already_visited {
                record_solution(&engine, &mut report);
            }
            strategy.state_processed(&mut engine, &outcome);
        }
        report.interrupted = strategy.is_interrupted();
        tracing::debug!(
            solutions = report.solutions.len(),
            steps = report.steps,
            interrupted = report.interrupted,
            "merge run finished"
        );
        Ok(report)
    }
}

fn record_solution(engine: &ExplorerEngine, report: &mut MergeReport) {
    let solution = MergeSolution {
        state_id: engine.state_id().to_owned(),
        trajectory: engine.trajectory(),
        graph: engine.scope().graph().clone(),
    };
    tracing::debug!(state = %solution.state_id, depth = solution.trajectory.len(), "solution recorded");
    report.solutions.push(solution);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Change, ChangeOp, Id, ModelObject, Priority, Value};

    fn base_graph() -> ModelGraph {
        let mut graph = ModelGraph::default();
        graph
            .insert_root(ModelObject::new("root", "Container"))
            .unwrap();
        graph
            .insert_child(&"root".into(), ModelObject::new("item", "Item"))
            .unwrap();
        graph
    }

    fn seeded_config(seed: u64) -> RunConfig {
        let mut config = RunConfig::default();
        config.search.seed = Some(seed);
        config
    }

    fn set_attr(src: &str, name: &str, value: i64) -> Change {
        Change::new(
            src,
            ChangeOp::SetAttribute {
                name: name.into(),
                value: Value::Int(value),
            },
        )
    }

    #[test]
    fn metamodel_empty_accepts_all() {
        let mm = Metamodel::default();
        assert!(mm.accepts("Anything"));
        let mut mm = Metamodel::default();
        mm.declare("Item");
        assert!(mm.accepts("Item"));
        assert!(!mm.accepts("Teleporter"));
    }

    #[test]
    fn undeclared_create_kind_is_rejected() {
        let mut local = ChangeSet::default();
        local.push(Change::new(
            "new-1",
            ChangeOp::Create {
                container: Some(Id::from("root")),
                descriptor: ModelObject::new("new-1", "Teleporter"),
            },
        ));
        let mut options = MergeOptions::default();
        options.metamodel.declare("Container");
        options.metamodel.declare("Item");
        let err = MergeRun::new(
            base_graph(),
            local,
            ChangeSet::default(),
            options,
            RunConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::UnknownKind { kind } if kind == "Teleporter"));
    }

    #[test]
    fn priority_prefixes_are_applied() {
        let mut local = ChangeSet::default();
        local.push(set_attr("item", "a", 1));
        local.push(set_attr("item", "b", 2));
        let mut config = seeded_config(1);
        config.priorities.local_must_prefix = Some(1);
        let run = MergeRun::new(
            base_graph(),
            local,
            ChangeSet::default(),
            MergeOptions::default(),
            config,
        )
        .unwrap();
        assert_eq!(
            run.scope.change(crate::model::Side::Local, 0).unwrap().priority,
            Priority::Must
        );
        assert_eq!(
            run.scope.change(crate::model::Side::Local, 1).unwrap().priority,
            Priority::May
        );
    }

    #[test]
    fn run_commits_all_musts() {
        let mut local = ChangeSet::default();
        local.push(set_attr("item", "weight", 7));
        let mut remote = ChangeSet::default();
        remote.push(set_attr("item", "color", 3));
        let mut config = seeded_config(42);
        config.priorities.local_must_prefix = Some(1);
        config.priorities.remote_must_prefix = Some(1);

        let run = MergeRun::new(
            base_graph(),
            local,
            remote,
            MergeOptions::default(),
            config,
        )
        .unwrap();
        let report = run.execute().unwrap();

        assert_eq!(report.solutions.len(), 1);
        assert!(!report.interrupted);
        let solution = &report.solutions[0];
        assert_eq!(solution.trajectory.len(), 2);
        assert!(solution.trajectory.iter().all(Transition::is_must));
        let item = solution.graph.get(&"item".into()).unwrap();
        assert_eq!(item.attributes["weight"], vec![Value::Int(7)]);
        assert_eq!(item.attributes["color"], vec![Value::Int(3)]);
    }

    #[test]
    fn direct_priority_tags_survive_default_config() {
        // Priorities assigned on the changes themselves stay in force when
        // the config leaves the prefixes unset.
        let mut local = ChangeSet::default();
        local.push(set_attr("item", "weight", 7));
        local.mark_must_prefix(1);
        let run = MergeRun::new(
            base_graph(),
            local,
            ChangeSet::default(),
            MergeOptions::default(),
            seeded_config(3),
        )
        .unwrap();
        let report = run.execute().unwrap();
        assert_eq!(report.solutions.len(), 1);
        let solution = &report.solutions[0];
        assert_eq!(solution.trajectory.len(), 1);
        assert!(solution.trajectory[0].is_must());
        let item = solution.graph.get(&"item".into()).unwrap();
        assert_eq!(item.attributes["weight"], vec![Value::Int(7)]);
    }

    #[test]
    fn second_solution_layers_a_may_change() {
        let mut local = ChangeSet::default();
        local.push(set_attr("item", "weight", 7));
        let mut remote = ChangeSet::default();
        remote.push(set_attr("item", "color", 3));
        let mut config = seeded_config(8);
        config.search.max_solutions = 2;
        config.priorities.local_must_prefix = Some(1);

        let run = MergeRun::new(
            base_graph(),
            local,
            remote,
            MergeOptions::default(),
            config,
        )
        .unwrap();
        let report = run.execute().unwrap();

        assert_eq!(report.solutions.len(), 2);
        // First: the mandatory set alone. Second: the optional change layered
        // on top of it.
        assert_eq!(report.solutions[0].trajectory.len(), 1);
        assert!(report.solutions[0].trajectory.iter().all(Transition::is_must));
        assert_eq!(report.solutions[1].trajectory.len(), 2);
        assert!(
            report.solutions[1]
                .trajectory
                .iter()
                .any(|t| !t.is_must()),
            "the alternative merge includes the optional change"
        );
        let item = report.solutions[1].graph.get(&"item".into()).unwrap();
        assert_eq!(item.attributes["weight"], vec![Value::Int(7)]);
        assert_eq!(item.attributes["color"], vec![Value::Int(3)]);
    }

    #[test]
    fn trivial_scope_is_already_a_solution() {
        let run = MergeRun::new(
            base_graph(),
            ChangeSet::default(),
            ChangeSet::default(),
            MergeOptions::default(),
            seeded_config(5),
        )
        .unwrap();
        let report = run.execute().unwrap();
        assert_eq!(report.solutions.len(), 1);
        assert_eq!(report.steps, 0);
        assert!(report.solutions[0].trajectory.is_empty());
    }

    #[test]
    fn step_budget_interrupts() {
        let mut local = ChangeSet::default();
        local.push(Change {
            src: "item".into(),
            op: ChangeOp::SetAttribute {
                name: "a".into(),
                value: Value::Int(1),
            },
            priority: Priority::Must,
        });
        let mut config = seeded_config(9);
        config.search.max_steps = 0;
        let run = MergeRun::new(
            base_graph(),
            local,
            ChangeSet::default(),
            MergeOptions::default(),
            config,
        )
        .unwrap();
        let report = run.execute().unwrap();
        assert!(report.interrupted);
        assert!(report.solutions.is_empty());
        assert_eq!(report.steps, 0);
    }

    #[test]
    fn dependency_index_is_exposed() {
        let mut local = ChangeSet::default();
        local.push(Change::new("item", ChangeOp::Delete));
        let mut remote = ChangeSet::default();
        remote.push(set_attr("item", "a", 1));
        let run = MergeRun::new(
            base_graph(),
            local,
            remote,
            MergeOptions::default(),
            seeded_config(2),
        )
        .unwrap();
        assert!(run.dependency_index().is_blocked_for(&"item".into()));
    }

    struct RequireAttr;
    impl Objective for RequireAttr {
        fn satisfied(&self, scope: &MergeScope) -> bool {
            scope
                .graph()
                .get(&"item".into())
                .is_some_and(|o| o.attributes.contains_key("color"))
        }
    }

    #[test]
    fn extra_objective_forces_a_may_change() {
        let mut remote = ChangeSet::default();
        remote.push(set_attr("item", "color", 3));
        let mut options = MergeOptions::default();
        options.objectives.push(Box::new(RequireAttr));
        let run = MergeRun::new(
            base_graph(),
            ChangeSet::default(),
            remote,
            options,
            seeded_config(17),
        )
        .unwrap();
        let report = run.execute().unwrap();
        assert_eq!(report.solutions.len(), 1);
        assert_eq!(report.solutions[0].trajectory.len(), 1);
    }
}
