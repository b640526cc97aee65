//! Delete-dependency analysis.
//!
//! Before the search starts, both change sets are inspected once to find out
//! which deletions on one side would pull the ground out from under pending
//! changes on the other side. For every non-delete change, the containment
//! ancestor chain of each object it touches is recorded as "needed"; a
//! delete on the opposite side whose target appears in that chain is blocked
//! by the pending change.
//!
//! The resulting [`DependencyIndex`] is read-only during search. The
//! enforced transition filtering is the priority rule in the strategy; the
//! index backs diagnostics and lets callers (and tests) explain why a delete
//! had to wait.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::MergeError;
use crate::model::{Change, ChangeOp, Id, ModelGraph, ModelObject, Side};

use super::scope::MergeScope;

// ---------------------------------------------------------------------------
// IdResolver
// ---------------------------------------------------------------------------

/// Resolves a stable identifier to the matching objects within one model
/// copy.
///
/// Zero matches means "the object does not exist yet" (it will be created);
/// more than one match is a fatal analysis error — identifiers are
/// contractually unique within a model copy.
pub trait IdResolver {
    /// All objects in `graph` that carry `id`.
    fn resolve<'g>(&self, graph: &'g ModelGraph, id: &Id) -> Vec<&'g ModelObject>;
}

/// The default resolver: a direct arena lookup, which by construction yields
/// at most one match.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArenaResolver;

impl IdResolver for ArenaResolver {
    fn resolve<'g>(&self, graph: &'g ModelGraph, id: &Id) -> Vec<&'g ModelObject> {
        graph.get(id).into_iter().collect()
    }
}

// ---------------------------------------------------------------------------
// DeleteRef
// ---------------------------------------------------------------------------

/// Points at one delete change inside a change set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeleteRef {
    /// The side whose change set holds the delete.
    pub side: Side,
    /// Index of the delete within that side's change set.
    pub index: usize,
    /// The id the delete targets.
    pub target: Id,
}

// ---------------------------------------------------------------------------
// DependencyIndex
// ---------------------------------------------------------------------------

/// Maps an identifier to the deletes (on the opposite side) that are blocked
/// while that identifier's ancestor chain is needed by a pending non-delete
/// change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyIndex {
    blocked: BTreeMap<Id, BTreeSet<DeleteRef>>,
}

impl DependencyIndex {
    /// Analyze both directions (local deletes against remote changes and
    /// vice versa) and build the index.
    ///
    /// # Errors
    /// Returns [`MergeError::AmbiguousIdentifier`] if any identifier resolves
    /// to more than one object.
    pub fn build(scope: &MergeScope, resolver: &dyn IdResolver) -> Result<Self, MergeError> {
        let mut index = Self::default();
        index.analyze(scope, resolver, Side::Local)?;
        index.analyze(scope, resolver, Side::Remote)?;
        Ok(index)
    }

    /// One direction: the non-delete changes of `from` block matching deletes
    /// of the opposite side.
    fn analyze(
        &mut self,
        scope: &MergeScope,
        resolver: &dyn IdResolver,
        from: Side,
    ) -> Result<(), MergeError> {
        let graph = scope.graph();
        let to = from.opposite();

        // Ancestor id -> ids of the objects whose pending changes need it.
        let mut needed: BTreeMap<Id, BTreeSet<Id>> = BTreeMap::new();
        for change in scope.changes(from) {
            for seed in analysis_seeds(change) {
                record_ancestors(graph, resolver, seed, &mut needed)?;
            }
        }

        for (index, change) in scope.changes(to).iter().enumerate() {
            if !change.is_delete() {
                continue;
            }
            if let Some(holders) = needed.get(&change.src) {
                let delete = DeleteRef {
                    side: to,
                    index,
                    target: change.src.clone(),
                };
                for holder in holders {
                    self.blocked
                        .entry(holder.clone())
                        .or_default()
                        .insert(delete.clone());
                }
            }
        }
        Ok(())
    }

    /// Returns `true` if any delete is blocked while `id` is needed.
    #[must_use]
    pub fn is_blocked_for(&self, id: &Id) -> bool {
        self.blocked.contains_key(id)
    }

    /// The deletes blocked while `id` is needed.
    #[must_use]
    pub fn deletes_blocked_by(&self, id: &Id) -> Vec<&DeleteRef> {
        self.blocked
            .get(id)
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    /// Iterate all (needed id, blocked delete) edges.
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &DeleteRef)> {
        self.blocked
            .iter()
            .flat_map(|(id, deletes)| deletes.iter().map(move |d| (id, d)))
    }

    /// Number of (needed id, blocked delete) edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocked.values().map(BTreeSet::len).sum()
    }

    /// Returns `true` if no delete is blocked by anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

/// The identifiers whose ancestor chains a non-delete change needs.
///
/// Creates need their container chain; attribute changes the source chain;
/// reference changes both source and target chains. Deletes seed nothing.
fn analysis_seeds(change: &Change) -> Vec<&Id> {
    match &change.op {
        ChangeOp::Create { container, .. } => container.iter().collect(),
        ChangeOp::Delete => Vec::new(),
        ChangeOp::SetAttribute { .. }
        | ChangeOp::AddAttribute { .. }
        | ChangeOp::RemoveAttribute { .. } => vec![&change.src],
        ChangeOp::SetReference { trg, .. }
        | ChangeOp::AddReference { trg, .. }
        | ChangeOp::RemoveReference { trg, .. } => vec![&change.src, trg],
    }
}

/// Record `seed` and every containment ancestor of it as needed by `seed`.
///
/// The walk stops when an id resolves to nothing (the object will be created
/// later, so no ancestor constraint can be inferred) or the chain reaches a
/// root. Seen-set guards against malformed parent cycles.
fn record_ancestors(
    graph: &ModelGraph,
    resolver: &dyn IdResolver,
    seed: &Id,
    needed: &mut BTreeMap<Id, BTreeSet<Id>>,
) -> Result<(), MergeError> {
    let mut seen: BTreeSet<Id> = BTreeSet::new();
    let mut current = seed.clone();
    loop {
        needed.entry(current.clone()).or_default().insert(seed.clone());
        if !seen.insert(current.clone()) {
            return Ok(());
        }
        let matches = resolver.resolve(graph, &current);
        match matches.len() {
            0 => return Ok(()),
            1 => {}
            n => {
                return Err(MergeError::AmbiguousIdentifier {
                    id: current,
                    matches: n,
                });
            }
        }
        match &matches[0].parent {
            Some(parent) => current = parent.clone(),
            None => return Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeSet, ModelObject, Value};

    fn railway() -> ModelGraph {
        // root ── line ── seg ── sensor
        let mut g = ModelGraph::new();
        g.insert_root(ModelObject::new("root", "Region")).unwrap();
        g.insert_child(&Id::from("root"), ModelObject::new("line", "Line"))
            .unwrap();
        g.insert_child(&Id::from("line"), ModelObject::new("seg", "Segment"))
            .unwrap();
        g.insert_child(&Id::from("seg"), ModelObject::new("sensor", "Sensor"))
            .unwrap();
        g
    }

    fn set_attr(src: &str) -> Change {
        Change::new(
            src,
            ChangeOp::SetAttribute {
                name: "label".into(),
                value: Value::from("x"),
            },
        )
    }

    fn delete(src: &str) -> Change {
        Change::new(src, ChangeOp::Delete)
    }

    fn build_index(local: Vec<Change>, remote: Vec<Change>) -> DependencyIndex {
        let scope = MergeScope::new(
            railway(),
            ChangeSet::from_changes(local),
            ChangeSet::from_changes(remote),
        );
        DependencyIndex::build(&scope, &ArenaResolver).unwrap()
    }

    #[test]
    fn delete_of_ancestor_is_blocked() {
        // Local edits the sensor; remote deletes its grandparent line.
        let index = build_index(vec![set_attr("sensor")], vec![delete("line")]);
        let blocked = index.deletes_blocked_by(&Id::from("sensor"));
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].side, Side::Remote);
        assert_eq!(blocked[0].index, 0);
        assert_eq!(blocked[0].target, Id::from("line"));
    }

    #[test]
    fn delete_of_target_itself_is_blocked() {
        let index = build_index(vec![set_attr("seg")], vec![delete("seg")]);
        assert!(index.is_blocked_for(&Id::from("seg")));
    }

    #[test]
    fn unrelated_delete_is_free() {
        // Deleting the sensor does not disturb an edit on the line.
        let index = build_index(vec![set_attr("line")], vec![delete("sensor")]);
        assert!(index.is_empty());
    }

    #[test]
    fn reference_changes_seed_both_ends() {
        let change = Change::new(
            "sensor",
            ChangeOp::AddReference {
                name: "monitors".into(),
                trg: Id::from("seg"),
            },
        );
        // Deleting the line blocks because it is an ancestor of both ends.
        let index = build_index(vec![change], vec![delete("line")]);
        assert!(index.is_blocked_for(&Id::from("sensor")));
        assert!(index.is_blocked_for(&Id::from("seg")));
    }

    #[test]
    fn create_seeds_its_container_chain() {
        let change = Change::new(
            "new-sensor",
            ChangeOp::Create {
                container: Some(Id::from("seg")),
                descriptor: ModelObject::new("new-sensor", "Sensor"),
            },
        );
        let index = build_index(vec![change], vec![delete("line")]);
        assert!(index.is_blocked_for(&Id::from("seg")));
    }

    #[test]
    fn unresolved_seed_stops_the_walk() {
        // The local change touches an object that does not exist yet;
        // analysis simply records the id itself and stops.
        let index = build_index(vec![set_attr("future")], vec![delete("line")]);
        assert!(index.is_empty());
    }

    #[test]
    fn deletes_do_not_block_each_other() {
        let index = build_index(vec![delete("sensor")], vec![delete("line")]);
        assert!(index.is_empty());
    }

    #[test]
    fn both_directions_are_analyzed() {
        let index = build_index(vec![delete("sensor")], vec![set_attr("sensor")]);
        // Remote's edit blocks the LOCAL delete.
        let blocked = index.deletes_blocked_by(&Id::from("sensor"));
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].side, Side::Local);
    }

    #[test]
    fn edge_count_and_iter_agree() {
        let index = build_index(vec![set_attr("sensor")], vec![delete("line"), delete("seg")]);
        assert_eq!(index.len(), index.iter().count());
        assert!(!index.is_empty());
    }

    #[test]
    fn ambiguous_identifier_aborts() {
        struct Doubler;
        impl IdResolver for Doubler {
            fn resolve<'g>(&self, graph: &'g ModelGraph, id: &Id) -> Vec<&'g ModelObject> {
                // Simulates a corrupted copy where one id matches twice.
                graph.get(id).into_iter().chain(graph.get(id)).collect()
            }
        }
        let scope = MergeScope::new(
            railway(),
            ChangeSet::from_changes(vec![set_attr("sensor")]),
            ChangeSet::new(),
        );
        let err = DependencyIndex::build(&scope, &Doubler).unwrap_err();
        assert!(matches!(
            err,
            MergeError::AmbiguousIdentifier { matches: 2, .. }
        ));
    }

    // -- Property: dependency soundness --

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// Build a random chain-shaped graph of `n` objects: o0 is the root,
        /// each o(i) is contained in o(i-1).
        fn chain(n: usize) -> ModelGraph {
            let mut g = ModelGraph::new();
            g.insert_root(ModelObject::new("o0", "Node")).unwrap();
            for i in 1..n {
                g.insert_child(
                    &Id::from(format!("o{}", i - 1).as_str()),
                    ModelObject::new(format!("o{i}").as_str(), "Node"),
                )
                .unwrap();
            }
            g
        }

        proptest! {
            /// If the analyzer marks a delete as blocked by a pending change,
            /// the deleted object is a containment ancestor (or the object
            /// itself) of an object the pending change references.
            #[test]
            fn dependency_soundness(
                n in 2usize..8,
                edit_at in 0usize..8,
                delete_at in 0usize..8,
            ) {
                let edit_at = edit_at % n;
                let delete_at = delete_at % n;
                let graph = chain(n);
                let edit_id = Id::from(format!("o{edit_at}").as_str());
                let delete_id = Id::from(format!("o{delete_at}").as_str());

                let scope = MergeScope::new(
                    graph.clone(),
                    ChangeSet::from_changes(vec![Change::new(
                        edit_id.clone(),
                        ChangeOp::SetAttribute { name: "v".into(), value: Value::Int(1) },
                    )]),
                    ChangeSet::from_changes(vec![Change::new(delete_id.clone(), ChangeOp::Delete)]),
                );
                let index = DependencyIndex::build(&scope, &ArenaResolver).unwrap();

                for (needed, blocked) in index.iter() {
                    // The blocked delete's target must be `needed` itself or
                    // one of its containment ancestors.
                    let mut chain_ids = vec![needed.clone()];
                    chain_ids.extend(graph.ancestors_of(needed));
                    prop_assert!(chain_ids.contains(&blocked.target));
                }

                // And the expected edge exists exactly when the delete target
                // is on the edited object's ancestor chain (or is it).
                let mut chain_ids = vec![edit_id.clone()];
                chain_ids.extend(graph.ancestors_of(&edit_id));
                let expected = chain_ids.contains(&delete_id);
                prop_assert_eq!(index.is_blocked_for(&edit_id), expected);
            }
        }
    }
}
