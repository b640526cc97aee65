//! Per-kind operation appliers.
//!
//! When the engine commits a transition, the applier registered for the
//! change's kind performs the actual mutation against the scope's graph.
//! The search core never mutates the model itself; it only decides which
//! change to try and when to undo. Undo is snapshot-based in the engine, so
//! appliers do not need to produce inverses.
//!
//! [`ApplierSet::defaults`] registers a default applier per kind, mirroring
//! the stock create/delete/attribute/reference operations of the original
//! system. Callers may override any kind through the configuration surface
//! (the "rules" option).

use std::collections::BTreeMap;
use std::fmt;

use crate::model::{Change, ChangeKind, ChangeOp, Id, ModelObject};

use super::scope::MergeScope;

// ---------------------------------------------------------------------------
// ApplyError
// ---------------------------------------------------------------------------

/// A fault while executing an operation applier.
///
/// These are engine-level failures: the engine only offers applicable
/// transitions, so hitting one of these means a broken applier registration
/// or a malformed change, not a normal dead end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyError {
    /// The change was routed to an applier of a different kind.
    KindMismatch {
        /// Kind the applier handles.
        expected: ChangeKind,
        /// Kind of the change it received.
        got: ChangeKind,
    },
    /// An object the operation needs is not in the graph.
    MissingObject(Id),
    /// A create collided with an existing object id.
    DuplicateObject(Id),
    /// A create descriptor whose id differs from the change's `src`.
    DescriptorMismatch {
        src: Id,
        descriptor: Id,
    },
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KindMismatch { expected, got } => {
                write!(f, "applier for '{expected}' received a '{got}' change")
            }
            Self::MissingObject(id) => write!(f, "object '{id}' is not in the model"),
            Self::DuplicateObject(id) => write!(f, "object '{id}' already exists"),
            Self::DescriptorMismatch { src, descriptor } => write!(
                f,
                "create descriptor id '{descriptor}' does not match change src '{src}'"
            ),
        }
    }
}

impl std::error::Error for ApplyError {}

// ---------------------------------------------------------------------------
// OperationApplier
// ---------------------------------------------------------------------------

/// One transformation rule: executes changes of a single kind against the
/// scope.
pub trait OperationApplier {
    /// The change kind this applier handles.
    fn kind(&self) -> ChangeKind;

    /// Mutate the scope according to `change`.
    ///
    /// # Errors
    /// Returns [`ApplyError`] on a structural fault; the engine surfaces it
    /// to the caller instead of swallowing it.
    fn apply(&self, change: &Change, scope: &mut MergeScope) -> Result<(), ApplyError>;
}

// ---------------------------------------------------------------------------
// DefaultApplier
// ---------------------------------------------------------------------------

/// The stock applier for one change kind.
#[derive(Clone, Copy, Debug)]
pub struct DefaultApplier {
    kind: ChangeKind,
}

impl DefaultApplier {
    /// A default applier handling `kind`.
    #[must_use]
    pub const fn new(kind: ChangeKind) -> Self {
        Self { kind }
    }
}

impl OperationApplier for DefaultApplier {
    fn kind(&self) -> ChangeKind {
        self.kind
    }

    fn apply(&self, change: &Change, scope: &mut MergeScope) -> Result<(), ApplyError> {
        if change.kind() != self.kind {
            return Err(ApplyError::KindMismatch {
                expected: self.kind,
                got: change.kind(),
            });
        }
        match &change.op {
            ChangeOp::Create {
                container,
                descriptor,
            } => apply_create(change, container.as_ref(), descriptor, scope),
            ChangeOp::Delete => apply_delete(change, scope),
            ChangeOp::SetAttribute { name, value } => {
                let object = object_mut(scope, &change.src)?;
                object.attributes.insert(name.clone(), vec![value.clone()]);
                Ok(())
            }
            ChangeOp::AddAttribute { name, value } => {
                let object = object_mut(scope, &change.src)?;
                object
                    .attributes
                    .entry(name.clone())
                    .or_default()
                    .push(value.clone());
                Ok(())
            }
            ChangeOp::RemoveAttribute { name, value } => {
                let object = object_mut(scope, &change.src)?;
                if let Some(slot) = object.attributes.get_mut(name) {
                    if let Some(pos) = slot.iter().position(|v| v == value) {
                        slot.remove(pos);
                    }
                    if slot.is_empty() {
                        object.attributes.remove(name);
                    }
                }
                Ok(())
            }
            ChangeOp::SetReference { name, trg } => {
                require_object(scope, trg)?;
                let object = object_mut(scope, &change.src)?;
                object.references.insert(name.clone(), vec![trg.clone()]);
                Ok(())
            }
            ChangeOp::AddReference { name, trg } => {
                require_object(scope, trg)?;
                let object = object_mut(scope, &change.src)?;
                object
                    .references
                    .entry(name.clone())
                    .or_default()
                    .push(trg.clone());
                Ok(())
            }
            ChangeOp::RemoveReference { name, trg } => {
                let object = object_mut(scope, &change.src)?;
                if let Some(slot) = object.references.get_mut(name) {
                    if let Some(pos) = slot.iter().position(|t| t == trg) {
                        slot.remove(pos);
                    }
                    if slot.is_empty() {
                        object.references.remove(name);
                    }
                }
                Ok(())
            }
        }
    }
}

fn apply_create(
    change: &Change,
    container: Option<&Id>,
    descriptor: &ModelObject,
    scope: &mut MergeScope,
) -> Result<(), ApplyError> {
    if descriptor.id != change.src {
        return Err(ApplyError::DescriptorMismatch {
            src: change.src.clone(),
            descriptor: descriptor.id.clone(),
        });
    }
    let result = match container {
        Some(parent) => scope.graph_mut().insert_child(parent, descriptor.clone()),
        None => scope.graph_mut().insert_root(descriptor.clone()),
    };
    result.map_err(|e| match e {
        crate::model::GraphError::DuplicateId(id) => ApplyError::DuplicateObject(id),
        crate::model::GraphError::MissingObject(id) => ApplyError::MissingObject(id),
    })
}

fn apply_delete(change: &Change, scope: &mut MergeScope) -> Result<(), ApplyError> {
    let removed = scope.graph_mut().remove_subtree(&change.src);
    if removed.is_empty() {
        return Err(ApplyError::MissingObject(change.src.clone()));
    }
    tracing::debug!(deleted = %change.src, buried = removed.len(), "delete committed");
    for id in removed {
        scope.bury(id);
    }
    Ok(())
}

fn require_object(scope: &MergeScope, id: &Id) -> Result<(), ApplyError> {
    if scope.graph().contains(id) {
        Ok(())
    } else {
        Err(ApplyError::MissingObject(id.clone()))
    }
}

fn object_mut<'s>(scope: &'s mut MergeScope, id: &Id) -> Result<&'s mut ModelObject, ApplyError> {
    scope
        .graph_mut()
        .get_mut(id)
        .ok_or_else(|| ApplyError::MissingObject(id.clone()))
}

// ---------------------------------------------------------------------------
// ApplierSet
// ---------------------------------------------------------------------------

/// The registered transformation rules, one applier per change kind.
pub struct ApplierSet {
    rules: BTreeMap<ChangeKind, Box<dyn OperationApplier>>,
}

impl ApplierSet {
    /// All eight default appliers.
    #[must_use]
    pub fn defaults() -> Self {
        let mut set = Self {
            rules: BTreeMap::new(),
        };
        for kind in [
            ChangeKind::Create,
            ChangeKind::Delete,
            ChangeKind::SetAttribute,
            ChangeKind::AddAttribute,
            ChangeKind::RemoveAttribute,
            ChangeKind::SetReference,
            ChangeKind::AddReference,
            ChangeKind::RemoveReference,
        ] {
            set.rules.insert(kind, Box::new(DefaultApplier::new(kind)));
        }
        set
    }

    /// Register (or replace) the applier for its kind.
    pub fn register(&mut self, applier: Box<dyn OperationApplier>) {
        self.rules.insert(applier.kind(), applier);
    }

    /// The applier for `kind`, if registered.
    #[must_use]
    pub fn get(&self, kind: ChangeKind) -> Option<&dyn OperationApplier> {
        self.rules.get(&kind).map(AsRef::as_ref)
    }
}

impl fmt::Debug for ApplierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplierSet")
            .field("kinds", &self.rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ApplierSet {
    fn default() -> Self {
        Self::defaults()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangeSet, ModelGraph, Value};

    fn scope() -> MergeScope {
        let mut g = ModelGraph::new();
        g.insert_root(ModelObject::new("root", "Region")).unwrap();
        g.insert_child(&Id::from("root"), ModelObject::new("a", "Segment"))
            .unwrap();
        g.insert_child(&Id::from("a"), ModelObject::new("a1", "Sensor"))
            .unwrap();
        MergeScope::new(g, ChangeSet::new(), ChangeSet::new())
    }

    fn run(change: Change, scope: &mut MergeScope) -> Result<(), ApplyError> {
        let set = ApplierSet::defaults();
        set.get(change.kind()).unwrap().apply(&change, scope)
    }

    #[test]
    fn create_under_container() {
        let mut s = scope();
        let change = Change::new(
            "b",
            ChangeOp::Create {
                container: Some(Id::from("root")),
                descriptor: ModelObject::new("b", "Segment").with_attribute("len", 4i64),
            },
        );
        run(change, &mut s).unwrap();
        let b = s.graph().get(&Id::from("b")).unwrap();
        assert_eq!(b.parent, Some(Id::from("root")));
        assert_eq!(b.attributes["len"], vec![Value::Int(4)]);
    }

    #[test]
    fn create_at_root() {
        let mut s = scope();
        run(
            Change::new(
                "r2",
                ChangeOp::Create {
                    container: None,
                    descriptor: ModelObject::new("r2", "Region"),
                },
            ),
            &mut s,
        )
        .unwrap();
        assert_eq!(s.graph().parent_of(&Id::from("r2")), None);
    }

    #[test]
    fn create_duplicate_fails() {
        let mut s = scope();
        let err = run(
            Change::new(
                "a",
                ChangeOp::Create {
                    container: Some(Id::from("root")),
                    descriptor: ModelObject::new("a", "Segment"),
                },
            ),
            &mut s,
        )
        .unwrap_err();
        assert_eq!(err, ApplyError::DuplicateObject(Id::from("a")));
    }

    #[test]
    fn create_descriptor_mismatch_fails() {
        let mut s = scope();
        let err = run(
            Change::new(
                "b",
                ChangeOp::Create {
                    container: None,
                    descriptor: ModelObject::new("c", "Segment"),
                },
            ),
            &mut s,
        )
        .unwrap_err();
        assert!(matches!(err, ApplyError::DescriptorMismatch { .. }));
    }

    #[test]
    fn delete_buries_subtree() {
        let mut s = scope();
        run(Change::new("a", ChangeOp::Delete), &mut s).unwrap();
        assert!(!s.graph().contains(&Id::from("a")));
        assert!(s.is_buried(&Id::from("a")));
        assert!(s.is_buried(&Id::from("a1")));
        assert!(!s.is_buried(&Id::from("root")));
    }

    #[test]
    fn delete_missing_fails() {
        let mut s = scope();
        let err = run(Change::new("ghost", ChangeOp::Delete), &mut s).unwrap_err();
        assert_eq!(err, ApplyError::MissingObject(Id::from("ghost")));
    }

    #[test]
    fn set_attribute_collapses_slot() {
        let mut s = scope();
        run(
            Change::new(
                "a",
                ChangeOp::AddAttribute {
                    name: "tags".into(),
                    value: Value::from("old"),
                },
            ),
            &mut s,
        )
        .unwrap();
        run(
            Change::new(
                "a",
                ChangeOp::SetAttribute {
                    name: "tags".into(),
                    value: Value::from("new"),
                },
            ),
            &mut s,
        )
        .unwrap();
        let a = s.graph().get(&Id::from("a")).unwrap();
        assert_eq!(a.attributes["tags"], vec![Value::Str("new".into())]);
    }

    #[test]
    fn add_and_remove_attribute() {
        let mut s = scope();
        for v in ["x", "y"] {
            run(
                Change::new(
                    "a",
                    ChangeOp::AddAttribute {
                        name: "tags".into(),
                        value: Value::from(v),
                    },
                ),
                &mut s,
            )
            .unwrap();
        }
        run(
            Change::new(
                "a",
                ChangeOp::RemoveAttribute {
                    name: "tags".into(),
                    value: Value::from("x"),
                },
            ),
            &mut s,
        )
        .unwrap();
        let a = s.graph().get(&Id::from("a")).unwrap();
        assert_eq!(a.attributes["tags"], vec![Value::Str("y".into())]);
    }

    #[test]
    fn remove_attribute_absent_value_is_noop() {
        let mut s = scope();
        run(
            Change::new(
                "a",
                ChangeOp::RemoveAttribute {
                    name: "tags".into(),
                    value: Value::from("nope"),
                },
            ),
            &mut s,
        )
        .unwrap();
        assert!(!s.graph().get(&Id::from("a")).unwrap().attributes.contains_key("tags"));
    }

    #[test]
    fn remove_last_attribute_drops_slot() {
        let mut s = scope();
        run(
            Change::new(
                "a",
                ChangeOp::AddAttribute {
                    name: "tags".into(),
                    value: Value::from("only"),
                },
            ),
            &mut s,
        )
        .unwrap();
        run(
            Change::new(
                "a",
                ChangeOp::RemoveAttribute {
                    name: "tags".into(),
                    value: Value::from("only"),
                },
            ),
            &mut s,
        )
        .unwrap();
        assert!(!s.graph().get(&Id::from("a")).unwrap().attributes.contains_key("tags"));
    }

    #[test]
    fn set_reference_requires_target() {
        let mut s = scope();
        run(
            Change::new(
                "a1",
                ChangeOp::SetReference {
                    name: "monitors".into(),
                    trg: Id::from("a"),
                },
            ),
            &mut s,
        )
        .unwrap();
        let a1 = s.graph().get(&Id::from("a1")).unwrap();
        assert_eq!(a1.references["monitors"], vec![Id::from("a")]);

        let err = run(
            Change::new(
                "a1",
                ChangeOp::SetReference {
                    name: "monitors".into(),
                    trg: Id::from("ghost"),
                },
            ),
            &mut s,
        )
        .unwrap_err();
        assert_eq!(err, ApplyError::MissingObject(Id::from("ghost")));
    }

    #[test]
    fn add_and_remove_reference() {
        let mut s = scope();
        run(
            Change::new(
                "a",
                ChangeOp::AddReference {
                    name: "next".into(),
                    trg: Id::from("a1"),
                },
            ),
            &mut s,
        )
        .unwrap();
        run(
            Change::new(
                "a",
                ChangeOp::RemoveReference {
                    name: "next".into(),
                    trg: Id::from("a1"),
                },
            ),
            &mut s,
        )
        .unwrap();
        assert!(!s.graph().get(&Id::from("a")).unwrap().references.contains_key("next"));
    }

    #[test]
    fn kind_mismatch_is_reported() {
        let mut s = scope();
        let applier = DefaultApplier::new(ChangeKind::Delete);
        let err = applier
            .apply(
                &Change::new(
                    "a",
                    ChangeOp::SetAttribute {
                        name: "x".into(),
                        value: Value::Int(1),
                    },
                ),
                &mut s,
            )
            .unwrap_err();
        assert_eq!(
            err,
            ApplyError::KindMismatch {
                expected: ChangeKind::Delete,
                got: ChangeKind::SetAttribute,
            }
        );
    }

    #[test]
    fn applier_set_covers_all_kinds() {
        let set = ApplierSet::defaults();
        for kind in [
            ChangeKind::Create,
            ChangeKind::Delete,
            ChangeKind::SetAttribute,
            ChangeKind::AddAttribute,
            ChangeKind::RemoveAttribute,
            ChangeKind::SetReference,
            ChangeKind::AddReference,
            ChangeKind::RemoveReference,
        ] {
            assert!(set.get(kind).is_some(), "missing applier for {kind}");
        }
    }

    #[test]
    fn register_overrides_by_kind() {
        struct Nop;
        impl OperationApplier for Nop {
            fn kind(&self) -> ChangeKind {
                ChangeKind::Delete
            }
            fn apply(&self, _: &Change, _: &mut MergeScope) -> Result<(), ApplyError> {
                Ok(())
            }
        }
        let mut set = ApplierSet::defaults();
        set.register(Box::new(Nop));
        let mut s = scope();
        // The no-op override leaves the graph untouched.
        set.get(ChangeKind::Delete)
            .unwrap()
            .apply(&Change::new("a", ChangeOp::Delete), &mut s)
            .unwrap();
        assert!(s.graph().contains(&Id::from("a")));
    }
}
