//! Edit operations recorded by differencing one model copy against the base.
//!
//! A [`Change`] is one atomic edit: create or delete an object, or set/add/
//! remove an attribute or reference value. Each change primarily affects one
//! object (`src`); reference changes also name a target object. A
//! [`ChangeSet`] is the ordered list of changes for one side of the merge —
//! insertion order comes from the differencing collaborator and has no
//! meaning beyond indexing.
//!
//! Priorities are assigned by the caller after differencing, not inferred:
//! [`Priority::Must`] marks a change as mandatory for any accepted merge,
//! [`Priority::May`] (the default) marks it negotiable.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::graph::{ModelObject, Value};
use super::ident::Id;

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Which independently modified copy a change set belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The locally modified copy.
    Local,
    /// The remotely modified copy.
    Remote,
}

impl Side {
    /// The other side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Local => Self::Remote,
            Self::Remote => Self::Local,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote => f.write_str("remote"),
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Merge priority of a change. Ordered: `Must` sorts before `May`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// The change must be applied in every accepted merge.
    Must,
    /// The change is optional; the search layers it in opportunistically.
    #[default]
    May,
}

impl Priority {
    /// Returns `true` for [`Priority::Must`].
    #[must_use]
    pub const fn is_must(self) -> bool {
        matches!(self, Self::Must)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Must => f.write_str("must"),
            Self::May => f.write_str("may"),
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeKind / ChangeOp
// ---------------------------------------------------------------------------

/// The kind of a change, used to route it to the registered applier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Delete,
    SetAttribute,
    AddAttribute,
    RemoveAttribute,
    SetReference,
    AddReference,
    RemoveReference,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::SetAttribute => "set-attribute",
            Self::AddAttribute => "add-attribute",
            Self::RemoveAttribute => "remove-attribute",
            Self::SetReference => "set-reference",
            Self::AddReference => "add-reference",
            Self::RemoveReference => "remove-reference",
        };
        f.write_str(name)
    }
}

/// The payload of a change.
///
/// The `src` identifier lives on [`Change`]; the op carries everything else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// Create a new object (described by `descriptor`, whose `id` equals the
    /// change's `src`) inside `container`, or at the root when `container`
    /// is `None`.
    Create {
        container: Option<Id>,
        descriptor: ModelObject,
    },
    /// Delete the `src` object and its containment subtree.
    Delete,
    /// Replace the attribute slot with a single value.
    SetAttribute { name: String, value: Value },
    /// Append a value to a multi-valued attribute slot.
    AddAttribute { name: String, value: Value },
    /// Remove one occurrence of a value from an attribute slot.
    RemoveAttribute { name: String, value: Value },
    /// Replace the reference slot with a single target.
    SetReference { name: String, trg: Id },
    /// Append a target to a multi-valued reference slot.
    AddReference { name: String, trg: Id },
    /// Remove one occurrence of a target from a reference slot.
    RemoveReference { name: String, trg: Id },
}

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// One atomic edit recorded by differencing, plus its merge priority.
///
/// Immutable once recorded, except for the priority tag (assigned by the
/// caller before the search starts).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// The object this change primarily affects. For creates this is the id
    /// of the object being created.
    pub src: Id,
    /// What the change does.
    pub op: ChangeOp,
    /// Merge priority, default [`Priority::May`].
    #[serde(default)]
    pub priority: Priority,
}

impl Change {
    /// A change with the default [`Priority::May`].
    #[must_use]
    pub fn new(src: impl Into<Id>, op: ChangeOp) -> Self {
        Self {
            src: src.into(),
            op,
            priority: Priority::May,
        }
    }

    /// The change's kind, for applier routing.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match &self.op {
            ChangeOp::Create { .. } => ChangeKind::Create,
            ChangeOp::Delete => ChangeKind::Delete,
            ChangeOp::SetAttribute { .. } => ChangeKind::SetAttribute,
            ChangeOp::AddAttribute { .. } => ChangeKind::AddAttribute,
            ChangeOp::RemoveAttribute { .. } => ChangeKind::RemoveAttribute,
            ChangeOp::SetReference { .. } => ChangeKind::SetReference,
            ChangeOp::AddReference { .. } => ChangeKind::AddReference,
            ChangeOp::RemoveReference { .. } => ChangeKind::RemoveReference,
        }
    }

    /// Returns `true` for delete changes.
    #[must_use]
    pub const fn is_delete(&self) -> bool {
        matches!(self.op, ChangeOp::Delete)
    }

    /// Reference target, for reference changes.
    #[must_use]
    pub const fn trg(&self) -> Option<&Id> {
        match &self.op {
            ChangeOp::SetReference { trg, .. }
            | ChangeOp::AddReference { trg, .. }
            | ChangeOp::RemoveReference { trg, .. } => Some(trg),
            _ => None,
        }
    }

    /// Identifiers of objects that must exist (and not be deleted) for this
    /// change to be applicable.
    ///
    /// - Create: the container, if any.
    /// - Delete and attribute changes: `src`.
    /// - Reference changes: `src` and `trg`.
    #[must_use]
    pub fn required_ids(&self) -> Vec<&Id> {
        match &self.op {
            ChangeOp::Create { container, .. } => container.iter().collect(),
            ChangeOp::Delete
            | ChangeOp::SetAttribute { .. }
            | ChangeOp::AddAttribute { .. }
            | ChangeOp::RemoveAttribute { .. } => vec![&self.src],
            ChangeOp::SetReference { trg, .. }
            | ChangeOp::AddReference { trg, .. }
            | ChangeOp::RemoveReference { trg, .. } => vec![&self.src, trg],
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeSet
// ---------------------------------------------------------------------------

/// The ordered changes of one side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    /// An empty change set.
    #[must_use]
    pub const fn new() -> Self {
        Self { changes: Vec::new() }
    }

    /// Build from a list of changes.
    #[must_use]
    pub fn from_changes(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    /// Append a change.
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` when the set holds no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The change at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Change> {
        self.changes.get(index)
    }

    /// Iterate changes in recorded order.
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Mark the first `n` changes as [`Priority::Must`], the rest as
    /// [`Priority::May`].
    ///
    /// This is the caller-side priority assignment: "the first N changes on
    /// this side are mandatory".
    pub fn mark_must_prefix(&mut self, n: usize) {
        for (i, change) in self.changes.iter_mut().enumerate() {
            change.priority = if i < n { Priority::Must } else { Priority::May };
        }
    }

    /// Number of changes tagged [`Priority::Must`].
    #[must_use]
    pub fn must_count(&self) -> usize {
        self.changes.iter().filter(|c| c.priority.is_must()).count()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
