//! Arena-based typed object graph.
//!
//! A [`ModelGraph`] holds every object of one model copy in an arena keyed by
//! [`Id`]. Containment is a non-owning back-reference: each object records its
//! parent's id, and children are found by consulting the arena — there are no
//! live object pointers anywhere. This keeps whole-graph snapshots a plain
//! `clone()`, which is what makes speculative apply/undo cheap during search.
//!
//! Objects carry a metamodel kind name plus named attribute and reference
//! slots. Multi-valued slots are ordered `Vec`s; single-valued operations
//! collapse the slot to one element.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ident::Id;

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// An attribute value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Boolean attribute.
    Bool(bool),
    /// Integer attribute.
    Int(i64),
    /// String attribute.
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// ModelObject
// ---------------------------------------------------------------------------

/// One object in the graph: kind, optional containment parent, and named
/// attribute/reference slots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelObject {
    /// Stable identifier of this object.
    pub id: Id,
    /// Metamodel kind (class) name.
    pub kind: String,
    /// Containment parent, if any. `None` for root objects.
    pub parent: Option<Id>,
    /// Named attribute slots. A slot may hold several values.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<Value>>,
    /// Named reference slots, pointing at other objects by id.
    #[serde(default)]
    pub references: BTreeMap<String, Vec<Id>>,
}

impl ModelObject {
    /// Create an object with empty slots.
    #[must_use]
    pub fn new(id: impl Into<Id>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parent: None,
            attributes: BTreeMap::new(),
            references: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter, for constructing fixtures and
    /// create-descriptors.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Builder-style reference setter.
    #[must_use]
    pub fn with_reference(mut self, name: impl Into<String>, trg: impl Into<Id>) -> Self {
        self.references
            .entry(name.into())
            .or_default()
            .push(trg.into());
        self
    }
}

// ---------------------------------------------------------------------------
// GraphError
// ---------------------------------------------------------------------------

/// Structural errors raised by graph mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// An object with this id is already present.
    DuplicateId(Id),
    /// The referenced object does not exist in the arena.
    MissingObject(Id),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "object id '{id}' is already in the graph"),
            Self::MissingObject(id) => write!(f, "no object with id '{id}' in the graph"),
        }
    }
}

impl std::error::Error for GraphError {}

// ---------------------------------------------------------------------------
// ModelGraph
// ---------------------------------------------------------------------------

/// The arena of model objects, keyed by id.
///
/// `BTreeMap` keeps iteration deterministic, so two graphs built from the
/// same operations compare equal and serialize identically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelGraph {
    objects: BTreeMap<Id, ModelObject>,
}

impl ModelGraph {
    /// An empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns `true` if the graph holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns `true` if an object with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &Id) -> bool {
        self.objects.contains_key(id)
    }

    /// Look up an object by id.
    #[must_use]
    pub fn get(&self, id: &Id) -> Option<&ModelObject> {
        self.objects.get(id)
    }

    /// Mutable lookup by id.
    pub fn get_mut(&mut self, id: &Id) -> Option<&mut ModelObject> {
        self.objects.get_mut(id)
    }

    /// Iterate objects in id order.
    pub fn objects(&self) -> impl Iterator<Item = &ModelObject> {
        self.objects.values()
    }

    /// Insert a root object (no containment parent).
    ///
    /// # Errors
    /// Returns [`GraphError::DuplicateId`] if the id is taken.
    pub fn insert_root(&mut self, mut object: ModelObject) -> Result<(), GraphError> {
        if self.objects.contains_key(&object.id) {
            return Err(GraphError::DuplicateId(object.id));
        }
        object.parent = None;
        self.objects.insert(object.id.clone(), object);
        Ok(())
    }

    /// Insert an object under `parent`.
    ///
    /// # Errors
    /// Returns [`GraphError::MissingObject`] if the parent does not exist, or
    /// [`GraphError::DuplicateId`] if the id is taken.
    pub fn insert_child(&mut self, parent: &Id, mut object: ModelObject) -> Result<(), GraphError> {
        if !self.objects.contains_key(parent) {
            return Err(GraphError::MissingObject(parent.clone()));
        }
        if self.objects.contains_key(&object.id) {
            return Err(GraphError::DuplicateId(object.id));
        }
        object.parent = Some(parent.clone());
        self.objects.insert(object.id.clone(), object);
        Ok(())
    }

    /// Containment parent of `id`, if the object exists and has one.
    #[must_use]
    pub fn parent_of(&self, id: &Id) -> Option<&Id> {
        self.objects.get(id).and_then(|o| o.parent.as_ref())
    }

    /// Ids of the direct children of `id`, in id order.
    #[must_use]
    pub fn children_of(&self, id: &Id) -> Vec<Id> {
        self.objects
            .values()
            .filter(|o| o.parent.as_ref() == Some(id))
            .map(|o| o.id.clone())
            .collect()
    }

    /// Walk the containment-ancestor chain of `id`, starting at its parent.
    ///
    /// Stops at a root or on a structural cycle (which a well-formed model
    /// never has).
    #[must_use]
    pub fn ancestors_of(&self, id: &Id) -> Vec<Id> {
        let mut chain = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if chain.contains(parent) {
                break;
            }
            chain.push(parent.clone());
            current = self.parent_of(parent);
        }
        chain
    }

    /// Remove `id` and its entire containment subtree.
    ///
    /// Returns the ids that were removed, in id order. An empty result means
    /// the object did not exist.
    pub fn remove_subtree(&mut self, id: &Id) -> Vec<Id> {
        if !self.objects.contains_key(id) {
            return Vec::new();
        }
        let mut doomed = vec![id.clone()];
        let mut frontier = vec![id.clone()];
        while let Some(next) = frontier.pop() {
            for child in self.children_of(&next) {
                doomed.push(child.clone());
                frontier.push(child);
            }
        }
        doomed.sort();
        doomed.dedup();
        for dead in &doomed {
            self.objects.remove(dead);
        }
        doomed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
