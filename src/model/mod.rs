//! The merge data model: identifiers, the arena object graph, and the typed
//! change representation produced by differencing.

pub mod change;
pub mod graph;
pub mod ident;

pub use change::{Change, ChangeKind, ChangeOp, ChangeSet, Priority, Side};
pub use graph::{GraphError, ModelGraph, ModelObject, Value};
pub use ident::Id;
