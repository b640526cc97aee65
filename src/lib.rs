//! Guided three-way merge of typed object models.
//!
//! Given a base model and two independently edited copies described by their
//! change sets, this crate searches for merged models in which every
//! mandatory (MUST) change is applied, optional (MAY) changes are layered in
//! opportunistically, and no applied change relies on an object another
//! change deleted. The search is a backtracking exploration of the space of
//! change orderings, with delete-dependency analysis done up front and a
//! cemetery tracking deleted identifiers along each trajectory.
//!
//! # Example
//!
//! ```
//! use modelmerge::config::RunConfig;
//! use modelmerge::merge::{MergeOptions, MergeRun};
//! use modelmerge::model::{Change, ChangeOp, ChangeSet, ModelGraph, ModelObject, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = ModelGraph::new();
//! graph.insert_root(ModelObject::new("root", "Container"))?;
//!
//! let mut local = ChangeSet::default();
//! local.push(Change::new(
//!     "root",
//!     ChangeOp::SetAttribute { name: "name".into(), value: Value::from("merged") },
//! ));
//! local.mark_must_prefix(1);
//!
//! let run = MergeRun::new(
//!     graph,
//!     local,
//!     ChangeSet::default(),
//!     MergeOptions::default(),
//!     RunConfig::default(),
//! )?;
//! let report = run.execute()?;
//! assert_eq!(report.solutions.len(), 1);
//! let merged = &report.solutions[0];
//! assert_eq!(merged.trajectory.len(), 1);
//! assert_eq!(
//!     merged.graph.get(&"root".into()).unwrap().attributes["name"],
//!     vec![Value::from("merged")],
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod merge;
pub mod model;

pub use error::MergeError;
pub use merge::{MergeOptions, MergeReport, MergeRun, MergeSolution, MergeStrategy};
pub use model::{Change, ChangeOp, ChangeSet, ModelGraph, ModelObject};
