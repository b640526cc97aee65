//! Unified error type for merge setup and execution.
//!
//! Only genuine faults become errors. "No eligible transition", "undo past
//! the root", and cooperative interruption are normal search outcomes and
//! are expressed through `Option`/`bool` returns on the strategy and engine,
//! never through [`MergeError`].

use std::fmt;

use crate::config::ConfigError;
use crate::merge::apply::ApplyError;
use crate::model::{ChangeKind, Id};

// ---------------------------------------------------------------------------
// MergeError
// ---------------------------------------------------------------------------

/// A fault that aborts merge setup or surfaces from the engine.
#[derive(Debug)]
pub enum MergeError {
    /// An identifier resolved to more than one object during dependency
    /// analysis. Identifiers are contractually unique within a model copy,
    /// so this aborts setup.
    AmbiguousIdentifier {
        /// The offending identifier.
        id: Id,
        /// How many objects it matched.
        matches: usize,
    },

    /// No applier is registered for a change kind present in the change sets.
    MissingApplier {
        /// The unserved kind.
        kind: ChangeKind,
    },

    /// A create descriptor names a kind the configured metamodel does not
    /// declare.
    UnknownKind {
        /// The undeclared kind name.
        kind: String,
    },

    /// A transition named a change index that does not exist in its side's
    /// change set. Indicates a stale [`Transition`](crate::merge::Transition)
    /// handed back to the engine.
    UnknownTransition {
        /// Label of the stale transition.
        label: String,
    },

    /// An operation applier failed while committing a transition.
    Apply {
        /// Label of the transition that was being committed.
        transition: String,
        /// The underlying applier fault.
        source: ApplyError,
    },

    /// The run configuration could not be loaded or parsed.
    Config(ConfigError),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousIdentifier { id, matches } => write!(
                f,
                "identifier '{id}' resolved to {matches} objects; ids must be unique within a model copy"
            ),
            Self::MissingApplier { kind } => write!(
                f,
                "no operation applier registered for '{kind}' changes; register one or use the defaults"
            ),
            Self::UnknownKind { kind } => write!(
                f,
                "create descriptor uses kind '{kind}', which the metamodel does not declare"
            ),
            Self::UnknownTransition { label } => write!(
                f,
                "transition '{label}' does not refer to a change in the current scope"
            ),
            Self::Apply { transition, source } => {
                write!(f, "applying transition '{transition}' failed: {source}")
            }
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Apply { source, .. } => Some(source),
            Self::Config(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for MergeError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
