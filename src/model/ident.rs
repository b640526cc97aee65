//! Stable object identifiers.
//!
//! An [`Id`] is the key that ties the same logical object together across the
//! original, local, and remote copies of a model. Identifiers are tagged
//! values: an integer, a long integer, or a string. Equality is value
//! equality within a tag; two identifiers with different tags never compare
//! equal.
//!
//! "No identifier" (e.g. a create into the model root, which has no
//! containment parent) is expressed as `Option<Id>` — there is no null
//! sentinel inside the type itself.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Id
// ---------------------------------------------------------------------------

/// A stable, tagged object identifier.
///
/// The derived `Ord` gives a total order (tag first, then value) so that
/// identifiers can key deterministic `BTreeMap`/`BTreeSet` containers. The
/// cross-tag portion of that order is arbitrary and carries no meaning —
/// callers must not rely on `Int(3) < Str("a")` being anything in particular.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Id {
    /// 32-bit integer identifier.
    Int(i32),
    /// 64-bit integer identifier.
    Long(i64),
    /// String identifier.
    Str(String),
}

impl Id {
    /// Short tag name for diagnostics.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Str(_) => "str",
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Long(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i32> for Id {
    fn from(n: i32) -> Self {
        Self::Int(n)
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Self::Long(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
