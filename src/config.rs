//! Merge run configuration (`merge.toml`).
//!
//! Typed configuration for one merge run: search behaviour (seed, caps) and
//! caller-side priority assignment (MUST prefixes per side). Missing fields
//! use defaults; a missing file means "all defaults" and is not an error.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level merge run configuration.
///
/// ```toml
/// [search]
/// seed = 42
/// max_solutions = 3
/// max_steps = 50000
///
/// [priorities]
/// local_must_prefix = 4
/// remote_must_prefix = 2
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Search behaviour.
    #[serde(default)]
    pub search: SearchConfig,

    /// Priority assignment applied to the change sets before search.
    #[serde(default)]
    pub priorities: PriorityConfig,
}

// ---------------------------------------------------------------------------
// SearchConfig
// ---------------------------------------------------------------------------

/// Search behaviour settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    /// Seed for the transition-selection RNG. Omit to draw entropy from the
    /// OS; set for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Stop after this many solutions (default: 1 — first feasible merge).
    #[serde(default = "default_max_solutions")]
    pub max_solutions: usize,

    /// Cooperative step budget; the run interrupts itself once exceeded
    /// (default: 100 000).
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            seed: None,
            max_solutions: default_max_solutions(),
            max_steps: default_max_steps(),
        }
    }
}

const fn default_max_solutions() -> usize {
    1
}

const fn default_max_steps() -> u64 {
    100_000
}

// ---------------------------------------------------------------------------
// PriorityConfig
// ---------------------------------------------------------------------------

/// Caller-side priority assignment: the first N changes of a side are tagged
/// MUST, the rest MAY.
///
/// An unset prefix leaves that side's change set untouched, so priorities
/// assigned directly on the changes survive the default configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorityConfig {
    /// MUST prefix length for the local change set.
    #[serde(default)]
    pub local_must_prefix: Option<usize>,

    /// MUST prefix length for the remote change set.
    #[serde(default)]
    pub remote_must_prefix: Option<usize>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a merge run configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl RunConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - If the file exists but contains invalid TOML or unknown fields,
    ///   returns a [`ConfigError`] with line-level detail.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse
    /// errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
