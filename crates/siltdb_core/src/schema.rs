//! Schema version registry and union validation.
//!
//! A store owns an ordered list of schema versions, each an immutable
//! validator. The registry tries versions in ascending ordinal order and
//! the first successful match wins, so schema authors should keep
//! versions mutually exclusive (typically via a discriminator field) or
//! accept that ambiguous rows always resolve to the earliest compatible
//! version. A row matching zero versions is reported as invalid; the
//! registry never guesses or coerces on its own.

use crate::types::SchemaVersion;
use crate::value::Value;
use std::fmt;

/// One validation problem found in a candidate value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Path to the offending field, empty for the root.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl Issue {
    /// Creates an issue at a field path.
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an issue at the root of the candidate.
    pub fn root(message: impl Into<String>) -> Self {
        Self::new("", message)
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// A schema validator.
///
/// The registry is agnostic to where a validator comes from: the
/// built-in [`Shape`](crate::shape::Shape), a hand-written
/// implementation, or a plain closure all plug in equally. On success a
/// validator returns the (possibly coerced) value; on failure, the list
/// of issues found.
pub trait Validate: Send + Sync {
    /// Validates a candidate value.
    fn validate(&self, candidate: &Value) -> Result<Value, Vec<Issue>>;
}

impl<F> Validate for F
where
    F: Fn(&Value) -> Result<Value, Vec<Issue>> + Send + Sync,
{
    fn validate(&self, candidate: &Value) -> Result<Value, Vec<Issue>> {
        self(candidate)
    }
}

/// Issues collected from one version's failed validation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionIssues {
    /// The version that rejected the candidate.
    pub version: SchemaVersion,
    /// What it rejected it for.
    pub issues: Vec<Issue>,
}

/// Outcome of validating a candidate against the version union.
#[derive(Debug)]
pub enum UnionOutcome {
    /// The candidate matched a registered version.
    Match {
        /// The first version that accepted the candidate.
        version: SchemaVersion,
        /// The validated value.
        value: Value,
    },
    /// The candidate matched no registered version.
    NoMatch {
        /// Per-version rejection reasons, in ordinal order.
        issues: Vec<VersionIssues>,
    },
}

/// Ordered registry of a store's schema versions.
pub struct SchemaRegistry {
    versions: Vec<Box<dyn Validate>>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            versions: Vec::new(),
        }
    }

    /// Registers the next schema version and returns its ordinal.
    ///
    /// Registration order is meaning: versions must be registered in the
    /// same fixed order at every store-definition site, and never
    /// removed or reordered once data may exist written against them.
    pub fn register(&mut self, validator: impl Validate + 'static) -> SchemaVersion {
        self.versions.push(Box::new(validator));
        SchemaVersion::new(self.versions.len() as u32)
    }

    /// Number of registered versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if no versions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Returns the latest registered version, if any.
    #[must_use]
    pub fn latest(&self) -> Option<SchemaVersion> {
        if self.versions.is_empty() {
            None
        } else {
            Some(SchemaVersion::new(self.versions.len() as u32))
        }
    }

    /// Validates a candidate against each version in ascending ordinal
    /// order; the first match wins.
    pub fn union_validate(&self, candidate: &Value) -> UnionOutcome {
        let mut collected = Vec::with_capacity(self.versions.len());
        for (index, validator) in self.versions.iter().enumerate() {
            let version = SchemaVersion::new(index as u32 + 1);
            match validator.validate(candidate) {
                Ok(value) => return UnionOutcome::Match { version, value },
                Err(issues) => collected.push(VersionIssues { version, issues }),
            }
        }
        UnionOutcome::NoMatch { issues: collected }
    }

    /// Validates a candidate against the latest version only.
    ///
    /// Used to re-check migration output.
    pub fn validate_latest(&self, candidate: &Value) -> Result<Value, Vec<Issue>> {
        match self.versions.last() {
            Some(validator) => validator.validate(candidate),
            None => Err(vec![Issue::root("no schema versions registered")]),
        }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("versions", &self.versions.len())
            .finish()
    }
}
