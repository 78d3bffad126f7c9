//! Resource kinds, id patterns and scope grants.
//!
//! A scope entry pairs a [`ResourceKind`] with a [`ResourcePattern`] over
//! resource ids:
//! - `*` - any resource of the kind
//! - `3f9a0c…` - exactly one gated resource (hex id)
//! - `Qm*` - any CIDv0 predicate program
//!
//! The pattern string is always glob syntax. Exact ids containing glob
//! metacharacters are stored escaped (`a*` becomes `a[*]`), so the string
//! that is signed and serialized means the same thing when parsed again.

use std::fmt;
use std::str::FromStr;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// What a scope entry grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Releasing the key of a condition-gated resource.
    ConditionDecryption,
    /// Running a remote predicate program on the requester's behalf.
    PredicateExecution,
    /// Spending a delegator's capacity.
    CapacityDelegation,
}

impl ResourceKind {
    /// Stable name used in signing data and on the wire.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConditionDecryption => "condition-decryption",
            Self::PredicateExecution => "predicate-execution",
            Self::CapacityDelegation => "capacity-delegation",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "condition-decryption" => Ok(Self::ConditionDecryption),
            "predicate-execution" => Ok(Self::PredicateExecution),
            "capacity-delegation" => Ok(Self::CapacityDelegation),
            other => Err(AuthError::InvalidPattern {
                pattern: other.to_string(),
                reason: "unknown resource kind".to_string(),
            }),
        }
    }
}

/// Characters that make a pattern string a glob.
const GLOB_META: [char; 6] = ['*', '?', '[', ']', '{', '}'];

/// A pattern over resource ids.
///
/// Supports exact ids and glob patterns (`*`, `?`, `[...]`, `{a,b}`).
#[derive(Debug, Clone)]
pub struct ResourcePattern {
    pattern: String,
    matcher: Option<GlobMatcher>,
}

impl ResourcePattern {
    /// Create a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPattern`] if the pattern is empty, contains
    /// whitespace or `..` segments, or is not a valid glob.
    pub fn new(pattern: impl Into<String>) -> AuthResult<Self> {
        let pattern = pattern.into();
        Self::check(&pattern)?;

        let matcher = if pattern.contains(GLOB_META) {
            let glob = Glob::new(&pattern).map_err(|e| AuthError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
            Some(glob.compile_matcher())
        } else {
            None
        };

        Ok(Self { pattern, matcher })
    }

    /// A pattern matching exactly `id`, even if it contains glob characters.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPattern`] if `id` is empty, contains
    /// whitespace or `..` segments.
    pub fn exact(id: impl Into<String>) -> AuthResult<Self> {
        let id = id.into();
        Self::check(&id)?;
        Self::new(globset::escape(&id))
    }

    /// A pattern matching every id.
    #[must_use]
    pub fn any() -> Self {
        Self {
            pattern: "*".to_string(),
            matcher: Glob::new("*").ok().map(|g| g.compile_matcher()),
        }
    }

    fn check(pattern: &str) -> AuthResult<()> {
        let reason = if pattern.is_empty() {
            "pattern is empty"
        } else if pattern.chars().any(char::is_whitespace) {
            "pattern contains whitespace"
        } else if pattern.split('/').any(|segment| segment == "..") {
            "pattern contains '..' segment"
        } else {
            return Ok(());
        };
        Err(AuthError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Whether `id` is covered by this pattern.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        if id.is_empty() || id.split('/').any(|segment| segment == "..") {
            return false;
        }
        match &self.matcher {
            Some(matcher) => matcher.is_match(id),
            None => self.pattern == id,
        }
    }

    /// The pattern string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Whether matching goes through a compiled glob. True for escaped
    /// exact ids too.
    #[must_use]
    pub fn is_glob(&self) -> bool {
        self.matcher.is_some()
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

impl Serialize for ResourcePattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.pattern.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourcePattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let pattern = String::deserialize(deserializer)?;
        Self::new(pattern).map_err(serde::de::Error::custom)
    }
}

impl PartialEq for ResourcePattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for ResourcePattern {}

impl std::hash::Hash for ResourcePattern {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
    }
}

/// One entry of a context's resource scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceGrant {
    /// Kind of resource granted.
    pub kind: ResourceKind,
    /// Which ids of that kind.
    pub pattern: ResourcePattern,
}

impl ResourceGrant {
    /// Grant `kind` resources whose id matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPattern`] if the pattern is invalid.
    pub fn new(kind: ResourceKind, pattern: impl Into<String>) -> AuthResult<Self> {
        Ok(Self {
            kind,
            pattern: ResourcePattern::new(pattern)?,
        })
    }

    /// Grant every resource of `kind`.
    #[must_use]
    pub fn any(kind: ResourceKind) -> Self {
        Self {
            kind,
            pattern: ResourcePattern::any(),
        }
    }

    /// Whether this grant covers the `(kind, id)` pair.
    #[must_use]
    pub fn covers(&self, kind: ResourceKind, id: &str) -> bool {
        self.kind == kind && self.pattern.matches(id)
    }
}
