//! Configuration struct definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
///
/// Every section defaults to the values in the embedded `defaults.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
    /// Read-after-write consistency waits.
    pub consistency: ConsistencySection,
    /// Authorization context issuance and checking.
    pub auth: AuthSection,
    /// Condition evaluation behavior.
    pub evaluation: EvaluationSection,
    /// Default capacity restriction for new delegator ledgers.
    pub capacity: CapacitySection,
    /// Chain endpoints keyed by chain id.
    pub chains: BTreeMap<String, ChainSection>,
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["keygate_chain=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConsistencySection
// ---------------------------------------------------------------------------

/// Settings for waiting on a chain to advance past a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencySection {
    /// Blocks past the reference point before state is considered settled.
    pub required_margin: u64,
    /// Delay between block height polls.
    pub poll_interval_ms: u64,
    /// Overall bound on a single wait.
    pub deadline_secs: u64,
}

impl Default for ConsistencySection {
    fn default() -> Self {
        Self {
            required_margin: 2,
            poll_interval_ms: 1000,
            deadline_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthSection
// ---------------------------------------------------------------------------

/// Authorization context settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Domain bound into issued contexts.
    pub domain: String,
    /// Human-readable statement bound into issued contexts.
    pub statement: String,
    /// Lifetime of issued contexts.
    pub ttl_secs: u64,
    /// Clock skew tolerated when checking a presented context.
    pub clock_skew_secs: u64,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            domain: "localhost".to_owned(),
            statement: "Decrypt condition-gated data".to_owned(),
            ttl_secs: 86_400,
            clock_skew_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// EvaluationSection
// ---------------------------------------------------------------------------

/// Condition evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSection {
    /// `"eager"` or `"lazy"`.
    pub mode: String,
    /// `"propagate"` or `"deny"`.
    pub failure_policy: String,
    /// Timeout for each chain read.
    pub read_timeout_ms: u64,
    /// Timeout for each remote predicate execution.
    pub predicate_timeout_ms: u64,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            mode: "eager".to_owned(),
            failure_policy: "propagate".to_owned(),
            read_timeout_ms: 10_000,
            predicate_timeout_ms: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// CapacitySection
// ---------------------------------------------------------------------------

/// Default restriction applied to newly created delegator ledgers.
///
/// Counts are signed so negative input reaches validation instead of failing
/// to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacitySection {
    /// Maximum total spend per period, as a decimal wei string.
    pub max_price_wei: String,
    /// Maximum requests per delegatee per period.
    pub requests_per_period: i64,
    /// Rolling window length.
    pub period_secs: i64,
}

impl Default for CapacitySection {
    fn default() -> Self {
        Self {
            max_price_wei: "1000000000000000000".to_owned(),
            requests_per_period: 100,
            period_secs: 3600,
        }
    }
}

// ---------------------------------------------------------------------------
// ChainSection
// ---------------------------------------------------------------------------

/// A chain endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSection {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
}
