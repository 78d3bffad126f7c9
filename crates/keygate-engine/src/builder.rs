//! Assembly of an [`AccessGate`] from parts or from loaded configuration.

use alloy_primitives::U256;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use keygate_auth::AuthorizationContextIssuer;
use keygate_capacity::{CapacityRegistry, Restriction};
use keygate_chain::{ChainId, ChainProviders, ChainStateReader, JsonRpcChainReader, WaitConfig};
use keygate_conditions::{ConditionEvaluator, EvaluationMode, FailurePolicy, PredicateExecutor};
use keygate_config::{AuthSection, CapacitySection, Config, ConsistencySection};

use crate::error::{EngineError, EngineResult};
use crate::gate::AccessGate;

/// Default clock skew tolerated when checking contexts.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(30);

/// Default restriction for ledgers the gate creates: 1 ETH and 100 requests
/// per hour.
fn default_restriction() -> Restriction {
    Restriction {
        total_max_price_wei: U256::from(1_000_000_000_000_000_000u64),
        requests_per_period: 100,
        period_secs: 3600,
    }
}

/// Builds an [`AccessGate`].
#[must_use]
pub struct AccessGateBuilder {
    providers: ChainProviders,
    executor: Option<Arc<dyn PredicateExecutor>>,
    mode: EvaluationMode,
    failure_policy: FailurePolicy,
    predicate_timeout: Option<Duration>,
    ledgers: CapacityRegistry,
    issuer: AuthorizationContextIssuer,
    wait: WaitConfig,
    clock_skew: Duration,
    default_restriction: Restriction,
}

impl fmt::Debug for AccessGateBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGateBuilder")
            .field("providers", &self.providers)
            .field("has_executor", &self.executor.is_some())
            .field("mode", &self.mode)
            .field("failure_policy", &self.failure_policy)
            .field("predicate_timeout", &self.predicate_timeout)
            .field("ledgers", &self.ledgers)
            .field("issuer", &self.issuer)
            .field("wait", &self.wait)
            .field("clock_skew", &self.clock_skew)
            .field("default_restriction", &self.default_restriction)
            .finish()
    }
}

impl Default for AccessGateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessGateBuilder {
    /// A builder with no chains and default settings.
    pub fn new() -> Self {
        Self {
            providers: ChainProviders::new(),
            executor: None,
            mode: EvaluationMode::default(),
            failure_policy: FailurePolicy::default(),
            predicate_timeout: None,
            ledgers: CapacityRegistry::new(),
            issuer: AuthorizationContextIssuer::new(),
            wait: WaitConfig::default(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            default_restriction: default_restriction(),
        }
    }

    /// Configure from a loaded [`Config`]. Registers a JSON-RPC reader for
    /// every configured chain.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] or a capacity error if a value
    /// cannot be converted.
    pub fn from_config(config: &Config) -> EngineResult<Self> {
        let eval = &config.evaluation;
        let mode: EvaluationMode = eval.mode.parse().map_err(|e| invalid("evaluation.mode", e))?;
        let failure_policy: FailurePolicy = eval
            .failure_policy
            .parse()
            .map_err(|e| invalid("evaluation.failure_policy", e))?;

        let mut providers =
            ChainProviders::new().with_read_timeout(Duration::from_millis(eval.read_timeout_ms));
        for (name, chain) in &config.chains {
            debug!(chain = %name, url = %chain.rpc_url, "registering chain reader");
            providers = providers.with_reader(
                ChainId::new(name),
                Arc::new(JsonRpcChainReader::new(chain.rpc_url.clone())),
            );
        }

        Ok(Self {
            providers,
            mode,
            failure_policy,
            predicate_timeout: Some(Duration::from_millis(eval.predicate_timeout_ms)),
            issuer: issuer_from(&config.auth),
            wait: wait_config_from(&config.consistency),
            clock_skew: Duration::from_secs(config.auth.clock_skew_secs),
            default_restriction: restriction_from(&config.capacity)?,
            ..Self::new()
        })
    }

    /// Register (or replace) the reader for a chain.
    pub fn with_reader(mut self, chain: ChainId, reader: Arc<dyn ChainStateReader>) -> Self {
        self.providers = self.providers.with_reader(chain, reader);
        self
    }

    /// Replace all chain readers.
    pub fn with_providers(mut self, providers: ChainProviders) -> Self {
        self.providers = providers;
        self
    }

    /// Set the remote predicate executor.
    pub fn with_executor(mut self, executor: Arc<dyn PredicateExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Set the evaluation mode.
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the per-call predicate timeout.
    pub fn with_predicate_timeout(mut self, timeout: Duration) -> Self {
        self.predicate_timeout = Some(timeout);
        self
    }

    /// Share an existing ledger registry.
    pub fn with_ledgers(mut self, ledgers: CapacityRegistry) -> Self {
        self.ledgers = ledgers;
        self
    }

    /// Set the context issuer.
    pub fn with_issuer(mut self, issuer: AuthorizationContextIssuer) -> Self {
        self.issuer = issuer;
        self
    }

    /// Set the settlement wait parameters.
    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Set the clock skew tolerated when checking contexts.
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Set the restriction for ledgers created by
    /// [`AccessGate::delegator_ledger`].
    pub fn with_default_restriction(mut self, restriction: Restriction) -> Self {
        self.default_restriction = restriction;
        self
    }

    /// Build the gate.
    #[must_use]
    pub fn build(self) -> AccessGate {
        let mut evaluator = ConditionEvaluator::new(self.providers.clone())
            .with_mode(self.mode)
            .with_failure_policy(self.failure_policy);
        if let Some(executor) = self.executor {
            evaluator = evaluator.with_executor(executor);
        }
        if let Some(timeout) = self.predicate_timeout {
            evaluator = evaluator.with_predicate_timeout(timeout);
        }
        AccessGate {
            providers: self.providers,
            evaluator,
            ledgers: self.ledgers,
            issuer: self.issuer,
            wait: self.wait,
            clock_skew: self.clock_skew,
            default_restriction: self.default_restriction,
        }
    }
}

fn invalid(field: &str, reason: impl ToString) -> EngineError {
    EngineError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Settlement wait parameters from the `[consistency]` section.
#[must_use]
pub fn wait_config_from(section: &ConsistencySection) -> WaitConfig {
    WaitConfig::new(
        section.required_margin,
        Duration::from_millis(section.poll_interval_ms),
    )
    .with_deadline(Duration::from_secs(section.deadline_secs))
}

/// Default ledger restriction from the `[capacity]` section.
///
/// # Errors
///
/// Returns [`EngineError::InvalidConfig`] for an unparsable price, or a
/// capacity error for out-of-range counts.
pub fn restriction_from(section: &CapacitySection) -> EngineResult<Restriction> {
    let max_price = U256::from_str_radix(section.max_price_wei.trim(), 10)
        .map_err(|e| invalid("capacity.max_price_wei", e))?;
    Ok(Restriction::from_signed(
        max_price,
        section.requests_per_period,
        section.period_secs,
    )?)
}

/// Context issuer from the `[auth]` section.
#[must_use]
pub fn issuer_from(section: &AuthSection) -> AuthorizationContextIssuer {
    AuthorizationContextIssuer::new()
        .with_domain(section.domain.clone())
        .with_statement(section.statement.clone())
        .with_ttl(Duration::from_secs(section.ttl_secs))
}
