//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Digits in `2^256 - 1`.
const MAX_WEI_DIGITS: usize = 78;

/// Longest consistency wait, one day.
pub const MAX_DEADLINE_SECS: u64 = 24 * 60 * 60;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_logging(config)?;
    validate_consistency(config)?;
    validate_auth(config)?;
    validate_evaluation(config)?;
    validate_capacity(config)?;
    validate_chains(config)?;
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(ConfigError::invalid(
            "logging.level",
            format!(
                "unknown level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }
    if !matches!(
        l.format.to_lowercase().as_str(),
        "pretty" | "compact" | "json" | "full"
    ) {
        return Err(ConfigError::invalid(
            "logging.format",
            format!(
                "unknown format '{}'; expected one of: pretty, compact, json, full",
                l.format
            ),
        ));
    }
    Ok(())
}

fn validate_consistency(config: &Config) -> ConfigResult<()> {
    let c = &config.consistency;
    if c.poll_interval_ms == 0 {
        return Err(ConfigError::invalid(
            "consistency.poll_interval_ms",
            "poll_interval_ms must be greater than 0",
        ));
    }
    if c.deadline_secs == 0 || c.deadline_secs > MAX_DEADLINE_SECS {
        return Err(ConfigError::invalid(
            "consistency.deadline_secs",
            format!("deadline_secs must be between 1 and {MAX_DEADLINE_SECS}"),
        ));
    }
    Ok(())
}

fn validate_auth(config: &Config) -> ConfigResult<()> {
    let a = &config.auth;
    if a.domain.trim().is_empty() {
        return Err(ConfigError::invalid("auth.domain", "domain must not be empty"));
    }
    if a.ttl_secs == 0 {
        return Err(ConfigError::invalid(
            "auth.ttl_secs",
            "ttl_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_evaluation(config: &Config) -> ConfigResult<()> {
    let e = &config.evaluation;
    if !matches!(e.mode.as_str(), "eager" | "lazy") {
        return Err(ConfigError::invalid(
            "evaluation.mode",
            format!("unknown mode '{}'; expected eager or lazy", e.mode),
        ));
    }
    if !matches!(e.failure_policy.as_str(), "propagate" | "deny") {
        return Err(ConfigError::invalid(
            "evaluation.failure_policy",
            format!(
                "unknown failure policy '{}'; expected propagate or deny",
                e.failure_policy
            ),
        ));
    }
    if e.read_timeout_ms == 0 {
        return Err(ConfigError::invalid(
            "evaluation.read_timeout_ms",
            "read_timeout_ms must be greater than 0",
        ));
    }
    if e.predicate_timeout_ms == 0 {
        return Err(ConfigError::invalid(
            "evaluation.predicate_timeout_ms",
            "predicate_timeout_ms must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_capacity(config: &Config) -> ConfigResult<()> {
    let c = &config.capacity;
    let wei = c.max_price_wei.trim();
    if wei.is_empty() || wei.len() > MAX_WEI_DIGITS || !wei.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::invalid(
            "capacity.max_price_wei",
            format!("'{}' is not a decimal wei amount", c.max_price_wei),
        ));
    }
    if c.requests_per_period < 0 {
        return Err(ConfigError::invalid(
            "capacity.requests_per_period",
            "requests_per_period must not be negative",
        ));
    }
    if u32::try_from(c.requests_per_period).is_err() {
        return Err(ConfigError::invalid(
            "capacity.requests_per_period",
            format!("requests_per_period must not exceed {}", u32::MAX),
        ));
    }
    if c.period_secs <= 0 {
        return Err(ConfigError::invalid(
            "capacity.period_secs",
            "period_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_chains(config: &Config) -> ConfigResult<()> {
    for (name, chain) in &config.chains {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err(ConfigError::invalid(
                &format!("chains.{name}"),
                "chain ids use lowercase letters, digits, '-' and '_'",
            ));
        }
        if !(chain.rpc_url.starts_with("http://") || chain.rpc_url.starts_with("https://")) {
            return Err(ConfigError::invalid(
                &format!("chains.{name}.rpc_url"),
                format!("'{}' must start with http:// or https://", chain.rpc_url),
            ));
        }
    }
    Ok(())
}
