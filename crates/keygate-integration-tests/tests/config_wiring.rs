//! Building a gate from a config file.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use keygate_chain::ChainId;
use keygate_conditions::{EvaluationMode, FailurePolicy};
use keygate_config::Config;
use keygate_engine::{AccessGateBuilder, EngineError};
use keygate_test::{MockChainReader, test_address, test_chain};

const CONFIG: &str = r#"
[consistency]
required_margin = 3
poll_interval_ms = 250
deadline_secs = 20

[auth]
domain = "vault.example"
ttl_secs = 600

[evaluation]
mode = "lazy"
failure_policy = "deny"

[capacity]
max_price_wei = "5000"
requests_per_period = 7
period_secs = 60

[chains.ethereum]
rpc_url = "http://127.0.0.1:8545"
"#;

fn write_config(body: &str) -> (tempfile::TempDir, Config) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, body).unwrap();
    let config = Config::load_file(&path).unwrap();
    (dir, config)
}

#[test]
fn test_config_values_reach_the_gate() {
    let (_dir, config) = write_config(CONFIG);
    let gate = AccessGateBuilder::from_config(&config)
        .unwrap()
        .with_reader(test_chain(), Arc::new(MockChainReader::new()))
        .build();

    assert_eq!(gate.evaluator().mode(), EvaluationMode::Lazy);
    assert_eq!(gate.evaluator().failure_policy(), FailurePolicy::Deny);
    assert_eq!(gate.wait_config().required_margin, 3);
    assert_eq!(gate.wait_config().poll_interval, Duration::from_millis(250));
    assert_eq!(gate.wait_config().deadline, Duration::from_secs(20));
    assert!(gate.providers().contains(&ChainId::ethereum()));
    assert!(!gate.providers().contains(&ChainId::new("basecamp")));

    let restriction = gate.delegator_ledger(test_address(9)).restriction();
    assert_eq!(restriction.total_max_price_wei, U256::from(5000u64));
    assert_eq!(restriction.requests_per_period, 7);
    assert_eq!(restriction.period_secs, 60);
}

#[test]
fn test_unknown_mode_rejected() {
    let mut config = Config::default();
    config.evaluation.mode = "speculative".to_string();
    let err = AccessGateBuilder::from_config(&config).unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig { .. }));
}
