//! Test fixtures for common types.

use alloy_primitives::{Address, U256};

use keygate_auth::{ResourceGrant, ResourceKind, address_of};
use keygate_capacity::Restriction;
use keygate_chain::ChainId;
use keygate_conditions::CodeRef;
use keygate_crypto::KeyPair;

/// A well-formed CIDv0 used as a predicate program reference.
pub const TEST_CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

/// Deterministic address whose last byte is `n`.
#[must_use]
pub fn test_address(n: u8) -> Address {
    Address::with_last_byte(n)
}

/// The chain used by default in tests.
#[must_use]
pub fn test_chain() -> ChainId {
    ChainId::ethereum()
}

/// [`TEST_CID`] as a [`CodeRef`].
#[must_use]
pub fn test_code_ref() -> CodeRef {
    match CodeRef::parse(TEST_CID) {
        Ok(code_ref) => code_ref,
        Err(e) => panic!("fixture CID rejected: {e}"),
    }
}

/// 1 ETH per hour, 3 requests per hour.
#[must_use]
pub fn test_restriction() -> Restriction {
    match Restriction::new(U256::from(1_000_000_000_000_000_000u64), 3, 3600) {
        Ok(restriction) => restriction,
        Err(e) => panic!("fixture restriction rejected: {e}"),
    }
}

/// A fresh signing identity.
#[must_use]
pub fn test_signer() -> KeyPair {
    KeyPair::generate()
}

/// Deterministic signing identity number `n`.
#[must_use]
pub fn test_key(n: u8) -> KeyPair {
    match KeyPair::from_secret_key(&[n; 32]) {
        Ok(key) => key,
        Err(e) => panic!("fixture key rejected: {e}"),
    }
}

/// The address [`test_key`]`(n)` speaks for.
#[must_use]
pub fn test_key_address(n: u8) -> Address {
    address_of(&test_key(n).export_public_key())
}

/// Decrypt anything, run any predicate program.
#[must_use]
pub fn test_scope() -> Vec<ResourceGrant> {
    vec![
        ResourceGrant::any(ResourceKind::ConditionDecryption),
        ResourceGrant::any(ResourceKind::PredicateExecution),
    ]
}
