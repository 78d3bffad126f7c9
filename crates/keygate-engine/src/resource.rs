//! Condition-gated resources.

use serde::Serialize;

use keygate_conditions::{CodeRef, ConditionNode};
use keygate_crypto::ContentHash;

use crate::error::EngineResult;

const RESOURCE_ID_DOMAIN: &str = "keygate 2025 gated-resource id v1";

/// A payload bound to the conditions that gate it.
///
/// The resource id hashes the payload hash together with the canonical
/// condition tree, so a context scoped to one resource cannot be replayed
/// against another, and changing the conditions changes the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatedResource {
    id: String,
    payload_hash: ContentHash,
    conditions: ConditionNode,
}

impl GatedResource {
    /// Bind `payload` to `conditions`.
    ///
    /// # Errors
    ///
    /// Returns a condition error if the tree is malformed.
    pub fn new(payload: &[u8], conditions: ConditionNode) -> EngineResult<Self> {
        Self::from_payload_hash(ContentHash::hash(payload), conditions)
    }

    /// Bind an already-hashed payload to `conditions`.
    ///
    /// # Errors
    ///
    /// Returns a condition error if the tree is malformed.
    pub fn from_payload_hash(
        payload_hash: ContentHash,
        conditions: ConditionNode,
    ) -> EngineResult<Self> {
        conditions.validate()?;
        let canonical = conditions.canonical_bytes()?;
        let id = ContentHash::hash_parts_with_domain(
            RESOURCE_ID_DOMAIN,
            &[payload_hash.as_bytes(), &canonical],
        )
        .to_hex();
        Ok(Self {
            id,
            payload_hash,
            conditions,
        })
    }

    /// Hex resource id; the value authorization contexts are scoped to.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// BLAKE3 hash of the payload.
    #[must_use]
    pub fn payload_hash(&self) -> ContentHash {
        self.payload_hash
    }

    /// The gating conditions.
    #[must_use]
    pub fn conditions(&self) -> &ConditionNode {
        &self.conditions
    }

    /// Distinct predicate programs the conditions run, in first-seen order.
    #[must_use]
    pub fn predicate_programs(&self) -> Vec<&CodeRef> {
        let mut seen: Vec<&CodeRef> = Vec::new();
        for leaf in self.conditions.remote_predicates() {
            if !seen.contains(&&leaf.code_ref) {
                seen.push(&leaf.code_ref);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use keygate_conditions::{Comparator, ConditionBuilder, ReturnValueTest};
    use keygate_test::{TEST_CID, test_address, test_chain};

    fn ownership(n: u8) -> ConditionNode {
        ConditionBuilder::new()
            .require_wallet_ownership(test_address(n))
            .on(test_chain())
            .build()
            .unwrap()
    }

    #[test]
    fn test_id_binds_payload_and_conditions() {
        let a = GatedResource::new(b"secret", ownership(1)).unwrap();
        let same = GatedResource::new(b"secret", ownership(1)).unwrap();
        let other_payload = GatedResource::new(b"secret!", ownership(1)).unwrap();
        let other_conditions = GatedResource::new(b"secret", ownership(2)).unwrap();

        assert_eq!(a.id(), same.id());
        assert_ne!(a.id(), other_payload.id());
        assert_ne!(a.id(), other_conditions.id());
        assert_eq!(a.id().len(), 64);
        assert_eq!(a.payload_hash(), ContentHash::hash(b"secret"));
    }

    #[test]
    fn test_predicate_programs_deduplicated() {
        let tree = ConditionBuilder::new()
            .require_remote_predicate(TEST_CID, "go", vec![], ReturnValueTest::is_true())
            .on(test_chain())
            .or()
            .require_remote_predicate(TEST_CID, "go", vec![], ReturnValueTest::is_true())
            .on(test_chain())
            .and()
            .require_eth_balance(U256::from(1u64), Comparator::Ge)
            .on(test_chain())
            .build()
            .unwrap();

        let resource = GatedResource::new(b"x", tree).unwrap();
        assert_eq!(resource.predicate_programs().len(), 1);
        assert_eq!(resource.predicate_programs()[0].as_str(), TEST_CID);
    }
}
