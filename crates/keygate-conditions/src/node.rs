//! The condition tree.

use alloy_primitives::{Address, U256};
use keygate_chain::{ChainId, TokenRef};
use serde::{Deserialize, Serialize};

use crate::code_ref::CodeRef;
use crate::error::{ConditionError, ConditionResult};
use crate::value::{Comparator, ConditionValue, MAX_ARGS, ReturnValueTest};

/// Maximum depth of a condition tree, counting the root.
pub const MAX_TREE_DEPTH: usize = 32;

/// The requester must be a specific wallet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletOwnership {
    /// Chain the ownership claim is scoped to.
    pub chain: ChainId,
    /// The wallet that must make the request.
    pub address: Address,
}

/// The requester's balance must compare against a threshold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceComparison {
    /// Chain the balance is read from.
    pub chain: ChainId,
    /// Which balance is read.
    pub token: TokenRef,
    /// `balance <comparator> threshold_wei`.
    pub comparator: Comparator,
    /// Threshold in the token's smallest unit.
    pub threshold_wei: U256,
}

/// A sandboxed program must return a value passing `expected`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePredicate {
    /// Chain the program is evaluated against.
    pub chain: ChainId,
    /// The program.
    pub code_ref: CodeRef,
    /// Entry point to invoke.
    pub function: String,
    /// Positional arguments, passed before the requester identity.
    pub args: Vec<ConditionValue>,
    /// Test applied to the program's return value.
    pub expected: ReturnValueTest,
}

/// A node of an access-condition tree.
///
/// Trees are plain owned data: finite, acyclic and immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionNode {
    /// See [`WalletOwnership`].
    WalletOwnership(WalletOwnership),
    /// See [`BalanceComparison`].
    BalanceComparison(BalanceComparison),
    /// See [`RemotePredicate`].
    RemotePredicate(RemotePredicate),
    /// Both sides must hold.
    And {
        /// Left operand.
        left: Box<ConditionNode>,
        /// Right operand.
        right: Box<ConditionNode>,
    },
    /// At least one side must hold.
    Or {
        /// Left operand.
        left: Box<ConditionNode>,
        /// Right operand.
        right: Box<ConditionNode>,
    },
}

impl ConditionNode {
    /// `left AND right`.
    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `left OR right`.
    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Whether this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Self::And { .. } | Self::Or { .. })
    }

    /// The chain a leaf is scoped to; `None` for combinators.
    #[must_use]
    pub fn chain(&self) -> Option<&ChainId> {
        match self {
            Self::WalletOwnership(leaf) => Some(&leaf.chain),
            Self::BalanceComparison(leaf) => Some(&leaf.chain),
            Self::RemotePredicate(leaf) => Some(&leaf.chain),
            Self::And { .. } | Self::Or { .. } => None,
        }
    }

    /// Depth of the tree; a single leaf has depth 1.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::And { left, right } | Self::Or { left, right } => {
                left.depth().max(right.depth()).saturating_add(1)
            },
            _ => 1,
        }
    }

    /// Leaves in left-to-right order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&ConditionNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a ConditionNode>) {
        match self {
            Self::And { left, right } | Self::Or { left, right } => {
                left.collect_leaves(out);
                right.collect_leaves(out);
            },
            leaf => out.push(leaf),
        }
    }

    /// Remote predicates referenced anywhere in the tree, left to right.
    #[must_use]
    pub fn remote_predicates(&self) -> Vec<&RemotePredicate> {
        self.leaves()
            .into_iter()
            .filter_map(|leaf| match leaf {
                Self::RemotePredicate(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Check that every leaf is well-formed and the tree is within limits.
    ///
    /// Trees produced by [`ConditionBuilder`](crate::ConditionBuilder) always
    /// pass; this matters for trees that were deserialized.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Malformed`] describing the first problem found.
    pub fn validate(&self) -> ConditionResult<()> {
        if self.depth() > MAX_TREE_DEPTH {
            return Err(ConditionError::malformed(format!(
                "tree deeper than {MAX_TREE_DEPTH} levels"
            )));
        }
        self.leaves().into_iter().try_for_each(validate_leaf)
    }

    /// Deterministic byte encoding of the tree.
    ///
    /// Field order is fixed by the type definitions, so equal trees always
    /// encode to equal bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Malformed`] if serialization fails.
    pub fn canonical_bytes(&self) -> ConditionResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| ConditionError::malformed(format!("unserializable tree: {e}")))
    }
}

fn validate_leaf(leaf: &ConditionNode) -> ConditionResult<()> {
    if let Some(chain) = leaf.chain()
        && !chain.is_valid()
    {
        return Err(ConditionError::malformed(format!(
            "invalid chain identifier: {chain:?}"
        )));
    }
    if let ConditionNode::RemotePredicate(p) = leaf {
        validate_predicate_call(&p.code_ref, &p.function, &p.args, &p.expected)?;
    }
    Ok(())
}

pub(crate) fn validate_predicate_call(
    code_ref: &CodeRef,
    function: &str,
    args: &[ConditionValue],
    expected: &ReturnValueTest,
) -> ConditionResult<()> {
    if function.trim().is_empty() {
        return Err(ConditionError::malformed(format!(
            "remote predicate {code_ref} has no function name"
        )));
    }
    if args.len() > MAX_ARGS {
        return Err(ConditionError::malformed(format!(
            "remote predicate takes at most {MAX_ARGS} arguments"
        )));
    }
    args.iter().try_for_each(ConditionValue::validate)?;
    expected.validate()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(n: u8) -> ConditionNode {
        ConditionNode::WalletOwnership(WalletOwnership {
            chain: ChainId::ethereum(),
            address: Address::repeat_byte(n),
        })
    }

    #[test]
    fn test_depth_and_leaves() {
        let tree = ConditionNode::and(ConditionNode::or(wallet(1), wallet(2)), wallet(3));
        assert_eq!(tree.depth(), 3);
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 3);
        assert_eq!(leaves[0], &wallet(1));
        assert_eq!(leaves[2], &wallet(3));
        assert!(tree.chain().is_none());
        assert!(!tree.is_leaf());
    }

    #[test]
    fn test_validate_rejects_bad_chain() {
        let leaf = ConditionNode::WalletOwnership(WalletOwnership {
            chain: ChainId::new("main net"),
            address: Address::ZERO,
        });
        assert!(matches!(
            ConditionNode::and(wallet(1), leaf).validate(),
            Err(ConditionError::Malformed { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_deep_tree() {
        let mut tree = wallet(0);
        for _ in 0..MAX_TREE_DEPTH {
            tree = ConditionNode::and(tree, wallet(1));
        }
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(ConditionNode::or(wallet(1), wallet(2))).unwrap();
        assert_eq!(json["kind"], "or");
        assert_eq!(json["left"]["kind"], "wallet_ownership");
        assert_eq!(json["left"]["chain"], "ethereum");

        let back: ConditionNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, ConditionNode::or(wallet(1), wallet(2)));
    }

    #[test]
    fn test_canonical_bytes_stable() {
        let a = ConditionNode::and(wallet(1), wallet(2));
        let b = ConditionNode::and(wallet(1), wallet(2));
        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
        assert_ne!(
            a.canonical_bytes().unwrap(),
            ConditionNode::and(wallet(2), wallet(1)).canonical_bytes().unwrap()
        );
    }
}
