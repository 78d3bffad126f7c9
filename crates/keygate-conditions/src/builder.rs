//! Fluent construction of condition trees.
//!
//! Each call consumes the builder and returns a new one, so a partially built
//! expression can be cloned and extended in two directions without either
//! branch observing the other.
//!
//! ```
//! use keygate_conditions::{Comparator, ConditionBuilder, ConditionNode};
//! use alloy_primitives::U256;
//!
//! let tree = ConditionBuilder::new()
//!     .require_eth_balance(U256::from(10u64).pow(U256::from(18u64)), Comparator::Ge)
//!     .on("ethereum")
//!     .build()
//!     .unwrap();
//! assert!(matches!(tree, ConditionNode::BalanceComparison(_)));
//! ```

use alloy_primitives::{Address, U256};
use keygate_chain::{ChainId, TokenRef};

use crate::code_ref::CodeRef;
use crate::error::{ConditionError, ConditionResult};
use crate::node::{
    BalanceComparison, ConditionNode, RemotePredicate, WalletOwnership, validate_predicate_call,
};
use crate::value::{Comparator, ConditionValue, ReturnValueTest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    And,
    Or,
}

/// A leaf still waiting for its chain binding.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingLeaf {
    Wallet {
        address: Address,
    },
    Balance {
        token: TokenRef,
        comparator: Comparator,
        threshold_wei: U256,
    },
    Remote {
        code_ref: CodeRef,
        function: String,
        args: Vec<ConditionValue>,
        expected: ReturnValueTest,
    },
}

impl PendingLeaf {
    fn bind(self, chain: ChainId) -> ConditionNode {
        match self {
            Self::Wallet { address } => {
                ConditionNode::WalletOwnership(WalletOwnership { chain, address })
            },
            Self::Balance {
                token,
                comparator,
                threshold_wei,
            } => ConditionNode::BalanceComparison(BalanceComparison {
                chain,
                token,
                comparator,
                threshold_wei,
            }),
            Self::Remote {
                code_ref,
                function,
                args,
                expected,
            } => ConditionNode::RemotePredicate(RemotePredicate {
                chain,
                code_ref,
                function,
                args,
                expected,
            }),
        }
    }
}

/// Immutable fluent builder for [`ConditionNode`] trees.
///
/// Each `require_*` call adds a leaf that must be scoped with
/// [`on`](Self::on) before anything else happens. [`and`](Self::and) and
/// [`or`](Self::or) combine everything accumulated so far with the next
/// condition, so `a.and().b.or().c` builds `(a AND b) OR c`. Use
/// [`require`](Self::require) with a separately built tree for other
/// groupings.
///
/// Misuse is recorded at the first offending call and reported by
/// [`build`](Self::build).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use = "builders do nothing until build() is called"]
pub struct ConditionBuilder {
    root: Option<ConditionNode>,
    combinator: Option<Combinator>,
    pending: Option<PendingLeaf>,
    error: Option<String>,
}

impl ConditionBuilder {
    /// Start an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the request to come from `address`.
    pub fn require_wallet_ownership(self, address: Address) -> Self {
        self.push_leaf(PendingLeaf::Wallet { address })
    }

    /// Require the requester's native balance to satisfy
    /// `balance <comparator> threshold_wei`.
    pub fn require_eth_balance(self, threshold_wei: U256, comparator: Comparator) -> Self {
        self.require_token_balance(TokenRef::Native, threshold_wei, comparator)
    }

    /// Require the requester's balance of `token` to satisfy
    /// `balance <comparator> threshold_wei`.
    pub fn require_token_balance(
        self,
        token: TokenRef,
        threshold_wei: U256,
        comparator: Comparator,
    ) -> Self {
        self.push_leaf(PendingLeaf::Balance {
            token,
            comparator,
            threshold_wei,
        })
    }

    /// Require a remote predicate program to return a value passing `expected`.
    ///
    /// An invalid content reference, empty function name or oversized
    /// argument list is recorded as an error.
    pub fn require_remote_predicate(
        self,
        code_ref: impl AsRef<str>,
        function: impl Into<String>,
        args: Vec<ConditionValue>,
        expected: ReturnValueTest,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let code_ref = match CodeRef::parse(code_ref.as_ref()) {
            Ok(code_ref) => code_ref,
            Err(e) => return self.fail(e.to_string()),
        };
        let function = function.into();
        // Checked here so the error points at this call rather than at on().
        if let Err(e) = validate_predicate_call(&code_ref, &function, &args, &expected) {
            return self.fail(e.to_string());
        }
        self.push_leaf(PendingLeaf::Remote {
            code_ref,
            function,
            args,
            expected,
        })
    }

    /// Scope the most recently added leaf to `chain`.
    pub fn on(mut self, chain: impl Into<ChainId>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let chain = chain.into();
        if !chain.is_valid() {
            return self.fail(format!("invalid chain identifier: {chain:?}"));
        }
        let Some(leaf) = self.pending.take() else {
            return self.fail("on() must follow a require_* call");
        };
        self.attach(leaf.bind(chain))
    }

    /// Add an already built tree as the next operand.
    pub fn require(self, node: ConditionNode) -> Self {
        if self.error.is_some() {
            return self;
        }
        if let Err(e) = node.validate() {
            return self.fail(e.to_string());
        }
        match self.check_can_start() {
            Ok(()) => self.attach(node),
            Err(reason) => self.fail(reason),
        }
    }

    /// Combine the expression so far with the next condition using AND.
    pub fn and(self) -> Self {
        self.push_combinator(Combinator::And)
    }

    /// Combine the expression so far with the next condition using OR.
    pub fn or(self) -> Self {
        self.push_combinator(Combinator::Or)
    }

    /// Finish the tree.
    ///
    /// The same sequence of calls always produces a structurally identical tree.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionError::Malformed`] if the builder is empty, a leaf
    /// was never scoped with `on()`, a combinator has no right operand, or
    /// any earlier call was invalid.
    pub fn build(self) -> ConditionResult<ConditionNode> {
        if let Some(reason) = self.error {
            return Err(ConditionError::Malformed { reason });
        }
        if self.pending.is_some() {
            return Err(ConditionError::malformed(
                "last condition has no chain; call on() after it",
            ));
        }
        if let Some(combinator) = self.combinator {
            return Err(ConditionError::malformed(format!(
                "{combinator:?} has no right operand"
            )));
        }
        let root = self
            .root
            .ok_or_else(|| ConditionError::malformed("no conditions were added"))?;
        root.validate()?;
        Ok(root)
    }

    fn push_leaf(self, leaf: PendingLeaf) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.check_can_start() {
            Ok(()) => Self {
                pending: Some(leaf),
                ..self
            },
            Err(reason) => self.fail(reason),
        }
    }

    fn push_combinator(mut self, combinator: Combinator) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.pending.is_some() {
            return self.fail(format!(
                "{combinator:?} follows a condition with no chain; call on() first"
            ));
        }
        if self.root.is_none() {
            return self.fail(format!("{combinator:?} has no left operand"));
        }
        if let Some(previous) = self.combinator {
            return self.fail(format!("{combinator:?} directly follows {previous:?}"));
        }
        self.combinator = Some(combinator);
        self
    }

    /// Whether a new operand may begin here.
    fn check_can_start(&self) -> Result<(), String> {
        if self.pending.is_some() {
            return Err("new condition started before the previous one was scoped with on()".into());
        }
        if self.root.is_some() && self.combinator.is_none() {
            return Err("conditions must be joined with and() or or()".into());
        }
        Ok(())
    }

    fn attach(mut self, node: ConditionNode) -> Self {
        self.root = Some(match (self.root.take(), self.combinator.take()) {
            (Some(left), Some(Combinator::And)) => ConditionNode::and(left, node),
            (Some(left), Some(Combinator::Or)) => ConditionNode::or(left, node),
            _ => node,
        });
        self
    }

    fn fail(mut self, reason: impl Into<String>) -> Self {
        self.error = Some(reason.into());
        self
    }
}
