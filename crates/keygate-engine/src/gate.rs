//! The access gate: one entry point for condition-gated access.
//!
//! # Check flow
//!
//! 1. **Context**: proof, validity window (with clock skew), and a
//!    `condition-decryption` scope entry for the resource. Any failure is an
//!    error.
//! 2. **Program scope**: a `predicate-execution` scope entry for every
//!    predicate program the conditions run.
//! 3. **Capacity**: if the request names a paying delegator, one usage is
//!    charged to that delegator's ledger for the requester. Charged on every
//!    admitted attempt, whatever the conditions decide.
//! 4. **Conditions**: the tree is evaluated for the context's subject.
//!    `false` is a [`AccessDecision::Denied`], not an error.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info};
use uuid::Uuid;

use keygate_auth::{AuthorizationContext, AuthorizationContextIssuer, ResourceGrant, ResourceKind};
use keygate_capacity::{CapacityLedger, CapacityRegistry, Restriction};
use keygate_chain::{ChainId, ChainProviders, ConsistencyWaiter, WaitConfig};
use keygate_conditions::ConditionEvaluator;
use keygate_crypto::Signer;
use keygate_telemetry::RequestContext;

use crate::error::{EngineError, EngineResult};
use crate::resource::GatedResource;

/// Who pays for an access attempt, and how much.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Payment {
    /// Owner of the capacity ledger to charge.
    pub delegator: Address,
    /// Price of this attempt.
    pub price_wei: U256,
}

/// One access attempt.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    context: &'a AuthorizationContext,
    resource: &'a GatedResource,
    payment: Option<Payment>,
}

impl<'a> AccessRequest<'a> {
    /// Request `resource` under `context`.
    #[must_use]
    pub fn new(context: &'a AuthorizationContext, resource: &'a GatedResource) -> Self {
        Self {
            context,
            resource,
            payment: None,
        }
    }

    /// Charge the attempt to `delegator`'s capacity.
    #[must_use]
    pub fn paid_by(mut self, delegator: Address, price_wei: U256) -> Self {
        self.payment = Some(Payment {
            delegator,
            price_wei,
        });
        self
    }

    /// The presented context.
    #[must_use]
    pub fn context(&self) -> &AuthorizationContext {
        self.context
    }

    /// The requested resource.
    #[must_use]
    pub fn resource(&self) -> &GatedResource {
        self.resource
    }

    /// The payment, if any.
    #[must_use]
    pub fn payment(&self) -> Option<Payment> {
        self.payment
    }

    /// The requester: the address derived from the context's signing key.
    #[must_use]
    pub fn requester(&self) -> Address {
        self.context.subject.address
    }
}

/// A capacity charge made for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Charge {
    /// Ledger charged.
    pub delegator: Address,
    /// Amount recorded.
    pub amount_wei: U256,
    /// Spend remaining for the requester in the current window.
    pub remaining_wei: U256,
}

/// Outcome of an admitted access attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    /// The conditions hold.
    Granted {
        /// Context that authorized the attempt.
        context_id: Uuid,
        /// Resource released.
        resource_id: String,
        /// Capacity charged, if the attempt was paid for.
        charge: Option<Charge>,
    },
    /// The conditions do not hold.
    Denied {
        /// Context that was presented.
        context_id: Uuid,
        /// Resource withheld.
        resource_id: String,
        /// Capacity charged, if the attempt was paid for.
        charge: Option<Charge>,
    },
}

impl AccessDecision {
    /// Whether access was granted.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    /// Capacity charged for the attempt.
    #[must_use]
    pub fn charge(&self) -> Option<&Charge> {
        match self {
            Self::Granted { charge, .. } | Self::Denied { charge, .. } => charge.as_ref(),
        }
    }
}

/// Decides condition-gated access.
///
/// Cheap to share behind an `Arc`; all mutable state lives in the capacity
/// ledgers, which serialize their own updates.
#[derive(Debug)]
pub struct AccessGate {
    pub(crate) providers: ChainProviders,
    pub(crate) evaluator: ConditionEvaluator,
    pub(crate) ledgers: CapacityRegistry,
    pub(crate) issuer: AuthorizationContextIssuer,
    pub(crate) wait: WaitConfig,
    pub(crate) clock_skew: Duration,
    pub(crate) default_restriction: Restriction,
}

impl AccessGate {
    /// Decide `request` now.
    ///
    /// # Errors
    ///
    /// See [`authorize_at`](Self::authorize_at).
    pub async fn authorize(&self, request: &AccessRequest<'_>) -> EngineResult<AccessDecision> {
        self.authorize_at(request, Utc::now()).await
    }

    /// Decide `request` as of `now`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Auth`] if the context is forged, outside its window,
    ///   or not scoped to the resource or to one of its predicate programs.
    /// - [`EngineError::UnknownDelegator`] if the paying delegator has no
    ///   ledger.
    /// - [`EngineError::Capacity`] if the requester is not a delegatee or the
    ///   window's budget is spent. Nothing is evaluated in that case.
    /// - [`EngineError::Condition`] if evaluation fails under the
    ///   propagating failure policy. The charge, if any, stands.
    pub async fn authorize_at(
        &self,
        request: &AccessRequest<'_>,
        now: DateTime<Utc>,
    ) -> EngineResult<AccessDecision> {
        let ctx = RequestContext::new("access_gate")
            .with_operation("authorize")
            .with_requester(request.requester())
            .with_resource(request.resource().id());
        self.decide(request, now).instrument(ctx.span()).await
    }

    async fn decide(
        &self,
        request: &AccessRequest<'_>,
        now: DateTime<Utc>,
    ) -> EngineResult<AccessDecision> {
        let context = request.context();
        let resource = request.resource();

        context.authorize(ResourceKind::ConditionDecryption, resource.id(), now, self.clock_skew)?;
        for program in resource.predicate_programs() {
            context.authorize(
                ResourceKind::PredicateExecution,
                program.as_str(),
                now,
                self.clock_skew,
            )?;
        }

        let charge = match request.payment() {
            Some(payment) => Some(self.charge(payment, request.requester(), now)?),
            None => None,
        };

        let holds = self
            .evaluator
            .evaluate(resource.conditions(), request.requester())
            .await?;

        let context_id = context.id;
        let resource_id = resource.id().to_string();
        if holds {
            info!(%context_id, "access granted");
            Ok(AccessDecision::Granted {
                context_id,
                resource_id,
                charge,
            })
        } else {
            info!(%context_id, "access denied: conditions not met");
            Ok(AccessDecision::Denied {
                context_id,
                resource_id,
                charge,
            })
        }
    }

    fn charge(&self, payment: Payment, requester: Address, now: DateTime<Utc>) -> EngineResult<Charge> {
        let ledger = self
            .ledgers
            .ledger(&payment.delegator)
            .ok_or(EngineError::UnknownDelegator {
                delegator: payment.delegator,
            })?;
        let remaining_wei = ledger.record_usage_at(requester, payment.price_wei, now)?;
        debug!(delegator = %payment.delegator, %remaining_wei, "capacity charged");
        Ok(Charge {
            delegator: payment.delegator,
            amount_wei: payment.price_wei,
            remaining_wei,
        })
    }

    /// Wait until `chain` is `required_margin` blocks past
    /// `reference_block`, e.g. the block that included a mutation.
    ///
    /// Every height read is bounded by the read timeout and the whole wait by
    /// the configured deadline.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Chain`] if no reader is registered for `chain`,
    /// or [`EngineError::Wait`] carrying the last observed height.
    pub async fn await_settlement(&self, chain: &ChainId, reference_block: u64) -> EngineResult<u64> {
        self.settle(ConsistencyWaiter::new(self.wait), chain, reference_block)
            .await
    }

    /// [`await_settlement`](Self::await_settlement) that also stops when
    /// `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`await_settlement`](Self::await_settlement), plus
    /// [`WaitError::Cancelled`](keygate_chain::WaitError::Cancelled).
    pub async fn await_settlement_cancellable(
        &self,
        chain: &ChainId,
        reference_block: u64,
        cancel: CancellationToken,
    ) -> EngineResult<u64> {
        let waiter = ConsistencyWaiter::new(self.wait).with_cancellation(cancel);
        self.settle(waiter, chain, reference_block).await
    }

    async fn settle(
        &self,
        waiter: ConsistencyWaiter,
        chain: &ChainId,
        reference_block: u64,
    ) -> EngineResult<u64> {
        self.providers.reader(chain)?;
        let reached = waiter
            .await_advance(reference_block, || self.providers.block_height(chain))
            .await?;
        info!(%chain, reference_block, reached, "chain state settled");
        Ok(reached)
    }

    /// Issue a context for the signer's own address with the configured
    /// domain, statement and lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Auth`] if the scope is empty or signing fails.
    pub async fn issue_context(
        &self,
        signer: &dyn Signer,
        scope: Vec<ResourceGrant>,
    ) -> EngineResult<AuthorizationContext> {
        Ok(self.issuer.issue_default(signer, scope).await?)
    }

    /// The ledger for `delegator`, created with the default restriction if
    /// absent.
    #[must_use]
    pub fn delegator_ledger(&self, delegator: Address) -> Arc<CapacityLedger> {
        self.ledgers.get_or_create(delegator, self.default_restriction)
    }

    /// All delegator ledgers.
    #[must_use]
    pub fn ledgers(&self) -> &CapacityRegistry {
        &self.ledgers
    }

    /// Chain readers used for evaluation and settlement.
    #[must_use]
    pub fn providers(&self) -> &ChainProviders {
        &self.providers
    }

    /// The condition evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.evaluator
    }

    /// Settlement wait parameters.
    #[must_use]
    pub fn wait_config(&self) -> WaitConfig {
        self.wait
    }
}
