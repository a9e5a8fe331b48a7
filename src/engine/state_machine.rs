//! Deal lifecycle state machine.
//!
//! The status graph is free: any status may move to any other, backwards
//! included, because real deals regress (financing falls through, a
//! terminated deal is revived). What the machine does enforce:
//!
//! ```text
//!   target offered to role?  ── no ──▶ NotOffered
//!          │ yes
//!   target == terminated? ── yes ──▶ expected = received = 0, reason set
//!          │ no
//!   candidate amount > 0 or target == under_contract? ── no ──▶ PricingRequired
//!          │ yes
//!   status (+ expected amount, + cleared reason when leaving terminated)
//! ```
//!
//! Planning is pure: it returns the exact [`DealPatch`] to persist and never
//! touches a store.

use crate::domain::{
    AgentAttribution, Cents, ContractTerms, Deal, DealPatch, DealStatus, RawDeal, Referral,
    TerminatedReason,
};
use crate::engine::fee::derive_from_terms;
use crate::engine::normalizer::normalize_one;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// Caller role, used to scope which targets are offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Brokerage staff; may set every status.
    #[default]
    Admin,
    /// Partner agent; payment statuses are recorded by the brokerage.
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

const AGENT_TARGETS: [DealStatus; 6] = [
    DealStatus::UnderContract,
    DealStatus::PastInspection,
    DealStatus::PastAppraisal,
    DealStatus::ClearToClose,
    DealStatus::Closed,
    DealStatus::Terminated,
];

/// Caller-supplied inputs for a status change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionContext {
    pub role: Role,
    /// Reason to record when the target is `terminated`.
    pub terminated_reason: Option<TerminatedReason>,
    /// Pricing the caller is editing; used for legs the deal and referral lack.
    pub pricing_override: ContractTerms,
}

impl TransitionContext {
    pub fn for_role(role: Role) -> Self {
        TransitionContext {
            role,
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: TerminatedReason) -> Self {
        self.terminated_reason = Some(reason);
        self
    }

    pub fn with_pricing(mut self, terms: ContractTerms) -> Self {
        self.pricing_override = terms;
        self
    }
}

/// A validated status change and the fields it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// `None` when the deal does not exist yet.
    pub from: Option<DealStatus>,
    pub to: DealStatus,
    pub patch: DealPatch,
}

/// A status or field change refused before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Add a contract price, commission and referral fee before moving this deal to {target}")]
    PricingRequired { target: DealStatus },
    #[error("The {role} role cannot move a deal to {target}")]
    NotOffered { role: Role, target: DealStatus },
    #[error("A termination reason can only be set on a terminated deal")]
    ReasonRequiresTermination,
}

/// Guarded transition planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DealStateMachine {
    default_terminated_reason: TerminatedReason,
}

impl Default for DealStateMachine {
    fn default() -> Self {
        Self::new(TerminatedReason::ChangedMind)
    }
}

impl DealStateMachine {
    pub fn new(default_terminated_reason: TerminatedReason) -> Self {
        Self {
            default_terminated_reason,
        }
    }

    pub fn default_terminated_reason(&self) -> TerminatedReason {
        self.default_terminated_reason
    }

    /// Targets a role may pick from.
    pub fn offered_targets(role: Role) -> &'static [DealStatus] {
        match role {
            Role::Admin => &DealStatus::ALL,
            Role::Agent => &AGENT_TARGETS,
        }
    }

    /// Whether the graph allows `from -> to` for `role`, ignoring pricing.
    pub fn can_transition(from: Option<DealStatus>, to: DealStatus, role: Role) -> bool {
        from != Some(to) && Self::offered_targets(role).contains(&to)
    }

    /// Best available referral fee for a deal.
    ///
    /// Derives from contract terms first, merging each leg from the deal,
    /// then the referral defaults, then the caller override. Falls back to
    /// the deal's persisted amount, then the referral's flat fee hint.
    /// Returns zero when nothing is priced.
    pub fn expected_amount(
        deal: Option<&Deal>,
        referral: &Referral,
        pricing_override: &ContractTerms,
    ) -> Cents {
        let deal_terms = deal
            .map(|d| ContractTerms {
                contract_price_cents: d.contract_price_cents,
                commission_basis_points: d.commission_basis_points,
                referral_fee_basis_points: d.referral_fee_basis_points,
            })
            .unwrap_or_default();
        let terms = deal_terms.or(referral.contract).or(*pricing_override);

        derive_from_terms(&terms)
            .or_else(|| {
                deal.map(|d| d.expected_amount_cents)
                    .filter(Cents::is_positive)
            })
            .or_else(|| referral.referral_fee_due_cents.filter(Cents::is_positive))
            .unwrap_or(Cents::ZERO)
    }

    /// Plan a status change for `current` (with local overrides already
    /// applied), or for a deal not created yet when `current` is `None`.
    ///
    /// Returns `Ok(None)` when the deal already has the target status.
    pub fn plan_transition(
        &self,
        current: Option<&Deal>,
        referral: &Referral,
        next: DealStatus,
        ctx: &TransitionContext,
    ) -> Result<Option<TransitionPlan>, TransitionError> {
        let from = current.map(|d| d.status);
        if from == Some(next) {
            return Ok(None);
        }
        if !Self::offered_targets(ctx.role).contains(&next) {
            return Err(TransitionError::NotOffered {
                role: ctx.role,
                target: next,
            });
        }

        let mut patch = DealPatch {
            status: Some(next),
            ..Default::default()
        };

        if next.is_terminated() {
            let reason = ctx
                .terminated_reason
                .or_else(|| current.and_then(|d| d.terminated_reason))
                .unwrap_or(self.default_terminated_reason);
            patch.expected_amount_cents = Some(Cents::ZERO);
            patch.received_amount_cents = Some(Cents::ZERO);
            patch.terminated_reason = Some(Some(reason));
        } else {
            let amount = Self::expected_amount(current, referral, &ctx.pricing_override);
            if !amount.is_positive() && next != DealStatus::UnderContract {
                debug!(referral_id = %referral.id, target = %next, "Transition needs pricing");
                return Err(TransitionError::PricingRequired { target: next });
            }
            if amount.is_positive() && current.map(|d| d.expected_amount_cents) != Some(amount) {
                patch.expected_amount_cents = Some(amount);
            }
            if from.is_some_and(|s| s.is_terminated())
                || current.is_some_and(|d| d.terminated_reason.is_some())
            {
                patch.terminated_reason = Some(None);
            }
        }

        info!(
            referral_id = %referral.id,
            deal_id = ?current.and_then(|d| d.id.as_ref()),
            from = ?from,
            to = %next,
            "Deal transition planned"
        );

        Ok(Some(TransitionPlan {
            from,
            to: next,
            patch,
        }))
    }

    /// Plan a reason change on a terminated deal.
    pub fn plan_terminated_reason(
        current: &Deal,
        reason: TerminatedReason,
    ) -> Result<Option<DealPatch>, TransitionError> {
        if !current.status.is_terminated() {
            return Err(TransitionError::ReasonRequiresTermination);
        }
        if current.terminated_reason == Some(reason) {
            return Ok(None);
        }
        Ok(Some(DealPatch {
            terminated_reason: Some(Some(reason)),
            ..Default::default()
        }))
    }

    /// Plan an attribution change; `None` when the value is unchanged.
    pub fn plan_agent_attribution(current: &Deal, value: AgentAttribution) -> Option<DealPatch> {
        (current.agent_attribution != value).then(|| DealPatch {
            agent_attribution: Some(value),
            ..Default::default()
        })
    }

    /// Plan an AFC flag change; `None` when the value is unchanged.
    pub fn plan_used_afc(current: &Deal, value: bool) -> Option<DealPatch> {
        (current.used_afc != value).then(|| DealPatch {
            used_afc: Some(value),
            ..Default::default()
        })
    }

    /// Check a client-written patch against the pricing guard and complete
    /// it for storage.
    ///
    /// Amounts and terms carried by the patch count as the deal's own. A
    /// status change to a non-terminated target stores the recomputed
    /// expected amount, so a deal leaving `terminated` is repriced.
    ///
    /// # Errors
    /// `PricingRequired` when the new status needs an amount nothing supplies.
    pub fn guard_patch(
        &self,
        current: Option<&Deal>,
        referral: &Referral,
        mut patch: DealPatch,
    ) -> Result<DealPatch, TransitionError> {
        let changes_status = patch
            .status
            .filter(|next| current.map(|d| d.status) != Some(*next));

        if let Some(next) = changes_status.filter(|s| !s.is_terminated()) {
            let mut candidate = current
                .cloned()
                .unwrap_or_else(|| normalize_one(&RawDeal::default()));
            patch.apply_to(&mut candidate);

            let amount = Self::expected_amount(Some(&candidate), referral, &ContractTerms::default());
            if amount.is_positive() {
                patch.expected_amount_cents = Some(amount);
            } else if next != DealStatus::UnderContract {
                debug!(referral_id = %referral.id, target = %next, "Stored transition needs pricing");
                return Err(TransitionError::PricingRequired { target: next });
            }
        }
        Ok(self.seal_patch(current, patch))
    }

    /// Complete an incoming patch so the stored record keeps the deal
    /// invariants regardless of what the writer sent.
    ///
    /// Used on the storage side, where patches arrive from clients.
    pub fn seal_patch(&self, current: Option<&Deal>, mut patch: DealPatch) -> DealPatch {
        let status = patch
            .status
            .or_else(|| current.map(|d| d.status))
            .unwrap_or(DealStatus::UnderContract);

        if status.is_terminated() {
            patch.expected_amount_cents = Some(Cents::ZERO);
            patch.received_amount_cents = Some(Cents::ZERO);
            let reason = patch
                .terminated_reason
                .flatten()
                .or_else(|| current.and_then(|d| d.terminated_reason))
                .unwrap_or(self.default_terminated_reason);
            patch.terminated_reason = Some(Some(reason));
        } else if patch.terminated_reason.is_some()
            || current.is_some_and(|d| d.terminated_reason.is_some())
        {
            patch.terminated_reason = Some(None);
        }
        patch
    }
}
