//! Optimistic deal updates for one referral's view.
//!
//! Every change follows the same sequence: plan it with the state machine,
//! apply it to the local override store before any I/O, write only the
//! changed fields, then keep the value on success or restore the value
//! captured at issuance on failure. The override lock is never held across
//! a store call, and writes to the same deal are not serialized: the last
//! write to reach the store wins.

use crate::domain::{
    AgentAttribution, Cents, Deal, DealId, DealPatch, DealStatus, RawDeal, Referral,
    TerminatedReason,
};
use crate::engine::normalizer::{normalize, normalize_one, sort_by_recency};
use crate::engine::selector::{display_deal, select_active};
use crate::engine::state_machine::{DealStateMachine, Role, TransitionContext, TransitionError};
use crate::orchestration::overrides::{OverrideMap, OverrideStore};
use crate::store::{DealStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result of a controller operation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The change was written and is now authoritative.
    Applied,
    /// The value was already current; nothing was sent.
    Unchanged,
    /// A new deal was created with this id.
    Created(DealId),
    /// The deal was deleted.
    Deleted,
    /// The user declined a destructive action; nothing was sent.
    Cancelled,
}

/// Explicit answer to a destructive-action prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

/// Broad class of a controller failure, for choosing how to present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Inline warning; the control reverts.
    PricingRequired,
    /// Input rejected before any network call.
    ValidationFailure,
    /// The write failed and was rolled back.
    PersistenceFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Rejected(#[from] TransitionError),
    #[error("Deal {0} is not part of this referral")]
    UnknownDeal(DealId),
    #[error("Could not save changes: {0}")]
    Persistence(#[from] StoreError),
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Rejected(TransitionError::PricingRequired { .. }) => {
                ErrorKind::PricingRequired
            }
            ControllerError::Rejected(_) | ControllerError::UnknownDeal(_) => {
                ErrorKind::ValidationFailure
            }
            ControllerError::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }
}

/// What a referral's deal panel shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealSummary {
    pub active_deal_id: Option<DealId>,
    /// Active deal, else the most recent one, with overrides applied.
    pub display: Option<Deal>,
    /// Fee due on the active deal; zero when no deal is active.
    pub amount_due: Cents,
    /// Status of a deal whose creation is in flight.
    pub pending_status: Option<DealStatus>,
    pub deal_count: usize,
}

#[derive(Debug)]
struct ViewState {
    referral: Referral,
    /// Canonical records, most recent first.
    deals: Vec<Deal>,
    overrides: OverrideStore,
    draft_status: Option<DealStatus>,
    /// Unresolved writes per deal.
    in_flight: HashMap<DealId, usize>,
}

impl ViewState {
    fn find(&self, id: &DealId) -> Option<&Deal> {
        self.deals.iter().find(|d| d.id.as_ref() == Some(id))
    }

    fn effective_deal(&self, id: &DealId) -> Option<Deal> {
        self.find(id).map(|d| self.overrides.apply(d))
    }

    fn begin_write(&mut self, id: &DealId) {
        *self.in_flight.entry(id.clone()).or_default() += 1;
    }

    fn finish_write(&mut self, id: &DealId) {
        if let Some(count) = self.in_flight.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(id);
            }
        }
    }

    /// Replace a local record with the store's copy. Records for deals no
    /// longer in the view are dropped.
    fn accept_record(&mut self, raw: &RawDeal) {
        let deal = normalize_one(raw);
        let Some(id) = deal.id.clone() else {
            return;
        };
        match self.deals.iter_mut().find(|d| d.id.as_ref() == Some(&id)) {
            Some(slot) => *slot = deal,
            None => debug!(deal_id = %id, "Ignoring write result for a deal no longer in view"),
        }
    }
}

/// Owns the local view of one referral's deals and keeps it in step with
/// the store.
pub struct DealController {
    store: Arc<dyn DealStore>,
    machine: DealStateMachine,
    view: Mutex<ViewState>,
}

impl DealController {
    /// Build a controller over records already fetched.
    pub fn new(
        store: Arc<dyn DealStore>,
        machine: DealStateMachine,
        referral: Referral,
        raw: &[RawDeal],
    ) -> Self {
        Self {
            store,
            machine,
            view: Mutex::new(ViewState {
                referral,
                deals: normalize(raw),
                overrides: OverrideStore::default(),
                draft_status: None,
                in_flight: HashMap::new(),
            }),
        }
    }

    /// Fetch a referral's deals from the store and build a controller.
    pub async fn load(
        store: Arc<dyn DealStore>,
        machine: DealStateMachine,
        referral: Referral,
    ) -> Result<Self, ControllerError> {
        let raw = store.list_deals(&referral.id).await?;
        Ok(Self::new(store, machine, referral, &raw))
    }

    fn view(&self) -> MutexGuard<'_, ViewState> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn referral(&self) -> Referral {
        self.view().referral.clone()
    }

    /// Swap in a newer copy of the referral (e.g. after its contract terms
    /// changed). Deal overrides are kept.
    pub fn update_referral(&self, referral: Referral) {
        self.view().referral = referral;
    }

    /// All deals, most recent first, with overrides applied.
    pub fn deals(&self) -> Vec<Deal> {
        let view = self.view();
        view.deals.iter().map(|d| view.overrides.apply(d)).collect()
    }

    pub fn effective_deal(&self, id: &DealId) -> Option<Deal> {
        self.view().effective_deal(id)
    }

    pub fn effective_status(&self, id: &DealId) -> Option<DealStatus> {
        self.view().effective_deal(id).map(|d| d.status)
    }

    /// Recomputed on every call so it always reflects current overrides.
    pub fn active_deal_id(&self) -> Option<DealId> {
        let view = self.view();
        select_active(&view.deals, view.overrides.status.as_map()).cloned()
    }

    pub fn summary(&self) -> DealSummary {
        let view = self.view();
        let statuses = view.overrides.status.as_map();
        let active_deal_id = select_active(&view.deals, statuses).cloned();

        let amount_due = active_deal_id
            .as_ref()
            .and_then(|id| view.effective_deal(id))
            .map(|deal| {
                DealStateMachine::expected_amount(
                    Some(&deal),
                    &view.referral,
                    &Default::default(),
                )
            })
            .unwrap_or(Cents::ZERO);

        DealSummary {
            display: display_deal(&view.deals, statuses).map(|d| view.overrides.apply(d)),
            active_deal_id,
            amount_due,
            pending_status: view.draft_status,
            deal_count: view.deals.len(),
        }
    }

    /// Status targets to offer a role for a deal, excluding its current status.
    pub fn offered_targets(&self, id: Option<&DealId>, role: Role) -> Vec<DealStatus> {
        let current = id.and_then(|id| self.effective_status(id));
        DealStateMachine::offered_targets(role)
            .iter()
            .copied()
            .filter(|s| Some(*s) != current)
            .collect()
    }

    pub fn is_expanded(&self, id: &DealId) -> bool {
        self.view()
            .overrides
            .expanded
            .get(id)
            .copied()
            .unwrap_or(false)
    }

    /// Expand or collapse a deal card. Local only.
    pub fn set_expanded(&self, id: &DealId, expanded: bool) {
        self.view().overrides.expanded.set(id.clone(), expanded);
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Move a deal to `next`, or create the referral's deal when `deal_id`
    /// is `None`.
    ///
    /// A rejected transition returns `Err(Rejected)` and leaves the view
    /// untouched; the caller resets its control to the previous value.
    pub async fn set_status(
        &self,
        deal_id: Option<&DealId>,
        next: DealStatus,
        ctx: &TransitionContext,
    ) -> Result<WriteOutcome, ControllerError> {
        match deal_id {
            Some(id) => self.update_status(id, next, ctx).await,
            None => self.create_with_status(next, ctx).await,
        }
    }

    async fn update_status(
        &self,
        id: &DealId,
        next: DealStatus,
        ctx: &TransitionContext,
    ) -> Result<WriteOutcome, ControllerError> {
        let (patch, previous_status, reason_change) = {
            let mut view = self.view();
            let current = view
                .effective_deal(id)
                .ok_or_else(|| ControllerError::UnknownDeal(id.clone()))?;
            let Some(plan) =
                self.machine
                    .plan_transition(Some(&current), &view.referral, next, ctx)?
            else {
                return Ok(WriteOutcome::Unchanged);
            };

            let previous_status = view.overrides.status.set(id.clone(), next);
            let reason_change = plan.patch.terminated_reason.map(|applied| {
                let previous = view.overrides.terminated_reason.set(id.clone(), applied);
                (applied, previous)
            });
            view.begin_write(id);
            (plan.patch, previous_status, reason_change)
        };

        let result = self.store.update_deal(id, &patch).await;
        let mut view = self.view();
        view.finish_write(id);

        match result {
            Ok(raw) => {
                // The accepted record carries the applied values now.
                view.accept_record(&raw);
                view.overrides.status.settle(id, &next);
                if let Some((applied, _)) = reason_change {
                    view.overrides.terminated_reason.settle(id, &applied);
                }
                info!(deal_id = %id, status = %next, "Deal status saved");
                Ok(WriteOutcome::Applied)
            }
            Err(e) => {
                view.overrides.status.restore(id, &next, previous_status);
                if let Some((applied, previous)) = reason_change {
                    view.overrides
                        .terminated_reason
                        .restore(id, &applied, previous);
                }
                warn!(deal_id = %id, status = %next, error = %e, "Deal status write failed, rolled back");
                Err(e.into())
            }
        }
    }

    async fn create_with_status(
        &self,
        next: DealStatus,
        ctx: &TransitionContext,
    ) -> Result<WriteOutcome, ControllerError> {
        let (patch, referral_id, previous_draft) = {
            let mut view = self.view();
            let Some(plan) = self
                .machine
                .plan_transition(None, &view.referral, next, ctx)?
            else {
                return Ok(WriteOutcome::Unchanged);
            };
            let previous_draft = view.draft_status.replace(next);
            (plan.patch, view.referral.id.clone(), previous_draft)
        };

        let result = self.store.create_deal(&referral_id, &patch).await;

        let mut view = self.view();
        if view.draft_status == Some(next) {
            view.draft_status = previous_draft;
        }

        let created = result.and_then(|raw| {
            let deal = normalize_one(&raw);
            match deal.id.clone() {
                Some(id) => Ok((id, deal)),
                None => Err(StoreError::Parse("created deal has no id".to_string())),
            }
        });

        match created {
            Ok((id, deal)) => {
                view.deals.push(deal);
                sort_by_recency(&mut view.deals);
                info!(referral_id = %referral_id, deal_id = %id, status = %next, "Deal created");
                Ok(WriteOutcome::Created(id))
            }
            Err(e) => {
                warn!(referral_id = %referral_id, status = %next, error = %e, "Deal creation failed");
                Err(e.into())
            }
        }
    }

    /// Change why a terminated deal fell through.
    pub async fn set_terminated_reason(
        &self,
        id: &DealId,
        reason: TerminatedReason,
    ) -> Result<WriteOutcome, ControllerError> {
        self.write_side_channel(
            id,
            Some(reason),
            |deal| DealStateMachine::plan_terminated_reason(deal, reason),
            |overrides| &mut overrides.terminated_reason,
        )
        .await
    }

    /// Record which channel closed the deal. No-op when unchanged.
    pub async fn set_agent_attribution(
        &self,
        id: &DealId,
        attribution: AgentAttribution,
    ) -> Result<WriteOutcome, ControllerError> {
        self.write_side_channel(
            id,
            attribution,
            |deal| Ok(DealStateMachine::plan_agent_attribution(deal, attribution)),
            |overrides| &mut overrides.agent_attribution,
        )
        .await
    }

    /// Flag financing-partner usage. No-op when unchanged.
    pub async fn set_used_afc(
        &self,
        id: &DealId,
        used_afc: bool,
    ) -> Result<WriteOutcome, ControllerError> {
        self.write_side_channel(
            id,
            used_afc,
            |deal| Ok(DealStateMachine::plan_used_afc(deal, used_afc)),
            |overrides| &mut overrides.used_afc,
        )
        .await
    }

    async fn write_side_channel<T>(
        &self,
        id: &DealId,
        value: T,
        plan: impl FnOnce(&Deal) -> Result<Option<DealPatch>, TransitionError>,
        slot: fn(&mut OverrideStore) -> &mut OverrideMap<T>,
    ) -> Result<WriteOutcome, ControllerError>
    where
        T: Clone + PartialEq + std::fmt::Debug,
    {
        let (patch, previous) = {
            let mut view = self.view();
            let current = view
                .effective_deal(id)
                .ok_or_else(|| ControllerError::UnknownDeal(id.clone()))?;
            let Some(patch) = plan(&current)? else {
                debug!(deal_id = %id, value = ?value, "Value unchanged, skipping write");
                return Ok(WriteOutcome::Unchanged);
            };
            let previous = slot(&mut view.overrides).set(id.clone(), value.clone());
            view.begin_write(id);
            (patch, previous)
        };

        let result = self.store.update_deal(id, &patch).await;
        let mut view = self.view();
        view.finish_write(id);

        match result {
            Ok(raw) => {
                view.accept_record(&raw);
                slot(&mut view.overrides).settle(id, &value);
                info!(deal_id = %id, value = ?value, "Deal field saved");
                Ok(WriteOutcome::Applied)
            }
            Err(e) => {
                slot(&mut view.overrides).restore(id, &value, previous);
                warn!(deal_id = %id, value = ?value, error = %e, "Deal field write failed, rolled back");
                Err(e.into())
            }
        }
    }

    /// Delete a deal after explicit confirmation.
    ///
    /// On success the id is purged from every override map and the active
    /// deal is re-evaluated over the remaining deals.
    pub async fn delete_deal(
        &self,
        id: &DealId,
        confirmation: Confirmation,
    ) -> Result<WriteOutcome, ControllerError> {
        if confirmation == Confirmation::Declined {
            debug!(deal_id = %id, "Deletion declined");
            return Ok(WriteOutcome::Cancelled);
        }
        if self.view().find(id).is_none() {
            return Err(ControllerError::UnknownDeal(id.clone()));
        }

        if let Err(e) = self.store.delete_deal(id).await {
            warn!(deal_id = %id, error = %e, "Deal deletion failed");
            return Err(e.into());
        }

        let mut view = self.view();
        view.deals.retain(|d| d.id.as_ref() != Some(id));
        view.overrides.purge(id);
        info!(deal_id = %id, "Deal deleted");
        Ok(WriteOutcome::Deleted)
    }

    /// Re-read the referral's deals from the store.
    ///
    /// Overrides for deals that no longer exist are dropped, as are those
    /// with no write in flight: the stored records are authoritative.
    pub async fn refresh(&self) -> Result<(), ControllerError> {
        let referral_id = self.view().referral.id.clone();
        let raw = self.store.list_deals(&referral_id).await?;
        let deals = normalize(&raw);
        let ids: HashSet<DealId> = deals.iter().filter_map(|d| d.id.clone()).collect();

        let mut guard = self.view();
        let view = &mut *guard;
        view.overrides.retain_ids(|id| ids.contains(id));
        let in_flight = &view.in_flight;
        view.overrides.settle_idle(|id| in_flight.contains_key(id));
        view.deals = deals;
        debug!(referral_id = %referral_id, deals = view.deals.len(), "Deals refreshed");
        Ok(())
    }
}

impl std::fmt::Debug for DealController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DealController")
            .field("store", &self.store)
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReferralId;
    use crate::store::MockDealStore;

    fn raw(id: &str, status: &str, created: &str) -> RawDeal {
        RawDeal {
            id: Some(id.to_string()),
            referral_id: Some("r1".to_string()),
            status: Some(status.to_string()),
            created_at: Some(serde_json::json!(created)),
            ..Default::default()
        }
    }

    async fn controller(store: Arc<MockDealStore>) -> DealController {
        DealController::load(
            store,
            DealStateMachine::default(),
            Referral::new(ReferralId::new("r1")),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_load_orders_and_selects_active() {
        let store = Arc::new(MockDealStore::new().with_deals(vec![
            raw("c", "paid", "2024-01-01T00:00:00Z"),
            raw("a", "terminated", "2024-03-01T00:00:00Z"),
            raw("b", "under_contract", "2024-02-01T00:00:00Z"),
        ]));
        let controller = controller(store).await;
        assert_eq!(controller.active_deal_id(), Some(DealId::new("b")));
        let ids: Vec<_> = controller
            .deals()
            .into_iter()
            .map(|d| d.id.unwrap().0)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_unknown_deal_is_validation_failure() {
        let store = Arc::new(MockDealStore::new());
        let controller = controller(store.clone()).await;
        let err = controller
            .set_used_afc(&DealId::new("ghost"), true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_expanded_state_is_local() {
        let store = Arc::new(
            MockDealStore::new().with_deal(raw("a", "closed", "2024-01-01T00:00:00Z")),
        );
        let controller = controller(store.clone()).await;
        let id = DealId::new("a");
        assert!(!controller.is_expanded(&id));
        controller.set_expanded(&id, true);
        assert!(controller.is_expanded(&id));
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_offered_targets_exclude_current() {
        let store = Arc::new(
            MockDealStore::new().with_deal(raw("a", "closed", "2024-01-01T00:00:00Z")),
        );
        let controller = controller(store).await;
        let targets = controller.offered_targets(Some(&DealId::new("a")), Role::Agent);
        assert!(!targets.contains(&DealStatus::Closed));
        assert!(!targets.contains(&DealStatus::Paid));
        assert!(targets.contains(&DealStatus::Terminated));
        assert_eq!(controller.offered_targets(None, Role::Admin).len(), 8);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            ControllerError::Rejected(TransitionError::PricingRequired {
                target: DealStatus::Closed
            })
            .kind(),
            ErrorKind::PricingRequired
        );
        assert_eq!(
            ControllerError::Rejected(TransitionError::ReasonRequiresTermination).kind(),
            ErrorKind::ValidationFailure
        );
        assert_eq!(
            ControllerError::Persistence(StoreError::RateLimited).kind(),
            ErrorKind::PersistenceFailure
        );
    }
}
