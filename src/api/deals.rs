use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::api::referrals::load_referral;
use crate::api::AppState;
use crate::domain::{Cents, ContractTerms, Deal, DealId, DealPatch, ReferralId};
use crate::engine::normalizer::{normalize, normalize_one};
use crate::engine::{select_active, DealStateMachine, TransitionError};
use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealsResponse {
    pub referral_id: ReferralId,
    /// Most recent first.
    pub deals: Vec<Deal>,
    pub active_deal_id: Option<DealId>,
    /// Fee due on the active deal only; zero when every deal is terminated.
    pub amount_due_cents: Cents,
    pub amount_due: String,
}

pub async fn list_deals(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DealsResponse>, AppError> {
    let referral_id = ReferralId::new(id);
    let referral = load_referral(&state, &referral_id).await?;
    let deals = normalize(&state.repo.list_deals_for(&referral_id).await?);

    let active_deal_id = select_active(&deals, &HashMap::new()).cloned();
    let amount_due = active_deal_id
        .as_ref()
        .and_then(|id| deals.iter().find(|d| d.id.as_ref() == Some(id)))
        .map(|deal| {
            DealStateMachine::expected_amount(Some(deal), &referral, &ContractTerms::default())
        })
        .unwrap_or(Cents::ZERO);

    Ok(Json(DealsResponse {
        referral_id,
        deals,
        active_deal_id,
        amount_due_cents: amount_due,
        amount_due: amount_due.to_string(),
    }))
}

/// A reason may only be written when the deal ends up terminated.
fn check_reason(current: Option<&Deal>, patch: &DealPatch) -> Result<(), TransitionError> {
    let status = patch.status.or_else(|| current.map(|d| d.status));
    let sets_reason = matches!(patch.terminated_reason, Some(Some(_)));
    if sets_reason && !status.is_some_and(|s| s.is_terminated()) {
        return Err(TransitionError::ReasonRequiresTermination);
    }
    Ok(())
}

pub async fn create_deal(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(patch): Json<DealPatch>,
) -> Result<(StatusCode, Json<Deal>), AppError> {
    let referral_id = ReferralId::new(id);
    let referral = load_referral(&state, &referral_id).await?;

    check_reason(None, &patch)?;
    let patch = state.machine.guard_patch(None, &referral, patch)?;
    let deal = state.repo.insert_deal(&referral_id, &patch).await?;

    info!(referral_id = %referral_id, deal_id = ?deal.id, status = %deal.status, "Deal created");
    Ok((StatusCode::CREATED, Json(deal)))
}

pub async fn patch_deal(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(patch): Json<DealPatch>,
) -> Result<Json<Deal>, AppError> {
    let deal_id = DealId::new(id);
    let current = state
        .repo
        .get_deal(&deal_id)
        .await?
        .map(|raw| normalize_one(&raw))
        .ok_or_else(|| AppError::NotFound(format!("Deal {} not found", deal_id)))?;

    check_reason(Some(&current), &patch)?;
    let referral_id = current
        .referral_id
        .clone()
        .ok_or_else(|| AppError::Internal(format!("Deal {} has no referral", deal_id)))?;
    let referral = load_referral(&state, &referral_id).await?;
    let patch = state.machine.guard_patch(Some(&current), &referral, patch)?;
    let raw = state
        .repo
        .update_deal_fields(&deal_id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Deal {} not found", deal_id)))?;
    let deal = normalize_one(&raw);

    info!(deal_id = %deal_id, from = %current.status, to = %deal.status, "Deal updated");
    Ok(Json(deal))
}

pub async fn delete_deal(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, AppError> {
    let deal_id = DealId::new(id);
    if !state.repo.delete_deal_row(&deal_id).await? {
        return Err(AppError::NotFound(format!("Deal {} not found", deal_id)));
    }
    info!(deal_id = %deal_id, "Deal deleted");
    Ok(StatusCode::NO_CONTENT)
}
