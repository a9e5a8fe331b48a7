use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::info;

use crate::api::AppState;
use crate::domain::money::numeric_text;
use crate::domain::{
    AgentBucket, BasisPoints, Cents, ContractDetails, Referral, ReferralId, ReferralStatus, Side,
};
use crate::engine::{derive_from_terms, pre_approval_fee};
use crate::error::AppError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferralRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub property_address: Option<String>,
    #[serde(default)]
    pub looking_in_zip: Option<String>,
    #[serde(default)]
    pub agent_bucket: Option<String>,
    #[serde(default)]
    pub preferred_side: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStatusRequest {
    pub status: ReferralStatus,
    /// Required when `status` is `under_contract`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<ContractDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStatusResponse {
    pub referral: Referral,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_fee_due_cents: Option<Cents>,
    /// Formatted fee, e.g. "$2,250.00".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_fee_due: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreApprovalRequest {
    /// Amount in dollars.
    #[serde(deserialize_with = "numeric_text")]
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreApprovalResponse {
    pub referral_id: ReferralId,
    pub pre_approval_amount_cents: Cents,
    pub rate_basis_points: BasisPoints,
    pub fee_cents: Cents,
    pub fee: String,
}

pub async fn create_referral(
    State(state): State<AppState>,
    Json(request): Json<CreateReferralRequest>,
) -> Result<(StatusCode, Json<Referral>), AppError> {
    let id = match request.id.as_deref().map(str::trim) {
        Some("") => return Err(AppError::BadRequest("id must not be empty".into())),
        Some(id) => ReferralId::new(id),
        None => ReferralId::generate(),
    };

    let mut referral = Referral::new(id);
    referral.property_address = request.property_address;
    referral.looking_in_zip = request.looking_in_zip;
    referral.agent_bucket = request
        .agent_bucket
        .as_deref()
        .map(AgentBucket::from_str)
        .transpose()
        .map_err(|_| {
            AppError::BadRequest("agentBucket must be in_house or preferred_partner".into())
        })?;
    referral.preferred_side = request
        .preferred_side
        .as_deref()
        .map(Side::from_str)
        .transpose()
        .map_err(|_| AppError::BadRequest("preferredSide must be buy or sell".into()))?;

    if state.repo.get_referral(&referral.id).await?.is_some() {
        return Err(AppError::BadRequest(format!(
            "Referral {} already exists",
            referral.id
        )));
    }
    state.repo.insert_referral(&referral).await?;

    info!(referral_id = %referral.id, "Referral created");
    Ok((StatusCode::CREATED, Json(referral)))
}

pub async fn get_referral(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Referral>, AppError> {
    let id = ReferralId::new(id);
    let referral = load_referral(&state, &id).await?;
    Ok(Json(referral))
}

pub(crate) async fn load_referral(state: &AppState, id: &ReferralId) -> Result<Referral, AppError> {
    state
        .repo
        .get_referral(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Referral {} not found", id)))
}

/// Advance a referral's pipeline status. Moving under contract requires a
/// contract bundle and returns the referral fee it implies.
pub async fn advance_referral_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<ReferralStatusRequest>,
) -> Result<Json<ReferralStatusResponse>, AppError> {
    let id = ReferralId::new(id);
    load_referral(&state, &id).await?;

    let fee = if request.status == ReferralStatus::UnderContract {
        let details = request.contract.as_ref().ok_or_else(|| {
            AppError::BadRequest(
                "Contract details are required to move a referral under contract".into(),
            )
        })?;
        let contract = details.validate()?;
        let fee = derive_from_terms(&contract.terms);
        state.repo.apply_contract(&id, &contract, fee).await?;
        info!(
            referral_id = %id,
            fee_cents = fee.map(|c| c.as_i64()).unwrap_or_default(),
            "Referral under contract"
        );
        fee
    } else {
        state.repo.update_referral_status(&id, request.status).await?;
        info!(referral_id = %id, status = %request.status, "Referral status updated");
        None
    };

    let referral = load_referral(&state, &id).await?;
    Ok(Json(ReferralStatusResponse {
        referral,
        referral_fee_due_cents: fee,
        referral_fee_due: fee.map(|c| c.to_string()),
    }))
}

/// Record a pre-approval and quote the flat-rate fee on it.
pub async fn submit_pre_approval(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<PreApprovalRequest>,
) -> Result<Json<PreApprovalResponse>, AppError> {
    let id = ReferralId::new(id);
    load_referral(&state, &id).await?;

    let amount = Cents::from_dollars(&request.amount)?;
    let rate = state.config.pre_approval_fee_rate;
    let fee = pre_approval_fee(amount, rate).unwrap_or(Cents::ZERO);
    state.repo.record_pre_approval(&id, amount).await?;

    info!(referral_id = %id, amount_cents = amount.as_i64(), fee_cents = fee.as_i64(), "Pre-approval recorded");
    Ok(Json(PreApprovalResponse {
        referral_id: id,
        pre_approval_amount_cents: amount,
        rate_basis_points: rate,
        fee_cents: fee,
        fee: fee.to_string(),
    }))
}
