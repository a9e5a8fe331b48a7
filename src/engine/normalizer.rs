//! Raw deal records -> canonical, recency-ordered deals.

use crate::domain::{
    AgentAttribution, BasisPoints, Cents, Deal, DealId, DealStatus, RawDeal, ReferralId, Side,
    TerminatedReason,
};
use chrono::{DateTime, TimeZone, Utc};
use std::str::FromStr;
use tracing::warn;

/// Parse a store response into raw deals.
///
/// A missing or non-array value yields an empty list. Elements that are not
/// deal-shaped are skipped.
pub fn parse_raw_deals(value: Option<&serde_json::Value>) -> Vec<RawDeal> {
    let Some(items) = value.and_then(|v| v.as_array()) else {
        if value.is_some_and(|v| !v.is_null()) {
            warn!("Expected an array of deals, ignoring payload");
        }
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<RawDeal>(item.clone()) {
            Ok(raw) => Some(raw),
            Err(e) => {
                warn!(error = %e, "Skipping malformed deal record");
                None
            }
        })
        .collect()
}

/// Normalize raw deals into canonical records, most recent first.
pub fn normalize(raw: &[RawDeal]) -> Vec<Deal> {
    let mut deals: Vec<Deal> = raw.iter().map(normalize_one).collect();
    sort_by_recency(&mut deals);
    deals
}

/// Normalize a JSON payload straight into canonical deals.
pub fn normalize_value(value: Option<&serde_json::Value>) -> Vec<Deal> {
    normalize(&parse_raw_deals(value))
}

/// Stable sort, newest `created_at` first.
pub fn sort_by_recency(deals: &mut [Deal]) {
    deals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Fill every field of a single raw record with an explicit value.
pub fn normalize_one(raw: &RawDeal) -> Deal {
    let status = match raw.status.as_deref() {
        None => DealStatus::UnderContract,
        Some(s) => DealStatus::from_str(s).unwrap_or_else(|_| {
            warn!(deal_id = ?raw.id, status = %s, "Unknown deal status, defaulting to under_contract");
            DealStatus::UnderContract
        }),
    };

    let terminated_reason = if status.is_terminated() {
        raw.terminated_reason
            .as_deref()
            .and_then(|s| TerminatedReason::from_str(s).ok())
    } else {
        None
    };

    let expected_amount_cents = if status.is_terminated() {
        Cents::ZERO
    } else {
        non_negative(raw.expected_amount_cents)
    };

    let agent_attribution = raw
        .agent_attribution
        .as_deref()
        .map(|s| {
            AgentAttribution::from_str(s).unwrap_or_else(|_| {
                warn!(deal_id = ?raw.id, attribution = %s, "Unknown agent attribution, ignoring");
                AgentAttribution::NotUsed
            })
        })
        .unwrap_or_default();

    let created_at = raw
        .created_at
        .as_ref()
        .and_then(parse_timestamp)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let updated_at = raw
        .updated_at
        .as_ref()
        .and_then(parse_timestamp)
        .unwrap_or(created_at);

    Deal {
        id: raw
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(DealId::new),
        referral_id: raw
            .referral_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ReferralId::new),
        status,
        expected_amount_cents,
        received_amount_cents: non_negative(raw.received_amount_cents),
        contract_price_cents: raw.contract_price_cents.map(Cents::new),
        commission_basis_points: raw.commission_basis_points.map(BasisPoints::new),
        referral_fee_basis_points: raw.referral_fee_basis_points.map(BasisPoints::new),
        terminated_reason,
        agent_attribution,
        used_afc: raw.used_afc.unwrap_or(false),
        side: raw.side.as_deref().and_then(|s| Side::from_str(s).ok()),
        created_at,
        updated_at,
    }
}

fn non_negative(value: Option<i64>) -> Cents {
    Cents::new(value.unwrap_or(0).max(0))
}

/// Timestamps arrive as RFC 3339 strings or epoch milliseconds.
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<i64>().ok().and_then(from_millis)),
        serde_json::Value::Number(n) => n.as_i64().and_then(from_millis),
        _ => None,
    }
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
