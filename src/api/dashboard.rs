//! Portfolio-wide revenue and status summary.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::api::AppState;
use crate::domain::{Cents, Deal, DealStatus, ReferralId};
use crate::engine::normalizer::{normalize, sort_by_recency};
use crate::engine::select_active;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub deal_count: usize,
    /// Every deal status, including those with no deals.
    pub deals_by_status: BTreeMap<String, usize>,
    pub referrals_by_status: BTreeMap<String, i64>,
    pub active_deal_count: usize,
    pub realized_revenue_cents: Cents,
    pub realized_revenue: String,
    pub pipeline_revenue_cents: Cents,
    pub pipeline_revenue: String,
}

/// Aggregate deals across referrals.
///
/// Realized revenue sums paid deals (received amount, else expected).
/// Pipeline revenue sums the expected amount of each referral's active deal
/// that is not yet paid.
pub fn summarize(deals: &[Deal], referral_counts: &[(String, i64)]) -> DashboardSummary {
    let mut deals_by_status: BTreeMap<String, usize> = DealStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for deal in deals {
        *deals_by_status
            .entry(deal.status.as_str().to_string())
            .or_default() += 1;
    }

    let realized: i64 = deals
        .iter()
        .filter(|d| d.status == DealStatus::Paid)
        .map(|d| {
            if d.received_amount_cents.is_positive() {
                d.received_amount_cents.as_i64()
            } else {
                d.expected_amount_cents.as_i64()
            }
        })
        .fold(0i64, i64::saturating_add);

    let mut by_referral: HashMap<Option<&ReferralId>, Vec<Deal>> = HashMap::new();
    for deal in deals {
        by_referral
            .entry(deal.referral_id.as_ref())
            .or_default()
            .push(deal.clone());
    }

    let no_overrides = HashMap::new();
    let mut active_deal_count = 0;
    let mut pipeline: i64 = 0;
    for group in by_referral.values_mut() {
        sort_by_recency(group);
        let Some(active_id) = select_active(group.as_slice(), &no_overrides) else {
            continue;
        };
        let Some(active) = group.iter().find(|d| d.id.as_ref() == Some(active_id)) else {
            continue;
        };
        active_deal_count += 1;
        if active.status != DealStatus::Paid {
            pipeline = pipeline.saturating_add(active.expected_amount_cents.as_i64());
        }
    }

    DashboardSummary {
        deal_count: deals.len(),
        deals_by_status,
        referrals_by_status: referral_counts.iter().cloned().collect(),
        active_deal_count,
        realized_revenue_cents: Cents(realized),
        realized_revenue: Cents(realized).to_string(),
        pipeline_revenue_cents: Cents(pipeline),
        pipeline_revenue: Cents(pipeline).to_string(),
    }
}

pub async fn get_summary(State(state): State<AppState>) -> Result<Json<DashboardSummary>, AppError> {
    let (raw, referral_counts) = futures::try_join!(
        state.repo.list_all_deals(),
        state.repo.count_referrals_by_status()
    )?;
    let deals = normalize(&raw);
    Ok(Json(summarize(&deals, &referral_counts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DealId;
    use crate::engine::normalizer::normalize_one;
    use chrono::{TimeZone, Utc};

    fn deal(
        id: &str,
        referral: &str,
        status: DealStatus,
        expected: i64,
        received: i64,
        created_secs: i64,
    ) -> Deal {
        let mut deal = normalize_one(&Default::default());
        deal.id = Some(DealId::new(id));
        deal.referral_id = Some(ReferralId::new(referral));
        deal.status = status;
        deal.expected_amount_cents = Cents(expected);
        deal.received_amount_cents = Cents(received);
        deal.created_at = Utc.timestamp_opt(created_secs, 0).unwrap();
        deal
    }

    #[test]
    fn test_empty_summary_lists_every_status() {
        let summary = summarize(&[], &[]);
        assert_eq!(summary.deal_count, 0);
        assert_eq!(summary.deals_by_status.len(), 8);
        assert!(summary.deals_by_status.values().all(|c| *c == 0));
        assert_eq!(summary.realized_revenue, "$0.00");
    }

    #[test]
    fn test_revenue_split() {
        let deals = vec![
            // r1: newest attempt fell through, older one is paid.
            deal("a", "r1", DealStatus::Terminated, 0, 0, 300),
            deal("b", "r1", DealStatus::Paid, 225_000, 200_000, 200),
            // r2: active and in progress.
            deal("c", "r2", DealStatus::ClearToClose, 150_000, 0, 100),
            // r3: paid, nothing received yet.
            deal("d", "r3", DealStatus::Paid, 80_000, 0, 100),
        ];
        let summary = summarize(&deals, &[("new".to_string(), 2)]);

        assert_eq!(summary.realized_revenue_cents, Cents(280_000));
        assert_eq!(summary.pipeline_revenue_cents, Cents(150_000));
        assert_eq!(summary.pipeline_revenue, "$1,500.00");
        assert_eq!(summary.active_deal_count, 3);
        assert_eq!(summary.deals_by_status["paid"], 2);
        assert_eq!(summary.deals_by_status["terminated"], 1);
        assert_eq!(summary.referrals_by_status["new"], 2);
    }

    #[test]
    fn test_only_active_deal_counts_toward_pipeline() {
        let deals = vec![
            deal("new", "r1", DealStatus::UnderContract, 100_000, 0, 200),
            deal("old", "r1", DealStatus::Closed, 90_000, 0, 100),
        ];
        let summary = summarize(&deals, &[]);
        assert_eq!(summary.pipeline_revenue_cents, Cents(100_000));
        assert_eq!(summary.active_deal_count, 1);
    }
}
