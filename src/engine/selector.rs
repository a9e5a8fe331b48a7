//! Active-deal selection across the deal attempts of one referral.

use crate::domain::{Deal, DealId, DealStatus};
use std::collections::HashMap;

/// Status of a deal after applying any local override.
pub fn effective_status(deal: &Deal, overrides: &HashMap<DealId, DealStatus>) -> DealStatus {
    deal.id
        .as_ref()
        .and_then(|id| overrides.get(id))
        .copied()
        .unwrap_or(deal.status)
}

/// Id of the active deal: the first deal, in recency order, whose effective
/// status is not `terminated`.
///
/// `deals` must already be ordered most recent first (see
/// [`crate::engine::normalizer::normalize`]). Deals without an id are never
/// active. Returns `None` when every deal is terminated or there are none.
pub fn select_active<'a>(
    deals: &'a [Deal],
    overrides: &HashMap<DealId, DealStatus>,
) -> Option<&'a DealId> {
    deals
        .iter()
        .filter(|deal| !effective_status(deal, overrides).is_terminated())
        .find_map(|deal| deal.id.as_ref())
}

/// Deal to show in a summary: the active deal, else the most recent one.
///
/// The fallback is for display only; amounts due must come from
/// [`select_active`].
pub fn display_deal<'a>(
    deals: &'a [Deal],
    overrides: &HashMap<DealId, DealStatus>,
) -> Option<&'a Deal> {
    select_active(deals, overrides)
        .and_then(|id| deals.iter().find(|d| d.id.as_ref() == Some(id)))
        .or_else(|| deals.first())
}
