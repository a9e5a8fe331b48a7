//! Deal records: canonical, raw (wire/legacy) and partial-update shapes.

use crate::domain::money::{explicit_null, lenient_i64};
use crate::domain::{BasisPoints, Cents, DealId, ReferralId, Side};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    UnderContract,
    PastInspection,
    PastAppraisal,
    ClearToClose,
    Closed,
    PaymentSent,
    Paid,
    Terminated,
}

impl DealStatus {
    /// Every status, in pipeline display order.
    pub const ALL: [DealStatus; 8] = [
        DealStatus::UnderContract,
        DealStatus::PastInspection,
        DealStatus::PastAppraisal,
        DealStatus::ClearToClose,
        DealStatus::Closed,
        DealStatus::PaymentSent,
        DealStatus::Paid,
        DealStatus::Terminated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::UnderContract => "under_contract",
            DealStatus::PastInspection => "past_inspection",
            DealStatus::PastAppraisal => "past_appraisal",
            DealStatus::ClearToClose => "clear_to_close",
            DealStatus::Closed => "closed",
            DealStatus::PaymentSent => "payment_sent",
            DealStatus::Paid => "paid",
            DealStatus::Terminated => "terminated",
        }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, DealStatus::Terminated)
    }
}

impl FromStr for DealStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        DealStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == key)
            .ok_or(())
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a deal fell through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatedReason {
    Inspection,
    Appraisal,
    Financing,
    ChangedMind,
}

impl TerminatedReason {
    pub const ALL: [TerminatedReason; 4] = [
        TerminatedReason::Inspection,
        TerminatedReason::Appraisal,
        TerminatedReason::Financing,
        TerminatedReason::ChangedMind,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TerminatedReason::Inspection => "inspection",
            TerminatedReason::Appraisal => "appraisal",
            TerminatedReason::Financing => "financing",
            TerminatedReason::ChangedMind => "changed_mind",
        }
    }
}

impl FromStr for TerminatedReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        TerminatedReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == key)
            .ok_or(())
    }
}

impl fmt::Display for TerminatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which channel actually closed the deal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentAttribution {
    /// Not tracked for this deal.
    #[default]
    #[serde(rename = "")]
    NotUsed,
    InHouse,
    PreferredPartner,
    /// Closed by an outside agent; the referral was lost to the network.
    OutsideAgent,
}

impl AgentAttribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentAttribution::NotUsed => "",
            AgentAttribution::InHouse => "in_house",
            AgentAttribution::PreferredPartner => "preferred_partner",
            AgentAttribution::OutsideAgent => "outside_agent",
        }
    }
}

impl FromStr for AgentAttribution {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "" | "none" | "not_used" => Ok(AgentAttribution::NotUsed),
            "in_house" => Ok(AgentAttribution::InHouse),
            "preferred_partner" => Ok(AgentAttribution::PreferredPartner),
            "outside_agent" | "lost" => Ok(AgentAttribution::OutsideAgent),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AgentAttribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical deal record. Every field is populated; see
/// [`crate::engine::normalizer`] for how raw records are filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    /// `None` until the first successful write.
    pub id: Option<DealId>,
    pub referral_id: Option<ReferralId>,
    pub status: DealStatus,
    pub expected_amount_cents: Cents,
    pub received_amount_cents: Cents,
    pub contract_price_cents: Option<Cents>,
    pub commission_basis_points: Option<BasisPoints>,
    pub referral_fee_basis_points: Option<BasisPoints>,
    pub terminated_reason: Option<TerminatedReason>,
    pub agent_attribution: AgentAttribution,
    pub used_afc: bool,
    pub side: Option<Side>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deal record as it arrives from a store: any field may be missing, and
/// both snake_case and camelCase keys are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeal {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "_id")]
    pub id: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "referral_id"
    )]
    pub referral_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "expected_amount_cents",
        alias = "expectedAmount",
        deserialize_with = "lenient_i64"
    )]
    pub expected_amount_cents: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "received_amount_cents",
        alias = "receivedAmount",
        deserialize_with = "lenient_i64"
    )]
    pub received_amount_cents: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "contract_price_cents",
        deserialize_with = "lenient_i64"
    )]
    pub contract_price_cents: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "commission_basis_points",
        alias = "commissionBps",
        deserialize_with = "lenient_i64"
    )]
    pub commission_basis_points: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "referral_fee_basis_points",
        alias = "referralFeeBps",
        deserialize_with = "lenient_i64"
    )]
    pub referral_fee_basis_points: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "terminated_reason"
    )]
    pub terminated_reason: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "agent_attribution"
    )]
    pub agent_attribution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "used_afc")]
    pub used_afc: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "created_at")]
    pub created_at: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "updated_at")]
    pub updated_at: Option<serde_json::Value>,
}

impl From<&Deal> for RawDeal {
    fn from(deal: &Deal) -> Self {
        RawDeal {
            id: deal.id.as_ref().map(|id| id.as_str().to_string()),
            referral_id: deal.referral_id.as_ref().map(|id| id.as_str().to_string()),
            status: Some(deal.status.as_str().to_string()),
            expected_amount_cents: Some(deal.expected_amount_cents.as_i64()),
            received_amount_cents: Some(deal.received_amount_cents.as_i64()),
            contract_price_cents: deal.contract_price_cents.map(|c| c.as_i64()),
            commission_basis_points: deal.commission_basis_points.map(|b| b.as_i64()),
            referral_fee_basis_points: deal.referral_fee_basis_points.map(|b| b.as_i64()),
            terminated_reason: deal.terminated_reason.map(|r| r.as_str().to_string()),
            agent_attribution: Some(deal.agent_attribution.as_str().to_string()),
            used_afc: Some(deal.used_afc),
            side: deal.side.map(|s| s.as_str().to_string()),
            created_at: Some(timestamp_value(deal.created_at)),
            updated_at: Some(timestamp_value(deal.updated_at)),
        }
    }
}

fn timestamp_value(ts: DateTime<Utc>) -> serde_json::Value {
    serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// A partial set of deal fields to write. Only `Some` fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DealStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_amount_cents: Option<Cents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_amount_cents: Option<Cents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_price_cents: Option<Cents>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_basis_points: Option<BasisPoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral_fee_basis_points: Option<BasisPoints>,
    /// `Some(None)` clears the reason.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub terminated_reason: Option<Option<TerminatedReason>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_attribution: Option<AgentAttribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_afc: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

impl DealPatch {
    pub fn is_empty(&self) -> bool {
        *self == DealPatch::default()
    }

    /// Apply the patch to a canonical deal in place.
    pub fn apply_to(&self, deal: &mut Deal) {
        if let Some(status) = self.status {
            deal.status = status;
        }
        if let Some(amount) = self.expected_amount_cents {
            deal.expected_amount_cents = amount;
        }
        if let Some(amount) = self.received_amount_cents {
            deal.received_amount_cents = amount;
        }
        if let Some(price) = self.contract_price_cents {
            deal.contract_price_cents = Some(price);
        }
        if let Some(bp) = self.commission_basis_points {
            deal.commission_basis_points = Some(bp);
        }
        if let Some(bp) = self.referral_fee_basis_points {
            deal.referral_fee_basis_points = Some(bp);
        }
        if let Some(reason) = self.terminated_reason {
            deal.terminated_reason = reason;
        }
        if let Some(attribution) = self.agent_attribution {
            deal.agent_attribution = attribution;
        }
        if let Some(used_afc) = self.used_afc {
            deal.used_afc = used_afc;
        }
        if let Some(side) = self.side {
            deal.side = Some(side);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_accepts_loose_spellings() {
        assert_eq!(
            DealStatus::from_str("Clear to Close"),
            Ok(DealStatus::ClearToClose)
        );
        assert_eq!(
            DealStatus::from_str("payment-sent"),
            Ok(DealStatus::PaymentSent)
        );
        assert!(DealStatus::from_str("pending").is_err());
    }

    #[test]
    fn test_attribution_not_used_serializes_as_empty_string() {
        let json = serde_json::to_string(&AgentAttribution::NotUsed).unwrap();
        assert_eq!(json, "\"\"");
        let parsed: AgentAttribution = serde_json::from_str("\"outside_agent\"").unwrap();
        assert_eq!(parsed, AgentAttribution::OutsideAgent);
    }

    #[test]
    fn test_raw_deal_accepts_snake_and_camel_case() {
        let snake: RawDeal = serde_json::from_value(serde_json::json!({
            "id": "d1",
            "expected_amount_cents": 1200,
            "terminated_reason": "financing",
            "used_afc": true
        }))
        .unwrap();
        let camel: RawDeal = serde_json::from_value(serde_json::json!({
            "id": "d1",
            "expectedAmountCents": "1200",
            "terminatedReason": "financing",
            "usedAfc": true
        }))
        .unwrap();
        assert_eq!(snake, camel);
        assert_eq!(snake.expected_amount_cents, Some(1200));
    }

    #[test]
    fn test_patch_serializes_only_changed_fields() {
        let patch = DealPatch {
            status: Some(DealStatus::Closed),
            expected_amount_cents: Some(Cents(225_000)),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "closed", "expectedAmountCents": 225000})
        );
    }

    #[test]
    fn test_patch_distinguishes_cleared_reason_from_absent() {
        let cleared: DealPatch =
            serde_json::from_value(serde_json::json!({"terminatedReason": null})).unwrap();
        assert_eq!(cleared.terminated_reason, Some(None));

        let absent: DealPatch = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(absent.terminated_reason, None);
        assert!(absent.is_empty());

        let json = serde_json::to_value(&cleared).unwrap();
        assert_eq!(json, serde_json::json!({"terminatedReason": null}));
    }
}
