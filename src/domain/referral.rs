//! Referrals and the contract terms attached to them.

use crate::domain::money::{numeric_text, MoneyError};
use crate::domain::{BasisPoints, Cents, ReferralId, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Partner channel a referral is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentBucket {
    InHouse,
    PreferredPartner,
}

impl AgentBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentBucket::InHouse => "in_house",
            AgentBucket::PreferredPartner => "preferred_partner",
        }
    }
}

impl FromStr for AgentBucket {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "in_house" => Ok(AgentBucket::InHouse),
            "preferred_partner" => Ok(AgentBucket::PreferredPartner),
            _ => Err(()),
        }
    }
}

/// Pipeline status of the referral itself (distinct from deal status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    New,
    Contacted,
    PreApproved,
    UnderContract,
    Closed,
    Lost,
}

impl ReferralStatus {
    pub const ALL: [ReferralStatus; 6] = [
        ReferralStatus::New,
        ReferralStatus::Contacted,
        ReferralStatus::PreApproved,
        ReferralStatus::UnderContract,
        ReferralStatus::Closed,
        ReferralStatus::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::New => "new",
            ReferralStatus::Contacted => "contacted",
            ReferralStatus::PreApproved => "pre_approved",
            ReferralStatus::UnderContract => "under_contract",
            ReferralStatus::Closed => "closed",
            ReferralStatus::Lost => "lost",
        }
    }
}

impl FromStr for ReferralStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        ReferralStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == key)
            .ok_or(())
    }
}

impl fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Contract pricing inputs. Each leg is optional so terms can be merged
/// field by field from several sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractTerms {
    #[serde(default)]
    pub contract_price_cents: Option<Cents>,
    #[serde(default)]
    pub commission_basis_points: Option<BasisPoints>,
    #[serde(default)]
    pub referral_fee_basis_points: Option<BasisPoints>,
}

impl ContractTerms {
    pub fn new(price: Cents, commission: BasisPoints, referral_fee: BasisPoints) -> Self {
        ContractTerms {
            contract_price_cents: Some(price),
            commission_basis_points: Some(commission),
            referral_fee_basis_points: Some(referral_fee),
        }
    }

    /// Fill each missing leg from `fallback`.
    pub fn or(self, fallback: ContractTerms) -> ContractTerms {
        ContractTerms {
            contract_price_cents: self.contract_price_cents.or(fallback.contract_price_cents),
            commission_basis_points: self
                .commission_basis_points
                .or(fallback.commission_basis_points),
            referral_fee_basis_points: self
                .referral_fee_basis_points
                .or(fallback.referral_fee_basis_points),
        }
    }
}

/// A brokered referral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    pub id: ReferralId,
    pub property_address: Option<String>,
    /// Postal code the client is looking in when there is no address yet.
    pub looking_in_zip: Option<String>,
    pub agent_bucket: Option<AgentBucket>,
    pub preferred_side: Option<Side>,
    pub status: ReferralStatus,
    /// Referral-level contract defaults used when a deal carries no terms.
    pub contract: ContractTerms,
    /// Flat fee hint used when no terms are available anywhere.
    pub referral_fee_due_cents: Option<Cents>,
    pub pre_approval_amount_cents: Option<Cents>,
    pub created_at: DateTime<Utc>,
}

impl Referral {
    /// A fresh referral in the `new` status with no pricing.
    pub fn new(id: ReferralId) -> Self {
        Referral {
            id,
            property_address: None,
            looking_in_zip: None,
            agent_bucket: None,
            preferred_side: None,
            status: ReferralStatus::New,
            contract: ContractTerms::default(),
            referral_fee_due_cents: None,
            pre_approval_amount_cents: None,
            created_at: Utc::now(),
        }
    }

    /// Where the client is buying or selling: the address, else the postal code.
    pub fn location(&self) -> Option<&str> {
        self.property_address
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .or(self.looking_in_zip.as_deref())
    }
}

/// Contract bundle submitted with the `under_contract` referral transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDetails {
    pub address: String,
    /// Contract price in dollars.
    #[serde(deserialize_with = "numeric_text")]
    pub price: String,
    #[serde(deserialize_with = "numeric_text")]
    pub commission_percent: String,
    #[serde(deserialize_with = "numeric_text")]
    pub referral_fee_percent: String,
}

/// A contract bundle whose fields have all been checked and converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedContract {
    pub address: String,
    pub terms: ContractTerms,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("address is required")]
    MissingAddress,
    #[error("invalid contract price: {0}")]
    Price(MoneyError),
    #[error("invalid commission percentage: {0}")]
    Commission(MoneyError),
    #[error("invalid referral fee percentage: {0}")]
    ReferralFee(MoneyError),
}

impl ContractDetails {
    pub fn validate(&self) -> Result<ValidatedContract, ContractError> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(ContractError::MissingAddress);
        }
        let price = Cents::from_dollars(&self.price).map_err(ContractError::Price)?;
        let commission =
            BasisPoints::from_percent(&self.commission_percent).map_err(ContractError::Commission)?;
        let referral_fee = BasisPoints::from_percent(&self.referral_fee_percent)
            .map_err(ContractError::ReferralFee)?;
        Ok(ValidatedContract {
            address: address.to_string(),
            terms: ContractTerms::new(price, commission, referral_fee),
        })
    }
}
