//! Domain types for the referral deal ledger.
//!
//! This module provides:
//! - Integer money types (cents, basis points) with lossless input parsing
//! - Identifiers and the buy/sell side
//! - Canonical, raw and partial-update deal shapes
//! - Referrals, their pipeline status and contract terms

pub mod deal;
pub mod money;
pub mod primitives;
pub mod referral;

pub use deal::{AgentAttribution, Deal, DealPatch, DealStatus, RawDeal, TerminatedReason};
pub use money::{BasisPoints, Cents, MoneyError};
pub use primitives::{DealId, ReferralId, Side};
pub use referral::{
    AgentBucket, ContractDetails, ContractError, ContractTerms, Referral, ReferralStatus,
    ValidatedContract,
};
