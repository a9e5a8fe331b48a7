//! Domain primitives: DealId, ReferralId, Side.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Opaque identifier of a persisted deal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub String);

impl DealId {
    /// Create a DealId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        DealId(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        DealId(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a referral.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferralId(pub String);

impl ReferralId {
    /// Create a ReferralId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        ReferralId(id.into())
    }

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        ReferralId(uuid::Uuid::new_v4().to_string())
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction side a client is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Client is buying.
    Buy,
    /// Client is selling.
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl FromStr for Side {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "buyer" => Ok(Side::Buy),
            "sell" | "seller" => Ok(Side::Sell),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_serialization() {
        let json = serde_json::to_string(&Side::Buy).unwrap();
        assert_eq!(json, "\"buy\"");

        let json = serde_json::to_string(&Side::Sell).unwrap();
        assert_eq!(json, "\"sell\"");
    }

    #[test]
    fn test_side_parse_accepts_legacy_spellings() {
        assert_eq!(Side::from_str("Buyer"), Ok(Side::Buy));
        assert_eq!(Side::from_str(" sell "), Ok(Side::Sell));
        assert!(Side::from_str("lease").is_err());
    }

    #[test]
    fn test_deal_id_display() {
        let id = DealId::new("deal-1");
        assert_eq!(id.to_string(), "deal-1");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(DealId::generate(), DealId::generate());
        assert_ne!(ReferralId::generate(), ReferralId::generate());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = ReferralId::new("ref-9");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ref-9\"");
    }
}
