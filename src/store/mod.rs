//! Persistence collaborator abstraction for deal records.

use crate::domain::{DealId, DealPatch, RawDeal, ReferralId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod mock;

pub use http::HttpDealStore;
pub use mock::{MockDealStore, StoreCall};

/// Remote store holding the authoritative deal records.
///
/// Implementations return records in whatever shape they hold them; callers
/// run them through [`crate::engine::normalizer`] before use.
#[async_trait]
pub trait DealStore: Send + Sync + fmt::Debug {
    /// Fetch every deal recorded against a referral.
    async fn list_deals(&self, referral_id: &ReferralId) -> Result<Vec<RawDeal>, StoreError>;

    /// Create a deal for a referral from an initial field set.
    ///
    /// # Returns
    /// The stored record, including its newly assigned id.
    async fn create_deal(
        &self,
        referral_id: &ReferralId,
        patch: &DealPatch,
    ) -> Result<RawDeal, StoreError>;

    /// Write only the fields present in `patch`.
    ///
    /// # Returns
    /// The full stored record after the update.
    async fn update_deal(&self, deal_id: &DealId, patch: &DealPatch)
        -> Result<RawDeal, StoreError>;

    /// Remove a deal permanently.
    async fn delete_deal(&self, deal_id: &DealId) -> Result<(), StoreError>;
}

/// Error type for store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Connection failure, timeout or DNS error.
    #[error("Network error: {0}")]
    Network(String),
    /// Non-success response from a remote store.
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    /// The response body could not be understood.
    #[error("Parse error: {0}")]
    Parse(String),
    /// The addressed record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Too many requests; retry later.
    #[error("Rate limited")]
    RateLimited,
    /// Local database failure.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) | StoreError::RateLimited => true,
            StoreError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            other => StoreError::Database(other.to_string()),
        }
    }
}
