//! REST client for a remote deal service.

use super::{DealStore, StoreError};
use crate::api::referrals::{
    PreApprovalRequest, PreApprovalResponse, ReferralStatusRequest, ReferralStatusResponse,
};
use crate::domain::{ContractDetails, DealId, DealPatch, RawDeal, ReferralId, ReferralStatus};
use crate::engine::normalizer::parse_raw_deals;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Deal store backed by the HTTP API served by [`crate::api`].
///
/// Reads retry transient failures with exponential backoff. Writes are sent
/// once; a failed write is reported to the caller, which rolls back.
#[derive(Debug, Clone)]
pub struct HttpDealStore {
    client: Client,
    base_url: String,
}

impl HttpDealStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_with_retry(&self, url: &str) -> Result<serde_json::Value, StoreError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(StoreError::Network(e.to_string())))?;

            let response = check_status(response).await.map_err(|e| {
                if e.is_transient() {
                    warn!(url = %url, error = %e, "Transient store error, retrying");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })?;

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(StoreError::Parse(e.to_string())))
        })
        .await
    }

    async fn send_once<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    /// Advance a referral's own pipeline status.
    ///
    /// `contract` is required when moving to `under_contract`; the response
    /// carries the referral fee computed by the server.
    pub async fn advance_referral_status(
        &self,
        referral_id: &ReferralId,
        status: ReferralStatus,
        contract: Option<ContractDetails>,
    ) -> Result<ReferralStatusResponse, StoreError> {
        let url = self.url(&format!("/v1/referrals/{}/status", referral_id));
        debug!(referral_id = %referral_id, status = %status, "Advancing referral status");
        self.send_once(
            self.client
                .post(url)
                .json(&ReferralStatusRequest { status, contract }),
        )
        .await
    }

    /// Record a pre-approval amount (in dollars) and get the flat-rate fee.
    pub async fn submit_pre_approval(
        &self,
        referral_id: &ReferralId,
        amount: &str,
    ) -> Result<PreApprovalResponse, StoreError> {
        let url = self.url(&format!("/v1/referrals/{}/pre-approval", referral_id));
        self.send_once(self.client.post(url).json(&PreApprovalRequest {
            amount: amount.to_string(),
        }))
        .await
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.as_u16() == 429 {
        return Err(StoreError::RateLimited);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());

    if status.as_u16() == 404 {
        return Err(StoreError::NotFound(message));
    }
    Err(StoreError::Http {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl DealStore for HttpDealStore {
    async fn list_deals(&self, referral_id: &ReferralId) -> Result<Vec<RawDeal>, StoreError> {
        let url = self.url(&format!("/v1/referrals/{}/deals", referral_id));
        debug!(referral_id = %referral_id, "Fetching deals");
        let body = self.get_with_retry(&url).await?;
        Ok(parse_raw_deals(body.get("deals")))
    }

    async fn create_deal(
        &self,
        referral_id: &ReferralId,
        patch: &DealPatch,
    ) -> Result<RawDeal, StoreError> {
        let url = self.url(&format!("/v1/referrals/{}/deals", referral_id));
        self.send_once(self.client.post(url).json(patch)).await
    }

    async fn update_deal(
        &self,
        deal_id: &DealId,
        patch: &DealPatch,
    ) -> Result<RawDeal, StoreError> {
        let url = self.url(&format!("/v1/deals/{}", deal_id));
        self.send_once(self.client.patch(url).json(patch)).await
    }

    async fn delete_deal(&self, deal_id: &DealId) -> Result<(), StoreError> {
        let url = self.url(&format!("/v1/deals/{}", deal_id));
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check_status(response).await.map(|_| ())
    }
}
