//! In-memory deal store for tests, with call recording and failure injection.

use super::{DealStore, StoreError};
use crate::domain::{Deal, DealId, DealPatch, RawDeal, ReferralId};
use crate::engine::normalizer::normalize_one;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// A call received by [`MockDealStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(ReferralId),
    Create(ReferralId, DealPatch),
    Update(DealId, DealPatch),
    Delete(DealId),
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreCall::List(_))
    }
}

#[derive(Debug, Default)]
struct MockState {
    deals: Vec<Deal>,
    calls: Vec<StoreCall>,
    fail_writes: bool,
    next_id: u64,
}

/// Mock store holding canonical deals in memory.
#[derive(Debug, Default)]
pub struct MockDealStore {
    state: Mutex<MockState>,
    write_gate: Option<Arc<Notify>>,
}

impl MockDealStore {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a deal.
    pub fn with_deal(self, raw: RawDeal) -> Self {
        self.lock().deals.push(normalize_one(&raw));
        self
    }

    /// Seed several deals.
    pub fn with_deals(self, raws: Vec<RawDeal>) -> Self {
        raws.into_iter().fold(self, |store, raw| store.with_deal(raw))
    }

    /// Fail every write with a 500 until [`Self::set_fail_writes`] turns it off.
    pub fn failing_writes(self) -> Self {
        self.set_fail_writes(true);
        self
    }

    /// Hold each write until the gate is notified once.
    pub fn with_write_gate(mut self, gate: Arc<Notify>) -> Self {
        self.write_gate = Some(gate);
        self
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Number of create/update/delete calls received.
    pub fn write_count(&self) -> usize {
        self.lock().calls.iter().filter(|c| c.is_write()).count()
    }

    /// The stored copy of a deal.
    pub fn stored(&self, deal_id: &DealId) -> Option<Deal> {
        self.lock()
            .deals
            .iter()
            .find(|d| d.id.as_ref() == Some(deal_id))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a write, wait on the gate, then report whether it should fail.
    async fn begin_write(&self, call: StoreCall) -> Result<(), StoreError> {
        self.lock().calls.push(call);
        if let Some(gate) = &self.write_gate {
            gate.notified().await;
        }
        if self.lock().fail_writes {
            return Err(StoreError::Http {
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DealStore for MockDealStore {
    async fn list_deals(&self, referral_id: &ReferralId) -> Result<Vec<RawDeal>, StoreError> {
        let mut state = self.lock();
        state.calls.push(StoreCall::List(referral_id.clone()));
        Ok(state
            .deals
            .iter()
            .filter(|d| d.referral_id.is_none() || d.referral_id.as_ref() == Some(referral_id))
            .map(RawDeal::from)
            .collect())
    }

    async fn create_deal(
        &self,
        referral_id: &ReferralId,
        patch: &DealPatch,
    ) -> Result<RawDeal, StoreError> {
        self.begin_write(StoreCall::Create(referral_id.clone(), patch.clone()))
            .await?;

        let mut state = self.lock();
        state.next_id += 1;
        let mut deal = normalize_one(&RawDeal::default());
        deal.id = Some(DealId::new(format!("mock-{}", state.next_id)));
        deal.referral_id = Some(referral_id.clone());
        deal.created_at = Utc::now();
        deal.updated_at = deal.created_at;
        patch.apply_to(&mut deal);
        state.deals.push(deal.clone());
        Ok(RawDeal::from(&deal))
    }

    async fn update_deal(
        &self,
        deal_id: &DealId,
        patch: &DealPatch,
    ) -> Result<RawDeal, StoreError> {
        self.begin_write(StoreCall::Update(deal_id.clone(), patch.clone()))
            .await?;

        let mut state = self.lock();
        let deal = state
            .deals
            .iter_mut()
            .find(|d| d.id.as_ref() == Some(deal_id))
            .ok_or_else(|| StoreError::NotFound(deal_id.to_string()))?;
        patch.apply_to(deal);
        deal.updated_at = Utc::now();
        Ok(RawDeal::from(&*deal))
    }

    async fn delete_deal(&self, deal_id: &DealId) -> Result<(), StoreError> {
        self.begin_write(StoreCall::Delete(deal_id.clone())).await?;

        let mut state = self.lock();
        let before = state.deals.len();
        state.deals.retain(|d| d.id.as_ref() != Some(deal_id));
        if state.deals.len() == before {
            return Err(StoreError::NotFound(deal_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DealStatus;

    fn seeded() -> MockDealStore {
        MockDealStore::new().with_deal(RawDeal {
            id: Some("d1".to_string()),
            referral_id: Some("r1".to_string()),
            status: Some("closed".to_string()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_mock_update_applies_patch() {
        let store = seeded();
        let patch = DealPatch {
            status: Some(DealStatus::Paid),
            ..Default::default()
        };
        let raw = store.update_deal(&DealId::new("d1"), &patch).await.unwrap();
        assert_eq!(raw.status.as_deref(), Some("paid"));
        assert_eq!(
            store.stored(&DealId::new("d1")).unwrap().status,
            DealStatus::Paid
        );
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failing_writes_leave_data_untouched() {
        let store = seeded().failing_writes();
        let patch = DealPatch {
            status: Some(DealStatus::Paid),
            ..Default::default()
        };
        let result = store.update_deal(&DealId::new("d1"), &patch).await;
        assert!(matches!(result, Err(StoreError::Http { status: 500, .. })));
        assert_eq!(
            store.stored(&DealId::new("d1")).unwrap().status,
            DealStatus::Closed
        );
    }

    #[tokio::test]
    async fn test_mock_create_assigns_id() {
        let store = MockDealStore::new();
        let raw = store
            .create_deal(&ReferralId::new("r1"), &DealPatch::default())
            .await
            .unwrap();
        assert_eq!(raw.id.as_deref(), Some("mock-1"));
        assert_eq!(raw.referral_id.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_mock_list_filters_by_referral() {
        let store = seeded();
        assert_eq!(
            store.list_deals(&ReferralId::new("r1")).await.unwrap().len(),
            1
        );
        assert!(store
            .list_deals(&ReferralId::new("r2"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_delete_missing_is_not_found() {
        let store = seeded();
        let result = store.delete_deal(&DealId::new("nope")).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
