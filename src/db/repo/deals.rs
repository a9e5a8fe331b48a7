//! Deal operations for the repository.

use crate::domain::{Deal, DealId, DealPatch, RawDeal, ReferralId};
use crate::engine::normalizer::normalize_one;
use crate::store::{DealStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};
use tracing::debug;

use super::{timestamp, Repository};

const DEAL_COLUMNS: &str = r#"
    id, referral_id, status, expected_amount_cents, received_amount_cents,
    contract_price_cents, commission_basis_points, referral_fee_basis_points,
    terminated_reason, agent_attribution, used_afc, side, created_at, updated_at
"#;

impl Repository {
    /// Deals recorded against a referral, most recent first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_deals_for(
        &self,
        referral_id: &ReferralId,
    ) -> Result<Vec<RawDeal>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM deals WHERE referral_id = ? ORDER BY created_at DESC, id ASC",
            DEAL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(referral_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_raw_deal).collect())
    }

    /// Every stored deal, for dashboard aggregation.
    pub async fn list_all_deals(&self) -> Result<Vec<RawDeal>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM deals ORDER BY referral_id ASC, created_at DESC, id ASC",
            DEAL_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_raw_deal).collect())
    }

    /// Fetch a deal by id.
    ///
    /// Returns None if the deal does not exist.
    pub async fn get_deal(&self, deal_id: &DealId) -> Result<Option<RawDeal>, sqlx::Error> {
        let sql = format!("SELECT {} FROM deals WHERE id = ?", DEAL_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(deal_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_raw_deal))
    }

    /// Insert a new deal for a referral, built from `patch` over the deal
    /// defaults. A fresh id and timestamps are assigned.
    ///
    /// Returns the record as stored, read back from the table.
    ///
    /// # Errors
    /// Returns an error if the insert fails (e.g. the referral is missing).
    pub async fn insert_deal(
        &self,
        referral_id: &ReferralId,
        patch: &DealPatch,
    ) -> Result<Deal, sqlx::Error> {
        let now = Utc::now();
        let mut deal = normalize_one(&RawDeal::default());
        deal.id = Some(DealId::generate());
        deal.referral_id = Some(referral_id.clone());
        deal.created_at = now;
        deal.updated_at = now;
        patch.apply_to(&mut deal);

        sqlx::query(
            r#"
            INSERT INTO deals (
                id, referral_id, status, expected_amount_cents, received_amount_cents,
                contract_price_cents, commission_basis_points, referral_fee_basis_points,
                terminated_reason, agent_attribution, used_afc, side, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(deal.id.as_ref().map(|id| id.as_str()))
        .bind(referral_id.as_str())
        .bind(deal.status.as_str())
        .bind(deal.expected_amount_cents.as_i64())
        .bind(deal.received_amount_cents.as_i64())
        .bind(deal.contract_price_cents.map(|c| c.as_i64()))
        .bind(deal.commission_basis_points.map(|b| b.as_i64()))
        .bind(deal.referral_fee_basis_points.map(|b| b.as_i64()))
        .bind(deal.terminated_reason.map(|r| r.as_str()))
        .bind(deal.agent_attribution.as_str())
        .bind(deal.used_afc)
        .bind(deal.side.map(|s| s.as_str()))
        .bind(timestamp(deal.created_at))
        .bind(timestamp(deal.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(referral_id = %referral_id, deal_id = ?deal.id, status = %deal.status, "Deal inserted");

        let Some(id) = deal.id.as_ref() else {
            return Err(sqlx::Error::RowNotFound);
        };
        self.get_deal(id)
            .await?
            .map(|raw| normalize_one(&raw))
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Write only the fields present in `patch` and bump `updated_at`.
    ///
    /// Returns the stored record, or None if the deal does not exist.
    pub async fn update_deal_fields(
        &self,
        deal_id: &DealId,
        patch: &DealPatch,
    ) -> Result<Option<RawDeal>, sqlx::Error> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE deals SET updated_at = ");
        query.push_bind(timestamp(Utc::now()));

        if let Some(status) = patch.status {
            query.push(", status = ").push_bind(status.as_str());
        }
        if let Some(amount) = patch.expected_amount_cents {
            query
                .push(", expected_amount_cents = ")
                .push_bind(amount.as_i64());
        }
        if let Some(amount) = patch.received_amount_cents {
            query
                .push(", received_amount_cents = ")
                .push_bind(amount.as_i64());
        }
        if let Some(price) = patch.contract_price_cents {
            query
                .push(", contract_price_cents = ")
                .push_bind(price.as_i64());
        }
        if let Some(bp) = patch.commission_basis_points {
            query
                .push(", commission_basis_points = ")
                .push_bind(bp.as_i64());
        }
        if let Some(bp) = patch.referral_fee_basis_points {
            query
                .push(", referral_fee_basis_points = ")
                .push_bind(bp.as_i64());
        }
        if let Some(reason) = patch.terminated_reason {
            query
                .push(", terminated_reason = ")
                .push_bind(reason.map(|r| r.as_str()));
        }
        if let Some(attribution) = patch.agent_attribution {
            query
                .push(", agent_attribution = ")
                .push_bind(attribution.as_str());
        }
        if let Some(used_afc) = patch.used_afc {
            query.push(", used_afc = ").push_bind(used_afc);
        }
        if let Some(side) = patch.side {
            query.push(", side = ").push_bind(side.as_str());
        }

        query
            .push(" WHERE id = ")
            .push_bind(deal_id.as_str().to_string());

        let result = query.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_deal(deal_id).await
    }

    /// Delete a deal.
    ///
    /// Returns false if the deal does not exist.
    pub async fn delete_deal_row(&self, deal_id: &DealId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM deals WHERE id = ?")
            .bind(deal_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_raw_deal(row: &SqliteRow) -> RawDeal {
    RawDeal {
        id: Some(row.get("id")),
        referral_id: Some(row.get("referral_id")),
        status: Some(row.get("status")),
        expected_amount_cents: Some(row.get("expected_amount_cents")),
        received_amount_cents: Some(row.get("received_amount_cents")),
        contract_price_cents: row.get("contract_price_cents"),
        commission_basis_points: row.get("commission_basis_points"),
        referral_fee_basis_points: row.get("referral_fee_basis_points"),
        terminated_reason: row.get("terminated_reason"),
        agent_attribution: Some(row.get("agent_attribution")),
        used_afc: Some(row.get("used_afc")),
        side: row.get("side"),
        created_at: Some(serde_json::Value::String(row.get("created_at"))),
        updated_at: Some(serde_json::Value::String(row.get("updated_at"))),
    }
}

#[async_trait]
impl DealStore for Repository {
    async fn list_deals(&self, referral_id: &ReferralId) -> Result<Vec<RawDeal>, StoreError> {
        Ok(self.list_deals_for(referral_id).await?)
    }

    async fn create_deal(
        &self,
        referral_id: &ReferralId,
        patch: &DealPatch,
    ) -> Result<RawDeal, StoreError> {
        if self.get_referral(referral_id).await?.is_none() {
            return Err(StoreError::NotFound(format!("referral {}", referral_id)));
        }
        let deal = self.insert_deal(referral_id, patch).await?;
        Ok(RawDeal::from(&deal))
    }

    async fn update_deal(
        &self,
        deal_id: &DealId,
        patch: &DealPatch,
    ) -> Result<RawDeal, StoreError> {
        self.update_deal_fields(deal_id, patch)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("deal {}", deal_id)))
    }

    async fn delete_deal(&self, deal_id: &DealId) -> Result<(), StoreError> {
        if self.delete_deal_row(deal_id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("deal {}", deal_id)))
        }
    }
}
