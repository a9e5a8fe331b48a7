//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `mod.rs` - Referral operations
//! - `deals.rs` - Deal operations and the [`crate::store::DealStore`] impl

mod deals;

use crate::domain::{
    AgentBucket, BasisPoints, Cents, ContractTerms, Referral, ReferralId, ReferralStatus, Side,
    ValidatedContract,
};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

/// Stored timestamp format. Fixed-width so text order is time order.
pub(crate) fn timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Check the pool can serve a query.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    // =========================================================================
    // Referral operations
    // =========================================================================

    /// Insert a new referral.
    ///
    /// # Errors
    /// Returns an error if the insert fails, including on a duplicate id.
    pub async fn insert_referral(&self, referral: &Referral) -> Result<(), sqlx::Error> {
        let created_at = timestamp(referral.created_at);
        sqlx::query(
            r#"
            INSERT INTO referrals (
                id, property_address, looking_in_zip, agent_bucket, preferred_side,
                status, contract_price_cents, commission_basis_points,
                referral_fee_basis_points, referral_fee_due_cents,
                pre_approval_amount_cents, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(referral.id.as_str())
        .bind(referral.property_address.as_deref())
        .bind(referral.looking_in_zip.as_deref())
        .bind(referral.agent_bucket.map(|b| b.as_str()))
        .bind(referral.preferred_side.map(|s| s.as_str()))
        .bind(referral.status.as_str())
        .bind(referral.contract.contract_price_cents.map(|c| c.as_i64()))
        .bind(referral.contract.commission_basis_points.map(|b| b.as_i64()))
        .bind(referral.contract.referral_fee_basis_points.map(|b| b.as_i64()))
        .bind(referral.referral_fee_due_cents.map(|c| c.as_i64()))
        .bind(referral.pre_approval_amount_cents.map(|c| c.as_i64()))
        .bind(&created_at)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a referral by id.
    ///
    /// Returns None if the referral does not exist.
    pub async fn get_referral(&self, id: &ReferralId) -> Result<Option<Referral>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, property_address, looking_in_zip, agent_bucket, preferred_side,
                   status, contract_price_cents, commission_basis_points,
                   referral_fee_basis_points, referral_fee_due_cents,
                   pre_approval_amount_cents, created_at
            FROM referrals
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_referral))
    }

    /// Set a referral's pipeline status.
    ///
    /// Returns false if the referral does not exist.
    pub async fn update_referral_status(
        &self,
        id: &ReferralId,
        status: ReferralStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE referrals SET status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(timestamp(Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move a referral under contract, storing the address, the contract
    /// defaults and the fee they imply.
    ///
    /// Returns false if the referral does not exist.
    pub async fn apply_contract(
        &self,
        id: &ReferralId,
        contract: &ValidatedContract,
        fee_due: Option<Cents>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE referrals SET
                status = ?,
                property_address = ?,
                contract_price_cents = ?,
                commission_basis_points = ?,
                referral_fee_basis_points = ?,
                referral_fee_due_cents = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ReferralStatus::UnderContract.as_str())
        .bind(contract.address.as_str())
        .bind(contract.terms.contract_price_cents.map(|c| c.as_i64()))
        .bind(contract.terms.commission_basis_points.map(|b| b.as_i64()))
        .bind(contract.terms.referral_fee_basis_points.map(|b| b.as_i64()))
        .bind(fee_due.map(|c| c.as_i64()))
        .bind(timestamp(Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a pre-approval amount and move the referral to `pre_approved`.
    ///
    /// Returns false if the referral does not exist.
    pub async fn record_pre_approval(
        &self,
        id: &ReferralId,
        amount: Cents,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE referrals SET status = ?, pre_approval_amount_cents = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(ReferralStatus::PreApproved.as_str())
        .bind(amount.as_i64())
        .bind(timestamp(Utc::now()))
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Referral counts keyed by stored status string.
    pub async fn count_referrals_by_status(&self) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM referrals
            GROUP BY status
            ORDER BY status ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}

fn row_to_referral(row: &SqliteRow) -> Referral {
    let id: String = row.get("id");
    let status_str: String = row.get("status");
    let status = ReferralStatus::from_str(&status_str).unwrap_or_else(|_| {
        warn!(referral_id = %id, status = %status_str, "Unknown referral status, using new");
        ReferralStatus::New
    });
    let created_str: String = row.get("created_at");
    let created_at = DateTime::parse_from_rfc3339(&created_str)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(referral_id = %id, created_at = %created_str, error = %e, "Unparseable referral timestamp");
            DateTime::<Utc>::UNIX_EPOCH
        });

    Referral {
        property_address: row.get("property_address"),
        looking_in_zip: row.get("looking_in_zip"),
        agent_bucket: row
            .get::<Option<String>, _>("agent_bucket")
            .and_then(|s| AgentBucket::from_str(&s).ok()),
        preferred_side: row
            .get::<Option<String>, _>("preferred_side")
            .and_then(|s| Side::from_str(&s).ok()),
        status,
        contract: ContractTerms {
            contract_price_cents: row.get::<Option<i64>, _>("contract_price_cents").map(Cents),
            commission_basis_points: row
                .get::<Option<i64>, _>("commission_basis_points")
                .map(BasisPoints),
            referral_fee_basis_points: row
                .get::<Option<i64>, _>("referral_fee_basis_points")
                .map(BasisPoints),
        },
        referral_fee_due_cents: row.get::<Option<i64>, _>("referral_fee_due_cents").map(Cents),
        pre_approval_amount_cents: row
            .get::<Option<i64>, _>("pre_approval_amount_cents")
            .map(Cents),
        created_at,
        id: ReferralId::new(id),
    }
}
