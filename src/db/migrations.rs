//! Referral and deal tables, applied on every startup.
//!
//! `schema.sql` only uses `IF NOT EXISTS` statements, so re-running it
//! against an existing ledger is a no-op.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

/// Per-connection settings. `foreign_keys` drives the referral -> deal
/// cascade and must be set on every connection, not once per file.
const CONNECTION_PRAGMAS: &[&str] = &["PRAGMA foreign_keys = ON", "PRAGMA busy_timeout = 5000"];

/// Open (or create) the ledger database and bring its schema up to date.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .after_connect(|conn, _meta| Box::pin(async move { prepare_connection(conn).await }))
        .connect(&format!("sqlite:{}?mode=rwc", db_path))
        .await?;

    let applied = apply_schema(&pool).await?;
    info!(path = %db_path, statements = applied, "Ledger database ready");
    Ok(pool)
}

/// Statements in `schema.sql`, in file order.
fn schema_statements() -> impl Iterator<Item = &'static str> {
    SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty())
}

async fn apply_schema(pool: &SqlitePool) -> Result<usize, sqlx::Error> {
    let mut applied = 0;
    for statement in schema_statements() {
        sqlx::query(statement).execute(pool).await?;
        applied += 1;
    }
    debug!(statements = applied, "Schema applied");
    Ok(applied)
}

async fn prepare_connection(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for pragma in CONNECTION_PRAGMAS {
        sqlx::query(pragma).execute(&mut *conn).await?;
    }

    // WAL lets the dashboard read while a deal write is open. SQLite reports
    // the mode it actually picked, which can differ on some filesystems.
    let mode: String = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?
        .get(0);
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&mut *conn)
        .await?;
    debug!(journal_mode = %mode, "Connection prepared");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn ledger() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (temp_dir, pool)
    }

    async fn seed_referral(pool: &SqlitePool, id: &str) {
        sqlx::query(
            "INSERT INTO referrals (id, created_at, updated_at) VALUES (?, '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seed_deal(pool: &SqlitePool, id: &str, referral_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO deals (id, referral_id, status, created_at, updated_at) VALUES (?, ?, 'under_contract', '2024-01-01T00:00:00.000Z', '2024-01-01T00:00:00.000Z')",
        )
        .bind(id)
        .bind(referral_id)
        .execute(pool)
        .await
        .map(|_| ())
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
        n
    }

    #[test]
    fn test_schema_has_tables_and_indexes() {
        let statements: Vec<_> = schema_statements().collect();
        assert_eq!(statements.len(), 4);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS referrals"));
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS deals"));
    }

    #[tokio::test]
    async fn test_ledger_tables_and_indexes_exist() {
        let (_dir, pool) = ledger().await;

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["deals", "referrals"]);

        let indexes: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='index' AND tbl_name='deals' AND name LIKE 'idx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<&str> = indexes.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(names, vec!["idx_deals_referral_created", "idx_deals_status"]);
    }

    #[tokio::test]
    async fn test_deal_defaults() {
        let (_dir, pool) = ledger().await;
        seed_referral(&pool, "r1").await;
        seed_deal(&pool, "d1", "r1").await.unwrap();

        let row = sqlx::query(
            "SELECT expected_amount_cents, received_amount_cents, agent_attribution, used_afc, terminated_reason FROM deals WHERE id = 'd1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row.get::<i64, _>(0), 0);
        assert_eq!(row.get::<i64, _>(1), 0);
        assert_eq!(row.get::<String, _>(2), "");
        assert!(!row.get::<bool, _>(3));
        assert_eq!(row.get::<Option<String>, _>(4), None);

        let status: (String,) = sqlx::query_as("SELECT status FROM referrals WHERE id = 'r1'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status.0, "new");
    }

    #[tokio::test]
    async fn test_reapplying_schema_keeps_data() {
        let (_dir, pool) = ledger().await;
        seed_referral(&pool, "r1").await;
        seed_deal(&pool, "d1", "r1").await.unwrap();

        assert_eq!(apply_schema(&pool).await.unwrap(), 4);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM deals").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM referrals").await, 1);
    }

    #[tokio::test]
    async fn test_deal_requires_existing_referral() {
        let (_dir, pool) = ledger().await;
        assert_eq!(count(&pool, "PRAGMA foreign_keys").await, 1);
        assert!(seed_deal(&pool, "d1", "ghost").await.is_err());
    }

    #[tokio::test]
    async fn test_deleting_referral_cascades_to_deals() {
        let (_dir, pool) = ledger().await;
        seed_referral(&pool, "r1").await;
        seed_referral(&pool, "r2").await;
        seed_deal(&pool, "d1", "r1").await.unwrap();
        seed_deal(&pool, "d2", "r2").await.unwrap();

        sqlx::query("DELETE FROM referrals WHERE id = 'r1'")
            .execute(&pool)
            .await
            .unwrap();
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM deals").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM deals WHERE id = 'd2'").await, 1);
    }
}
