// Rust guideline compliant 2026-10-19

//! `SQLite` adapter for the `AuditSink` and `AuditReader` ports.
//!
//! Every decision is one row of `audit_log`, with the full record kept as a
//! JSON payload next to the columns the read side filters and aggregates on.
//! `user_risk_profile` holds one rolling row per user, updated in the same
//! database transaction as the audit insert.
//!
//! Timestamps are stored as RFC 3339 text with a fixed precision and a `Z`
//! suffix, so lexical order equals chronological order.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use domain::{
    Action, AuditReader, AuditRecord, AuditSink, AuditStats, StorageError, TrendBucket,
    UserRiskProfile, trend_buckets,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Pool size for file databases. In-memory databases use one connection,
/// since each connection would otherwise open its own empty database.
const FILE_POOL_SIZE: u32 = 4;

/// `AuditSink`/`AuditReader` adapter backed by a `SQLite` database via `sqlx`.
#[derive(Debug, Clone)]
pub struct SqliteAudit {
    pool: sqlx::SqlitePool,
}

impl SqliteAudit {
    /// Open or create the database at `db_url` and initialize the schema.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` when the connection or schema creation fails.
    pub async fn new(db_url: &str) -> Result<Self, sqlx::Error> {
        let opts = db_url.parse::<SqliteConnectOptions>()?.create_if_missing(true);
        let in_memory = db_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { FILE_POOL_SIZE })
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(opts)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_log (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id TEXT    NOT NULL,
                user_id        INTEGER NOT NULL,
                amount         REAL    NOT NULL,
                risk_score     REAL    NOT NULL,
                risk_level     TEXT    NOT NULL,
                action         TEXT    NOT NULL,
                recorded_at    TEXT    NOT NULL,
                payload        TEXT    NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_log_recorded_at ON audit_log (recorded_at)")
            .execute(&pool)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_risk_profile (
                user_id      INTEGER PRIMARY KEY,
                mean_risk    REAL    NOT NULL,
                txn_count    INTEGER NOT NULL,
                block_count  INTEGER NOT NULL,
                last_updated TEXT    NOT NULL
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

fn unavailable(e: sqlx::Error) -> StorageError {
    tracing::error!(error = %e, "sqlite_audit.query_failed");
    StorageError::Unavailable { reason: e.to_string() }
}

fn corrupt(reason: impl ToString) -> StorageError {
    StorageError::Corrupt { reason: reason.to_string() }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(corrupt)
}

fn count(value: i64) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(corrupt)
}

fn column(value: u64) -> Result<i64, StorageError> {
    i64::try_from(value).map_err(corrupt)
}

impl AuditSink for SqliteAudit {
    async fn append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        let tx = &record.transaction;
        let assessment = &record.assessment;
        let payload = serde_json::to_string(record).map_err(corrupt)?;
        let recorded_at = timestamp(record.recorded_at);
        let blocked = assessment.action == Action::Block;

        let mut db = self.pool.begin().await.map_err(unavailable)?;
        sqlx::query(
            "INSERT INTO audit_log
             (transaction_id, user_id, amount, risk_score, risk_level, action, recorded_at, payload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tx.id.as_str())
        .bind(i64::from(tx.user_id))
        .bind(tx.amount)
        .bind(assessment.score)
        .bind(assessment.tier.as_str())
        .bind(assessment.action.as_str())
        .bind(recorded_at.as_str())
        .bind(payload.as_str())
        .execute(&mut *db)
        .await
        .map_err(unavailable)?;

        let current: Option<(f64, i64, i64)> = sqlx::query_as(
            "SELECT mean_risk, txn_count, block_count FROM user_risk_profile WHERE user_id = ?",
        )
        .bind(i64::from(tx.user_id))
        .fetch_optional(&mut *db)
        .await
        .map_err(unavailable)?;

        let profile = match current {
            Some((mean_risk, txn_count, block_count)) => UserRiskProfile {
                user_id: tx.user_id,
                mean_risk,
                txn_count: count(txn_count)?,
                block_count: count(block_count)?,
                last_updated: record.recorded_at,
            }
            .absorb(assessment.score, blocked, record.recorded_at),
            None => UserRiskProfile::first(tx.user_id, assessment.score, blocked, record.recorded_at),
        };

        sqlx::query(
            "INSERT INTO user_risk_profile (user_id, mean_risk, txn_count, block_count, last_updated)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET
                mean_risk    = excluded.mean_risk,
                txn_count    = excluded.txn_count,
                block_count  = excluded.block_count,
                last_updated = excluded.last_updated",
        )
        .bind(i64::from(profile.user_id))
        .bind(profile.mean_risk)
        .bind(column(profile.txn_count)?)
        .bind(column(profile.block_count)?)
        .bind(recorded_at.as_str())
        .execute(&mut *db)
        .await
        .map_err(unavailable)?;

        // Dropping `db` without commit rolls both statements back.
        db.commit().await.map_err(unavailable)?;
        Ok(())
    }
}

impl AuditReader for SqliteAudit {
    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, StorageError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT payload FROM audit_log ORDER BY seq DESC LIMIT ?")
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        rows.into_iter()
            .map(|(payload,)| serde_json::from_str(&payload).map_err(corrupt))
            .collect()
    }

    async fn stats(&self) -> Result<AuditStats, StorageError> {
        let (total, blocked, challenged, allowed, sum): (i64, i64, i64, i64, f64) = sqlx::query_as(
            "SELECT COUNT(*),
                    COALESCE(SUM(action = ?), 0),
                    COALESCE(SUM(action = ?), 0),
                    COALESCE(SUM(action = ?), 0),
                    COALESCE(SUM(risk_score), 0.0)
             FROM audit_log",
        )
        .bind(Action::Block.as_str())
        .bind(Action::Otp.as_str())
        .bind(Action::Allow.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(AuditStats::from_counts(count(total)?, count(blocked)?, count(challenged)?, count(allowed)?, sum))
    }

    async fn profile(&self, user_id: u32) -> Result<Option<UserRiskProfile>, StorageError> {
        let row: Option<(f64, i64, i64, String)> = sqlx::query_as(
            "SELECT mean_risk, txn_count, block_count, last_updated FROM user_risk_profile WHERE user_id = ?",
        )
        .bind(i64::from(user_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?;

        row.map(|(mean_risk, txn_count, block_count, last_updated)| -> Result<_, StorageError> {
            Ok(UserRiskProfile {
                user_id,
                mean_risk,
                txn_count: count(txn_count)?,
                block_count: count(block_count)?,
                last_updated: parse_timestamp(&last_updated)?,
            })
        })
        .transpose()
    }

    async fn trend(&self, window_hours: u32) -> Result<Vec<TrendBucket>, StorageError> {
        let since = timestamp(Utc::now() - TimeDelta::hours(i64::from(window_hours)));
        let rows: Vec<(String, String, f64)> = sqlx::query_as(
            "SELECT recorded_at, action, risk_score FROM audit_log WHERE recorded_at >= ? ORDER BY seq",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        let mut points = Vec::with_capacity(rows.len());
        for (recorded_at, action, score) in rows {
            let action = Action::parse(&action).ok_or_else(|| corrupt(format!("unknown action {action:?}")))?;
            points.push((parse_timestamp(&recorded_at)?, action, score));
        }
        Ok(trend_buckets(points))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::SqliteAudit;
    use crate::adapters::test_support::record;
    use chrono::{TimeDelta, Utc};
    use domain::{Action, AuditReader as _, AuditSink as _, StorageError};

    // Each pool is a fresh in-memory database, so tests are isolated.
    async fn make_store() -> SqliteAudit {
        SqliteAudit::new("sqlite::memory:").await.expect("in-memory SQLite should open")
    }

    // ------------------------------------------------------------------
    // Write side
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn append_stores_row_and_payload() {
        let store = make_store().await;
        let r = record("T1", 3, 82.5, Action::Block, Utc::now());
        store.append(&r).await.unwrap();

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(store.recent(10).await.unwrap(), vec![r]);
    }

    #[tokio::test]
    async fn profile_is_a_running_mean() {
        let store = make_store().await;
        let now = Utc::now();
        store.append(&record("T1", 3, 20.0, Action::Allow, now)).await.unwrap();
        store.append(&record("T2", 3, 80.0, Action::Block, now)).await.unwrap();
        store.append(&record("T3", 3, 50.0, Action::Otp, now)).await.unwrap();

        let profile = store.profile(3).await.unwrap().unwrap();
        assert_eq!(profile.txn_count, 3);
        assert_eq!(profile.block_count, 1);
        assert!((profile.mean_risk - 50.0).abs() < 1e-9);
        assert!(store.profile(4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_pool_reports_unavailable() {
        let store = make_store().await;
        store.pool.close().await;
        let result = store.append(&record("T1", 1, 10.0, Action::Allow, Utc::now())).await;
        assert!(matches!(result, Err(StorageError::Unavailable { .. })), "{result:?}");
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn recent_is_newest_first() {
        let store = make_store().await;
        for id in ["T1", "T2", "T3"] {
            store.append(&record(id, 1, 10.0, Action::Allow, Utc::now())).await.unwrap();
        }
        let ids: Vec<String> = store
            .recent(2)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.transaction.id)
            .collect();
        assert_eq!(ids, ["T3", "T2"]);
    }

    #[tokio::test]
    async fn stats_on_empty_store_are_zero() {
        let store = make_store().await;
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert!(stats.fraud_rate.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stats_count_each_action() {
        let store = make_store().await;
        let now = Utc::now();
        store.append(&record("T1", 1, 90.0, Action::Block, now)).await.unwrap();
        store.append(&record("T2", 2, 50.0, Action::Otp, now)).await.unwrap();
        store.append(&record("T3", 3, 10.0, Action::Allow, now)).await.unwrap();
        store.append(&record("T4", 4, 11.0, Action::Allow, now)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!((stats.total, stats.blocked, stats.challenged, stats.allowed), (4, 1, 1, 2));
        assert!((stats.fraud_rate - 25.0).abs() < 1e-9);
        assert!((stats.avg_risk - 40.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn trend_skips_rows_outside_the_window() {
        let store = make_store().await;
        let now = Utc::now();
        store.append(&record("OLD", 1, 99.0, Action::Block, now - TimeDelta::hours(30))).await.unwrap();
        store.append(&record("NEW", 1, 30.0, Action::Allow, now)).await.unwrap();

        let trend = store.trend(24).await.unwrap();
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].total, 1);
        assert_eq!(trend[0].blocked, 0);
    }
}
