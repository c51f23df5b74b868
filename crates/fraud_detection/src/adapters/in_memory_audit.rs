// Rust guideline compliant 2026-10-19

//! In-memory adapter for the `AuditSink` and `AuditReader` ports.
//!
//! Used when no database URL is configured. Returns
//! `StorageError::CapacityExceeded` once `capacity` rows are held.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{TimeDelta, Utc};
use domain::{
    Action, AuditReader, AuditRecord, AuditSink, AuditStats, StorageError, TrendBucket,
    UserRiskProfile, trend_buckets,
};

#[derive(Debug, Default)]
struct Tables {
    rows: Vec<AuditRecord>,
    profiles: HashMap<u32, UserRiskProfile>,
}

/// Audit rows and user profiles behind a single lock, so an append updates
/// both or neither.
#[derive(Debug)]
pub struct InMemoryAudit {
    tables: Mutex<Tables>,
    capacity: usize,
}

impl InMemoryAudit {
    /// Create an empty store holding at most `capacity` rows.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { tables: Mutex::new(Tables::default()), capacity }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.tables
            .lock()
            .map_err(|_poisoned| StorageError::Unavailable { reason: "audit lock poisoned".to_owned() })
    }
}

impl AuditSink for InMemoryAudit {
    async fn append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        let mut tables = self.lock()?;
        if tables.rows.len() >= self.capacity {
            return Err(StorageError::CapacityExceeded { capacity: self.capacity });
        }
        let user_id = record.transaction.user_id;
        let score = record.assessment.score;
        let blocked = record.assessment.action == Action::Block;
        let profile = match tables.profiles.get(&user_id) {
            Some(current) => current.absorb(score, blocked, record.recorded_at),
            None => UserRiskProfile::first(user_id, score, blocked, record.recorded_at),
        };
        tables.profiles.insert(user_id, profile);
        tables.rows.push(record.clone());
        Ok(())
    }
}

impl AuditReader for InMemoryAudit {
    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, StorageError> {
        Ok(self.lock()?.rows.iter().rev().take(limit).cloned().collect())
    }

    async fn stats(&self) -> Result<AuditStats, StorageError> {
        let tables = self.lock()?;
        let (mut blocked, mut challenged, mut allowed, mut sum) = (0, 0, 0, 0.0);
        for row in &tables.rows {
            match row.assessment.action {
                Action::Block => blocked += 1,
                Action::Otp => challenged += 1,
                Action::Allow => allowed += 1,
            }
            sum += row.assessment.score;
        }
        Ok(AuditStats::from_counts(blocked + challenged + allowed, blocked, challenged, allowed, sum))
    }

    async fn profile(&self, user_id: u32) -> Result<Option<UserRiskProfile>, StorageError> {
        Ok(self.lock()?.profiles.get(&user_id).cloned())
    }

    async fn trend(&self, window_hours: u32) -> Result<Vec<TrendBucket>, StorageError> {
        let since = Utc::now() - TimeDelta::hours(i64::from(window_hours));
        let tables = self.lock()?;
        Ok(trend_buckets(
            tables
                .rows
                .iter()
                .filter(|r| r.recorded_at >= since)
                .map(|r| (r.recorded_at, r.assessment.action, r.assessment.score)),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::InMemoryAudit;
    use crate::adapters::test_support::record;
    use chrono::{TimeDelta, Utc};
    use domain::{Action, AuditReader as _, AuditSink as _, StorageError};

    #[tokio::test]
    async fn append_then_read_back() {
        let store = InMemoryAudit::new(10);
        let r = record("T1", 5, 45.0, Action::Otp, Utc::now());
        store.append(&r).await.unwrap();
        assert_eq!(store.recent(5).await.unwrap(), vec![r]);
    }

    #[tokio::test]
    async fn capacity_exceeded_leaves_profile_untouched() {
        let store = InMemoryAudit::new(1);
        store.append(&record("T1", 5, 10.0, Action::Allow, Utc::now())).await.unwrap();
        let result = store.append(&record("T2", 5, 90.0, Action::Block, Utc::now())).await;

        assert!(
            matches!(result, Err(StorageError::CapacityExceeded { capacity: 1 })),
            "expected CapacityExceeded(1), got {result:?}"
        );
        let profile = store.profile(5).await.unwrap().unwrap();
        assert_eq!(profile.txn_count, 1);
        assert_eq!(profile.block_count, 0);
    }

    #[tokio::test]
    async fn stats_and_trend_agree() {
        let store = InMemoryAudit::new(10);
        let now = Utc::now();
        store.append(&record("T1", 1, 80.0, Action::Block, now)).await.unwrap();
        store.append(&record("T2", 2, 20.0, Action::Allow, now)).await.unwrap();
        store.append(&record("OLD", 3, 60.0, Action::Otp, now - TimeDelta::hours(48))).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!((stats.total, stats.blocked, stats.challenged, stats.allowed), (3, 1, 1, 1));
        assert!((stats.avg_risk - 53.33).abs() < 1e-9);

        let trend = store.trend(24).await.unwrap();
        assert_eq!(trend.iter().map(|b| b.total).sum::<u64>(), 2);
        assert_eq!(trend.iter().map(|b| b.blocked).sum::<u64>(), 1);
    }
}
