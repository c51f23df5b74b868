// Rust guideline compliant 2026-10-19

//! Mock adapters shared by the crate's unit tests.

use crate::Pipeline;
use assessor::{Assessor, RiskPolicy};
use audit::{AuditConfig, AuditRecorder};
use broadcast::{BroadcastHub, ChannelSubscriber, HubConfig};
use challenge::{OtpConfig, OtpStore};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use domain::{
    Action, AuditReader, AuditRecord, AuditSink, AuditStats, ChannelError, NewTransaction,
    NotificationChannel, RenderedMessage, ScoredSignals, Scorer, ScorerAttribution, ScorerError,
    SourceError, StorageError, Transaction, TransactionSource, TrendBucket, UserRiskProfile,
    trend_buckets,
};
use notifier::{NotificationDispatcher, NotifierConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const THRESHOLD: f64 = 0.05;

// ------------------------------------------------------------------
// Transactions
// ------------------------------------------------------------------

fn at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 4)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .unwrap()
}

/// Daytime, home-city, usual-device transaction: no rule fires.
pub(crate) fn quiet_tx(id: &str) -> Transaction {
    NewTransaction {
        id: Some(id.to_owned()),
        user_id: 7,
        timestamp: Some(at(14)),
        amount: 1_200.0,
        city: "Pune".to_owned(),
        ..NewTransaction::default()
    }
    .into_transaction(at(14))
}

/// Night, unknown device, 850 km from home, 190x the usual amount.
pub(crate) fn fraud_tx() -> Transaction {
    NewTransaction {
        id: Some("TXN-FRAUD".to_owned()),
        user_id: 42,
        timestamp: Some(at(2)),
        amount: 95_000.0,
        city: "Kolkata".to_owned(),
        home_city: Some("Delhi".to_owned()),
        distance_from_home_km: 850.0,
        device_type: "Desktop".to_owned(),
        home_device: Some("Mobile".to_owned()),
        device_mismatch: true,
        avg_amount_7d: 500.0,
        amount_vs_avg_ratio: 190.0,
        ..NewTransaction::default()
    }
    .into_transaction(at(2))
}

// ------------------------------------------------------------------
// Scorer
// ------------------------------------------------------------------

/// Returns fixed signals: `prob` and `anomaly_multiple` times the threshold.
#[derive(Debug)]
pub(crate) struct MockScorer {
    prob: f64,
    anomaly_multiple: f64,
    fail: bool,
}

impl MockScorer {
    pub(crate) fn new(prob: f64, anomaly_multiple: f64) -> Self {
        Self { prob, anomaly_multiple, fail: false }
    }

    pub(crate) fn failing() -> Self {
        Self { prob: 0.0, anomaly_multiple: 0.0, fail: true }
    }
}

impl Scorer for MockScorer {
    async fn load(&self) -> Result<(), ScorerError> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn evaluate(&self, _transaction: &Transaction) -> Result<ScoredSignals, ScorerError> {
        if self.fail {
            return Err(ScorerError::EvaluationFailed { reason: "model offline".to_owned() });
        }
        Ok(ScoredSignals {
            classifier_prob: self.prob,
            anomaly_score: self.anomaly_multiple * THRESHOLD,
            anomaly_threshold: THRESHOLD,
            attributions: vec![ScorerAttribution {
                feature: "amount".to_owned(),
                label: "Transaction amount".to_owned(),
                contribution: 0.42,
            }],
            model_version: "mock".to_owned(),
        })
    }
}

// ------------------------------------------------------------------
// Audit store
// ------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    rows: Vec<AuditRecord>,
    profiles: HashMap<u32, UserRiskProfile>,
}

/// Row list plus profile map behind one lock; can be switched to fail.
#[derive(Debug, Default)]
pub(crate) struct MemoryAudit {
    tables: Mutex<Tables>,
    failing: AtomicBool,
}

impl MemoryAudit {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl AuditSink for MemoryAudit {
    async fn append(&self, record: &AuditRecord) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable { reason: "disk full".to_owned() });
        }
        let mut tables = self.tables.lock().unwrap();
        let tx = &record.transaction;
        let blocked = record.assessment.action == Action::Block;
        let profile = match tables.profiles.get(&tx.user_id) {
            Some(p) => p.absorb(record.assessment.score, blocked, record.recorded_at),
            None => UserRiskProfile::first(tx.user_id, record.assessment.score, blocked, record.recorded_at),
        };
        tables.profiles.insert(tx.user_id, profile);
        tables.rows.push(record.clone());
        Ok(())
    }
}

impl AuditReader for MemoryAudit {
    async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.rows.iter().rev().take(limit).cloned().collect())
    }

    async fn stats(&self) -> Result<AuditStats, StorageError> {
        let tables = self.tables.lock().unwrap();
        let count = |action| tables.rows.iter().filter(|r| r.assessment.action == action).count() as u64;
        let sum = tables.rows.iter().map(|r| r.assessment.score).sum();
        Ok(AuditStats::from_counts(
            tables.rows.len() as u64,
            count(Action::Block),
            count(Action::Otp),
            count(Action::Allow),
            sum,
        ))
    }

    async fn profile(&self, user_id: u32) -> Result<Option<UserRiskProfile>, StorageError> {
        Ok(self.tables.lock().unwrap().profiles.get(&user_id).cloned())
    }

    async fn trend(&self, window_hours: u32) -> Result<Vec<TrendBucket>, StorageError> {
        let since = Utc::now() - chrono::TimeDelta::hours(i64::from(window_hours));
        let tables = self.tables.lock().unwrap();
        Ok(trend_buckets(
            tables
                .rows
                .iter()
                .filter(|r| r.recorded_at >= since)
                .map(|r| (r.recorded_at, r.assessment.action, r.assessment.score)),
        ))
    }
}

// ------------------------------------------------------------------
// Notification channel
// ------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct RecordingChannel {
    sent: Arc<Mutex<Vec<RenderedMessage>>>,
    fail: Arc<AtomicBool>,
}

impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &RenderedMessage) -> Result<(), ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Transport { reason: "connection reset".to_owned() });
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

// ------------------------------------------------------------------
// Transaction source
// ------------------------------------------------------------------

/// Yields [`fraud_tx`]-shaped transactions when forced, quiet ones otherwise.
#[derive(Debug, Default)]
pub(crate) struct MockSource {
    pub(crate) calls: AtomicU64,
    pub(crate) forced: AtomicU64,
}

impl TransactionSource for MockSource {
    async fn next(&self, force_high_risk: bool) -> Result<Transaction, SourceError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if force_high_risk {
            self.forced.fetch_add(1, Ordering::SeqCst);
            let mut tx = fraud_tx();
            tx.id = format!("SIM-F{n}");
            return Ok(tx);
        }
        Ok(quiet_tx(&format!("SIM-{n}")))
    }
}

// ------------------------------------------------------------------
// Assembled pipeline
// ------------------------------------------------------------------

pub(crate) type TestPipeline = Pipeline<MockScorer, MemoryAudit, RecordingChannel, ChannelSubscriber>;

pub(crate) struct Fixture {
    pub(crate) pipeline: TestPipeline,
    pub(crate) store: Arc<MemoryAudit>,
    pub(crate) sent: Arc<Mutex<Vec<RenderedMessage>>>,
    pub(crate) channel_fails: Arc<AtomicBool>,
}

impl Fixture {
    /// Code carried by the most recent challenge notice.
    pub(crate) fn last_code(&self) -> Option<String> {
        last_code(&self.sent)
    }
}

pub(crate) fn last_code(sent: &Mutex<Vec<RenderedMessage>>) -> Option<String> {
    let sent = sent.lock().unwrap();
    let plain = &sent.iter().rev().find(|m| m.plain.contains("Your OTP is "))?.plain;
    let (_, rest) = plain.split_once("Your OTP is ")?;
    Some(rest.chars().take_while(char::is_ascii_digit).collect())
}

pub(crate) fn daytime() -> NaiveDateTime {
    at(14)
}

pub(crate) fn pipeline(scorer: MockScorer) -> Fixture {
    let store = Arc::new(MemoryAudit::default());
    let sent = Arc::new(Mutex::new(Vec::new()));
    let channel_fails = Arc::new(AtomicBool::new(false));
    let channel = RecordingChannel { sent: Arc::clone(&sent), fail: Arc::clone(&channel_fails) };
    let audit_config = AuditConfig::builder()
        .max_attempts(2)
        .base_backoff(Duration::ZERO)
        .build()
        .unwrap();

    let pipeline = Pipeline::new(
        Assessor::new(scorer, RiskPolicy::default()),
        OtpStore::new(OtpConfig::default()),
        NotificationDispatcher::new(vec![channel], NotifierConfig::default()),
        AuditRecorder::new(Arc::clone(&store), audit_config),
        BroadcastHub::new(HubConfig::default()),
    );
    Fixture { pipeline, store, sent, channel_fails }
}
