// Rust guideline compliant 2026-10-19

//! Shared domain types for the risk-decision pipeline.
//!
//! Defines the payment [`Transaction`], the [`RiskAssessment`] produced for it,
//! the audit read models, the live-feed [`LiveEvent`], and the hexagonal port
//! traits: [`Scorer`], [`TransactionSource`], [`NotificationChannel`],
//! [`AuditSink`], [`AuditReader`], and [`Subscriber`].
//! All pipeline components depend on this crate; no workspace crate is imported here.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Datelike as _, DurationRound as _, NaiveDateTime, Timelike as _, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// Calendar features derived from a transaction's wall-clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFlags {
    /// Hour of day, `0..=23`.
    pub hour: u32,
    /// Day of week, `0` = Monday ... `6` = Sunday.
    pub weekday: u32,
    /// Saturday or Sunday.
    pub is_weekend: bool,
    /// Hour before 06:00 or from 22:00 onwards.
    pub is_night: bool,
}

impl CalendarFlags {
    /// Derive hour, weekday, weekend and night flags from `timestamp`.
    #[must_use]
    pub fn from_timestamp(timestamp: NaiveDateTime) -> Self {
        let hour = timestamp.hour();
        let weekday = timestamp.weekday().num_days_from_monday();
        Self {
            hour,
            weekday,
            is_weekend: weekday >= 5,
            is_night: hour < 6 || hour >= 22,
        }
    }
}

/// A coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// A single payment transaction entering the pipeline.
///
/// Created once per event and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier, caller-supplied or generated.
    pub id: String,
    /// Account holder.
    pub user_id: u32,
    /// Amount in the local currency.
    pub amount: f64,
    /// Payment rail (e.g. `"UPI"`, `"Card"`).
    pub payment_type: String,
    /// Merchant category (e.g. `"Grocery"`).
    pub merchant_category: String,
    /// City where the transaction took place.
    pub city: String,
    /// Account holder's home city.
    pub home_city: String,
    /// Great-circle distance between transaction and home location, in km.
    pub distance_from_home_km: f64,
    /// Where the transaction took place, when the source knows it.
    #[serde(default)]
    pub location: Option<GeoPoint>,
    /// The account holder's home location, when the source knows it.
    #[serde(default)]
    pub home_location: Option<GeoPoint>,
    /// Device used for this transaction.
    pub device_type: String,
    /// Device the account holder normally uses.
    pub home_device: String,
    /// `true` when `device_type` differs from the usual device.
    pub device_mismatch: bool,
    /// Age of the card or account in days.
    pub card_age_days: u32,
    /// Wall-clock time at the point of sale.
    pub timestamp: NaiveDateTime,
    /// Features derived from `timestamp`.
    pub calendar: CalendarFlags,
    /// Number of transactions by this user today, including this one.
    pub daily_txn_count: u32,
    /// Rolling 7-day average amount for this user.
    pub avg_amount_7d: f64,
    /// `amount` relative to `avg_amount_7d`.
    pub amount_vs_avg_ratio: f64,
}

/// Ad-hoc transaction input, e.g. from an operator form.
///
/// Missing fields take the defaults of [`Default`]; `id` and `timestamp` are
/// filled in by [`NewTransaction::into_transaction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTransaction {
    pub id: Option<String>,
    pub user_id: u32,
    pub timestamp: Option<NaiveDateTime>,
    pub amount: f64,
    pub payment_type: String,
    pub merchant_category: String,
    pub city: String,
    pub home_city: Option<String>,
    pub distance_from_home_km: f64,
    pub location: Option<GeoPoint>,
    pub home_location: Option<GeoPoint>,
    pub device_type: String,
    pub home_device: Option<String>,
    pub device_mismatch: bool,
    pub card_age_days: u32,
    pub daily_txn_count: u32,
    pub avg_amount_7d: f64,
    pub amount_vs_avg_ratio: f64,
}

impl Default for NewTransaction {
    fn default() -> Self {
        Self {
            id: None,
            user_id: 1,
            timestamp: None,
            amount: 0.0,
            payment_type: "UPI".to_owned(),
            merchant_category: "Grocery".to_owned(),
            city: "Unknown".to_owned(),
            home_city: None,
            distance_from_home_km: 0.0,
            location: None,
            home_location: None,
            device_type: "Mobile".to_owned(),
            home_device: None,
            device_mismatch: false,
            card_age_days: 365,
            daily_txn_count: 1,
            avg_amount_7d: 1000.0,
            amount_vs_avg_ratio: 1.0,
        }
    }
}

impl NewTransaction {
    /// Build the immutable [`Transaction`].
    ///
    /// A missing id becomes `TXN-<uuid>`; a missing timestamp becomes `now`.
    /// Home city and home device default to the transaction's own values.
    #[must_use]
    pub fn into_transaction(self, now: NaiveDateTime) -> Transaction {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("TXN-{}", uuid::Uuid::new_v4().simple()));
        let timestamp = self.timestamp.unwrap_or(now);
        Transaction {
            id,
            user_id: self.user_id,
            amount: self.amount,
            payment_type: self.payment_type,
            merchant_category: self.merchant_category,
            home_city: self.home_city.unwrap_or_else(|| self.city.clone()),
            city: self.city,
            distance_from_home_km: self.distance_from_home_km,
            location: self.location,
            home_location: self.home_location,
            home_device: self.home_device.unwrap_or_else(|| self.device_type.clone()),
            device_type: self.device_type,
            device_mismatch: self.device_mismatch,
            card_age_days: self.card_age_days,
            timestamp,
            calendar: CalendarFlags::from_timestamp(timestamp),
            daily_txn_count: self.daily_txn_count,
            avg_amount_7d: self.avg_amount_7d,
            amount_vs_avg_ratio: self.amount_vs_avg_ratio,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk assessment
// ---------------------------------------------------------------------------

/// Risk tier derived from a numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// Storage and wire label (`"LOW"`, `"MEDIUM"`, `"HIGH"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

/// Enforcement action attached to a risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Allow,
    Otp,
    Block,
}

impl Action {
    /// Storage and wire label (`"ALLOW"`, `"OTP"`, `"BLOCK"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Otp => "OTP",
            Self::Block => "BLOCK",
        }
    }

    /// Parse a storage label produced by [`as_str`](Self::as_str).
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "ALLOW" => Some(Self::Allow),
            "OTP" => Some(Self::Otp),
            "BLOCK" => Some(Self::Block),
            _ => None,
        }
    }

    /// Human-readable outcome shown to operators.
    #[must_use]
    pub fn summary(self) -> &'static str {
        match self {
            Self::Allow => "Transaction approved",
            Self::Otp => "Step-up verification required (OTP)",
            Self::Block => "Transaction blocked: high fraud risk",
        }
    }
}

/// Qualitative weight of an attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Impact {
    Low,
    Medium,
    High,
}

/// Whether an attribution pushes the prediction towards or away from fraud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increases,
    Decreases,
}

/// A feature attribution as produced by a [`Scorer`], already ranked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerAttribution {
    /// Feature key (e.g. `"distance_from_home_km"`).
    pub feature: String,
    /// Human-readable label (e.g. `"Distance from home"`).
    pub label: String,
    /// Signed contribution to the classifier output.
    pub contribution: f64,
}

/// A feature attribution attached to a [`RiskAssessment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    pub feature: String,
    pub label: String,
    /// Signed contribution, rounded to 4 decimals.
    pub contribution: f64,
    pub direction: Direction,
    pub impact: Impact,
}

/// Raw output of a [`Scorer`] for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSignals {
    /// Classifier fraud probability in `[0, 1]`.
    pub classifier_prob: f64,
    /// Anomaly (reconstruction) score, `>= 0`.
    pub anomaly_score: f64,
    /// Trained anomaly threshold, `> 0`.
    pub anomaly_threshold: f64,
    /// Attributions ranked by the scorer, most important first.
    pub attributions: Vec<ScorerAttribution>,
    /// Identifier of the loaded model state.
    pub model_version: String,
}

/// A rule-based risk check that fired for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCheck {
    NightTime,
    DeviceMismatch,
    FarFromHome,
    AmountSpike,
}

/// Sub-scores that make up a fused risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub classifier_prob: f64,
    pub anomaly_score: f64,
    pub anomaly_threshold: f64,
    /// `anomaly_score > anomaly_threshold`.
    pub is_anomaly: bool,
    pub classifier_component: f64,
    pub anomaly_component: f64,
    /// Capped sum of the fired rule points.
    pub rule_component: f64,
    /// Rule checks that fired, in evaluation order.
    pub rules: Vec<RuleCheck>,
}

/// Decision for exactly one [`Transaction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Fused score in `[0, 100]`, 2 decimals.
    pub score: f64,
    pub tier: RiskTier,
    pub action: Action,
    pub signals: SignalBreakdown,
    /// Top attributions, in scorer order.
    pub attributions: Vec<Attribution>,
    /// Label of the attribution with the largest magnitude.
    pub rationale: String,
    pub model_version: String,
}

impl RiskAssessment {
    /// Human-readable outcome for the chosen action.
    #[must_use]
    pub fn summary(&self) -> &'static str {
        self.action.summary()
    }
}

// ---------------------------------------------------------------------------
// Audit read models
// ---------------------------------------------------------------------------

/// One persisted transaction + decision pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub transaction: Transaction,
    pub assessment: RiskAssessment,
    pub recorded_at: DateTime<Utc>,
}

/// Rolling per-user risk profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRiskProfile {
    pub user_id: u32,
    /// Running mean of all risk scores seen for this user.
    pub mean_risk: f64,
    pub txn_count: u64,
    pub block_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl UserRiskProfile {
    /// Profile after the user's first transaction.
    #[must_use]
    pub fn first(user_id: u32, score: f64, blocked: bool, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            mean_risk: score,
            txn_count: 1,
            block_count: u64::from(blocked),
            last_updated: at,
        }
    }

    /// Fold one more score into the profile.
    ///
    /// `mean' = (mean * count + score) / (count + 1)`.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "transaction counts stay far below 2^52")]
    pub fn absorb(&self, score: f64, blocked: bool, at: DateTime<Utc>) -> Self {
        let count = self.txn_count as f64;
        Self {
            user_id: self.user_id,
            mean_risk: (self.mean_risk * count + score) / (count + 1.0),
            txn_count: self.txn_count + 1,
            block_count: self.block_count + u64::from(blocked),
            last_updated: at,
        }
    }
}

/// Aggregate counters over all recorded decisions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub blocked: u64,
    pub challenged: u64,
    pub allowed: u64,
    /// Share of blocked decisions, percent, 2 decimals.
    pub fraud_rate: f64,
    /// Mean risk score, 2 decimals.
    pub avg_risk: f64,
}

impl AuditStats {
    /// Build stats from raw counters and the sum of all scores.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "audit row counts stay far below 2^52")]
    pub fn from_counts(total: u64, blocked: u64, challenged: u64, allowed: u64, score_sum: f64) -> Self {
        if total == 0 {
            return Self::default();
        }
        let n = total as f64;
        Self {
            total,
            blocked,
            challenged,
            allowed,
            fraud_rate: round2(blocked as f64 / n * 100.0),
            avg_risk: round2(score_sum / n),
        }
    }
}

/// Per-hour aggregate of recorded decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBucket {
    /// Start of the UTC hour.
    pub hour_start: DateTime<Utc>,
    pub total: u64,
    pub blocked: u64,
    pub avg_risk: f64,
}

/// Group `(recorded_at, action, score)` rows into hourly buckets, oldest first.
///
/// Shared by audit adapters so every store reports identical trends.
#[must_use]
#[expect(clippy::cast_precision_loss, reason = "bucket counts stay far below 2^52")]
pub fn trend_buckets<I>(rows: I) -> Vec<TrendBucket>
where
    I: IntoIterator<Item = (DateTime<Utc>, Action, f64)>,
{
    let mut buckets: BTreeMap<DateTime<Utc>, (u64, u64, f64)> = BTreeMap::new();
    for (at, action, score) in rows {
        let hour_start = at
            .duration_trunc(chrono::TimeDelta::hours(1))
            .unwrap_or(at);
        let entry = buckets.entry(hour_start).or_insert((0, 0, 0.0));
        entry.0 += 1;
        entry.1 += u64::from(action == Action::Block);
        entry.2 += score;
    }
    buckets
        .into_iter()
        .map(|(hour_start, (total, blocked, sum))| TrendBucket {
            hour_start,
            total,
            blocked,
            avg_risk: round2(sum / total as f64),
        })
        .collect()
}

/// Round to 2 decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Live feed
// ---------------------------------------------------------------------------

/// Payload fanned out to live observers for every processed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveEvent {
    pub transaction: Transaction,
    pub assessment: RiskAssessment,
    /// An OTP challenge was issued. The code itself is never published.
    pub challenge_issued: bool,
    pub processed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Kind of notification sent for a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Challenge,
    Block,
}

/// A fully rendered notification, ready for any channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub kind: NoticeKind,
    pub transaction_id: String,
    /// HTML-formatted body for chat-bot channels.
    pub rich: String,
    /// Short plain-text body for SMS-style channels.
    pub plain: String,
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Errors from the [`Scorer`] port.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScorerError {
    /// `evaluate` was called before a successful `load`.
    #[error("scorer not loaded")]
    NotLoaded,
    /// Model state could not be loaded.
    #[error("load failed: {reason}")]
    LoadFailed {
        /// Human-readable description.
        reason: String,
    },
    /// Scoring could not be completed.
    #[error("evaluation failed: {reason}")]
    EvaluationFailed {
        /// Human-readable description.
        reason: String,
    },
    /// The scorer produced values outside their contract.
    #[error("invalid scorer output: {reason}")]
    InvalidOutput {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the [`TransactionSource`] port.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// The source has no more transactions.
    #[error("transaction source exhausted")]
    Exhausted,
    /// A transaction could not be produced.
    #[error("generation failed: {reason}")]
    GenerationFailed {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the [`NotificationChannel`] port.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    /// Channel credentials or endpoint are missing.
    #[error("channel not configured")]
    NotConfigured,
    /// The remote service refused the message.
    #[error("rejected: {reason}")]
    Rejected {
        /// Human-readable description.
        reason: String,
    },
    /// The message could not reach the remote service.
    #[error("transport error: {reason}")]
    Transport {
        /// Human-readable description.
        reason: String,
    },
    /// The attempt exceeded the configured timeout.
    #[error("timed out after {millis} ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        millis: u128,
    },
}

/// Errors from the [`AuditSink`] and [`AuditReader`] ports.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    /// The store is full.
    #[error("storage capacity exceeded (capacity: {capacity})")]
    CapacityExceeded {
        /// Maximum number of rows.
        capacity: usize,
    },
    /// The store could not be reached or rejected the operation.
    #[error("storage unavailable: {reason}")]
    Unavailable {
        /// Human-readable description.
        reason: String,
    },
    /// A stored row could not be decoded.
    #[error("corrupt audit row: {reason}")]
    Corrupt {
        /// Human-readable description.
        reason: String,
    },
}

/// Errors from the [`Subscriber`] port.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The observer's transport is gone.
    #[error("subscriber closed")]
    Closed,
    /// The observer did not accept the event in time.
    #[error("subscriber timed out")]
    TimedOut,
    /// Any other write failure.
    #[error("delivery failed: {reason}")]
    Failed {
        /// Human-readable description.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Ports
//
// Futures are spelled out as `impl Future + Send` so that the pipeline can
// drive them from spawned tasks on a multi-threaded runtime. Implementations
// may still use `async fn`.
// ---------------------------------------------------------------------------

/// Hexagonal port: the statistical scoring collaborator.
///
/// Constructed explicitly and injected; `load` must succeed before `evaluate`.
/// `evaluate` is deterministic for identical input and loaded state.
pub trait Scorer: Send + Sync {
    /// Load model state. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `ScorerError::LoadFailed` when the model state is unusable.
    fn load(&self) -> impl Future<Output = Result<(), ScorerError>> + Send;

    /// `true` once `load` has succeeded.
    fn is_ready(&self) -> bool;

    /// Score one transaction.
    ///
    /// # Errors
    ///
    /// Returns `ScorerError::NotLoaded` before `load`, or
    /// `ScorerError::EvaluationFailed` when scoring fails.
    fn evaluate(
        &self,
        transaction: &Transaction,
    ) -> impl Future<Output = Result<ScoredSignals, ScorerError>> + Send;
}

/// Hexagonal port: the transaction generator collaborator.
pub trait TransactionSource: Send + Sync {
    /// Produce the next transaction, optionally forcing a high-risk profile.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when no transaction can be produced.
    fn next(
        &self,
        force_high_risk: bool,
    ) -> impl Future<Output = Result<Transaction, SourceError>> + Send;
}

/// Hexagonal port: one notification delivery channel (chat bot, SMS, e-mail).
pub trait NotificationChannel: Send + Sync {
    /// Short channel name used in logs (e.g. `"telegram"`).
    fn name(&self) -> &str;

    /// Deliver a rendered message.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] when delivery fails.
    fn send(
        &self,
        message: &RenderedMessage,
    ) -> impl Future<Output = Result<(), ChannelError>> + Send;
}

/// Hexagonal port: the write side of the audit store.
pub trait AuditSink: Send + Sync {
    /// Persist `record` and fold its score into the user's risk profile.
    ///
    /// Both effects happen atomically: either the row and the profile update
    /// are committed together, or neither is.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when nothing was committed.
    fn append(&self, record: &AuditRecord) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Hexagonal port: the read side of the audit store.
pub trait AuditReader: Send + Sync {
    /// Most recent records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on read failure.
    fn recent(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AuditRecord>, StorageError>> + Send;

    /// Aggregate counters over all records.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on read failure.
    fn stats(&self) -> impl Future<Output = Result<AuditStats, StorageError>> + Send;

    /// Risk profile of `user_id`, if any transaction was recorded for it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on read failure.
    fn profile(
        &self,
        user_id: u32,
    ) -> impl Future<Output = Result<Option<UserRiskProfile>, StorageError>> + Send;

    /// Hourly aggregates over the last `window_hours` hours, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on read failure.
    fn trend(
        &self,
        window_hours: u32,
    ) -> impl Future<Output = Result<Vec<TrendBucket>, StorageError>> + Send;
}

/// Hexagonal port: one live observer of processed decisions.
pub trait Subscriber: Send + Sync {
    /// Deliver one event as a single unit.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the observer can no longer receive events.
    fn deliver(&self, event: Arc<LiveEvent>) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
