// Rust guideline compliant 2026-10-19

//! Transport-agnostic request surface over the pipeline.
//!
//! Every request an HTTP or WebSocket layer would expose maps to one method
//! on [`RiskService`]; authentication and rate limiting belong to that layer.

use crate::stream::{StreamConfig, StreamControl, StreamDriver};
use crate::{Decision, Pipeline, PipelineError};
use broadcast::{HubError, SubscriberId};
use chrono::Local;
use domain::{
    AuditReader, AuditRecord, AuditSink, AuditStats, NewTransaction, NotificationChannel, Scorer,
    SourceError, StorageError, Subscriber, TransactionSource, TrendBucket, UserRiskProfile,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Window of the dashboard trend, in hours.
const TREND_WINDOW_HOURS: u32 = 24;

/// Errors returned by [`RiskService`] requests.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServiceError {
    /// The transaction could not be scored.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The synthetic source produced no transaction.
    #[error("transaction source failed: {0}")]
    Source(#[from] SourceError),
    /// An audit read failed.
    #[error("audit store failed: {0}")]
    Storage(#[from] StorageError),
    /// The live feed refused a subscriber.
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Aggregate counters plus the hourly trend of the last 24 hours.
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub stats: AuditStats,
    pub trend: Vec<TrendBucket>,
}

/// Answer to an OTP verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpVerification {
    pub transaction_id: String,
    pub verified: bool,
    pub message: String,
}

struct Inner<S, A, C, B, G> {
    pipeline: Pipeline<S, A, C, B>,
    store: Arc<A>,
    source: G,
}

impl<S, A, C, B, G> Inner<S, A, C, B, G>
where
    S: Scorer,
    A: AuditSink + AuditReader,
    C: NotificationChannel + 'static,
    B: Subscriber,
    G: TransactionSource,
{
    async fn generate_and_process(&self, force_high_risk: bool) -> Result<Decision, ServiceError> {
        let tx = self.source.next(force_high_risk).await?;
        Ok(self.pipeline.process(tx).await?)
    }

    async fn stream_tick(&self, force_high_risk: bool) {
        match self.generate_and_process(force_high_risk).await {
            Ok(decision) => {
                for warning in &decision.warnings {
                    tracing::warn!(transaction_id = %decision.transaction.id, %warning, "stream.degraded");
                }
            }
            Err(e) => tracing::error!(error = %e, "stream.tick_failed"),
        }
    }
}

/// The request facade: ad-hoc scoring, read side, OTP verification, stream
/// control and the live feed.
pub struct RiskService<S, A, C, B, G> {
    inner: Arc<Inner<S, A, C, B, G>>,
    stream: StreamDriver,
    maintenance: CancellationToken,
    tasks: TaskTracker,
}

impl<S, A, C, B, G> fmt::Debug for RiskService<S, A, C, B, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskService")
            .field("pipeline", &self.inner.pipeline)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl<S, A, C, B, G> RiskService<S, A, C, B, G>
where
    S: Scorer + 'static,
    A: AuditSink + AuditReader + 'static,
    C: NotificationChannel + 'static,
    B: Subscriber + 'static,
    G: TransactionSource + 'static,
{
    /// Create a service. `store` must be the sink behind the pipeline's
    /// audit recorder so that reads observe the pipeline's writes.
    #[must_use]
    pub fn new(pipeline: Pipeline<S, A, C, B>, store: Arc<A>, source: G) -> Self {
        Self {
            inner: Arc::new(Inner { pipeline, store, source }),
            stream: StreamDriver::new(),
            maintenance: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// The underlying pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline<S, A, C, B> {
        &self.inner.pipeline
    }

    // -- scoring ------------------------------------------------------------

    /// Score an operator-supplied transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Pipeline`] when the transaction could not be scored.
    pub async fn submit(&self, input: NewTransaction) -> Result<Decision, ServiceError> {
        let tx = input.into_transaction(Local::now().naive_local());
        Ok(self.inner.pipeline.process(tx).await?)
    }

    /// Generate and score one high-risk synthetic transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Source`] or [`ServiceError::Pipeline`].
    pub async fn inject(&self) -> Result<Decision, ServiceError> {
        self.inner.generate_and_process(true).await
    }

    /// Generate and score one random synthetic transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Source`] or [`ServiceError::Pipeline`].
    pub async fn simulate(&self) -> Result<Decision, ServiceError> {
        self.inner.generate_and_process(false).await
    }

    // -- read side ----------------------------------------------------------

    /// Most recent decisions, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Storage`] on read failure.
    pub async fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, ServiceError> {
        Ok(self.inner.store.recent(limit).await?)
    }

    /// Aggregate counters and the last 24 hours of hourly buckets.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Storage`] on read failure.
    pub async fn dashboard(&self) -> Result<Dashboard, ServiceError> {
        let (stats, trend) = tokio::join!(self.inner.store.stats(), self.inner.store.trend(TREND_WINDOW_HOURS));
        Ok(Dashboard { stats: stats?, trend: trend? })
    }

    /// Rolling risk profile of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Storage`] on read failure.
    pub async fn profile(&self, user_id: u32) -> Result<Option<UserRiskProfile>, ServiceError> {
        Ok(self.inner.store.profile(user_id).await?)
    }

    // -- challenge ----------------------------------------------------------

    /// Check a submitted OTP. Mismatch, expiry and absence all answer `false`.
    pub fn verify_otp(&self, transaction_id: &str, code: &str) -> OtpVerification {
        let verified = self.inner.pipeline.otp().verify(transaction_id, code).is_verified();
        let message = if verified { "Transaction approved" } else { "Invalid OTP. Transaction blocked" };
        OtpVerification { transaction_id: transaction_id.to_owned(), verified, message: message.to_owned() }
    }

    /// Remove expired challenges every `every` until [`shutdown`](Self::shutdown).
    pub fn spawn_otp_sweeper(&self, every: Duration) {
        let inner = Arc::clone(&self.inner);
        let cancel = self.maintenance.child_token();
        self.tasks.spawn(async move { inner.pipeline.otp().run_sweeper(every, cancel).await });
    }

    // -- stream -------------------------------------------------------------

    /// Start generating and scoring synthetic transactions.
    pub fn start_stream(&self, config: StreamConfig) -> StreamControl {
        let inner = Arc::clone(&self.inner);
        let force = config.force_high_risk;
        self.stream.start(config.interval, move || {
            let inner = Arc::clone(&inner);
            async move { inner.stream_tick(force).await }
        })
    }

    /// Stop the stream before its next tick.
    pub fn stop_stream(&self) -> StreamControl {
        self.stream.stop()
    }

    /// `true` while the stream is running.
    #[must_use]
    pub fn stream_running(&self) -> bool {
        self.stream.is_running()
    }

    // -- live feed ----------------------------------------------------------

    /// Register a live observer.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Hub`] when the subscriber limit is reached.
    pub fn subscribe(&self, subscriber: B) -> Result<SubscriberId, ServiceError> {
        Ok(self.inner.pipeline.hub().subscribe(subscriber)?)
    }

    /// Remove a live observer. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.pipeline.hub().unsubscribe(id)
    }

    /// Number of registered live observers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.pipeline.hub().len()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Stop the stream, end maintenance tasks and drain pending notifications.
    pub async fn shutdown(&self) {
        self.stream.shutdown().await;
        self.maintenance.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.inner.pipeline.notifier().drain().await;
        tracing::info!("service.shutdown");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
