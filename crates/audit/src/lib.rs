// Rust guideline compliant 2026-10-19

//! Audit recorder: persists every decision through an [`AuditSink`] port.
//!
//! Entry point: [`AuditRecorder::record`].
//! Configuration via [`AuditConfig::builder`].
//!
//! Transient store failures ([`StorageError::Unavailable`]) are retried with
//! exponential backoff; any other failure is returned immediately. The caller
//! decides what an exhausted write means (the pipeline degrades to a warning).

use domain::{AuditRecord, AuditSink, StorageError};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// AuditError
// ---------------------------------------------------------------------------

/// Errors that can occur while recording.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuditError {
    /// The supplied configuration is invalid.
    #[error("invalid audit configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
    /// The record was not persisted.
    #[error("audit write failed after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the last attempt.
        source: StorageError,
    },
}

// ---------------------------------------------------------------------------
// AuditConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for an [`AuditRecorder`].
///
/// Construct via [`AuditConfig::builder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    /// Total attempts per record, first try included (range: `>= 1`).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each retry.
    pub base_backoff: Duration,
}

/// Builder for [`AuditConfig`].
#[derive(Debug)]
pub struct AuditConfigBuilder {
    max_attempts: u32,
    base_backoff: Duration,
}

impl AuditConfig {
    /// Create a builder.
    ///
    /// Default values: `max_attempts = 3`, `base_backoff = 50 ms`.
    #[must_use]
    pub fn builder() -> AuditConfigBuilder {
        AuditConfigBuilder { max_attempts: 3, base_backoff: Duration::from_millis(50) }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { max_attempts: 3, base_backoff: Duration::from_millis(50) }
    }
}

impl AuditConfigBuilder {
    /// Override the attempt budget.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Override the first retry delay.
    #[must_use]
    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidConfig`] when `max_attempts` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<AuditConfig, AuditError> {
        if self.max_attempts == 0 {
            return Err(AuditError::InvalidConfig { reason: "max_attempts must be >= 1".to_owned() });
        }
        Ok(AuditConfig { max_attempts: self.max_attempts, base_backoff: self.base_backoff })
    }
}

// ---------------------------------------------------------------------------
// AuditRecorder
// ---------------------------------------------------------------------------

/// Writes [`AuditRecord`]s to a shared [`AuditSink`], retrying transient failures.
#[derive(Debug)]
pub struct AuditRecorder<S> {
    sink: Arc<S>,
    config: AuditConfig,
}

impl<S: AuditSink> AuditRecorder<S> {
    /// Create a recorder over `sink`.
    #[must_use]
    pub fn new(sink: Arc<S>, config: AuditConfig) -> Self {
        Self { sink, config }
    }

    /// The underlying store.
    #[must_use]
    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    /// Persist `record` and its profile update.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Exhausted`] when the record could not be
    /// persisted within `max_attempts`, or at once for non-transient errors.
    pub async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let transaction_id = record.transaction.id.as_str();
        let mut backoff = self.config.base_backoff;
        let mut attempt = 1u32;
        loop {
            match self.sink.append(record).await {
                Ok(()) => {
                    tracing::debug!(transaction_id, attempt, "audit.recorded");
                    return Ok(());
                }
                Err(e @ StorageError::Unavailable { .. }) if attempt < self.config.max_attempts => {
                    tracing::warn!(transaction_id, attempt, error = %e, "audit.retry");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(transaction_id, attempt, error = %e, "audit.failed");
                    return Err(AuditError::Exhausted { attempts: attempt, source: e });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
