// Rust guideline compliant 2026-10-19

//! One-time-passcode challenge store for medium-risk transactions.
//!
//! [`OtpStore::issue`] creates a numeric code keyed by transaction id (last
//! issuance wins); [`OtpStore::verify`] consumes it at most once. Entries
//! expire a fixed window after issuance: `verify` treats an expired entry as
//! absent, and [`OtpStore::sweep_expired`] / [`OtpStore::run_sweeper`] bound
//! memory for challenges that are never answered.
//!
//! Entries live in a sharded concurrent map, so issue/verify calls for
//! different transactions never contend on a global lock, and the
//! check-and-delete in `verify` is atomic per key.

use dashmap::DashMap;
use rand::Rng as _;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// OtpError
// ---------------------------------------------------------------------------

/// Errors raised while configuring the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    /// The supplied configuration is invalid.
    #[error("invalid otp configuration: {reason}")]
    InvalidConfig {
        /// Human-readable description of the problem.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// OtpConfig + builder
// ---------------------------------------------------------------------------

/// Runtime configuration for an [`OtpStore`].
///
/// Construct via [`OtpConfig::builder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtpConfig {
    /// Number of decimal digits per code (range: `[1, 12]`).
    pub code_length: usize,
    /// Lifetime of a challenge, measured from issuance.
    pub validity: Duration,
}

/// Builder for [`OtpConfig`].
#[derive(Debug)]
pub struct OtpConfigBuilder {
    code_length: usize,
    validity: Duration,
}

impl OtpConfig {
    /// Create a builder.
    ///
    /// Default values: `code_length = 6`, `validity = 5 min`.
    #[must_use]
    pub fn builder() -> OtpConfigBuilder {
        OtpConfigBuilder { code_length: 6, validity: Duration::from_secs(5 * 60) }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self { code_length: 6, validity: Duration::from_secs(5 * 60) }
    }
}

impl OtpConfigBuilder {
    /// Override the number of digits per code.
    #[must_use]
    pub fn code_length(mut self, digits: usize) -> Self {
        self.code_length = digits;
        self
    }

    /// Override the validity window.
    #[must_use]
    pub fn validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::InvalidConfig`] when `code_length` is outside
    /// `[1, 12]` or `validity` is zero.
    #[must_use = "the Result must be checked; use ? or unwrap"]
    pub fn build(self) -> Result<OtpConfig, OtpError> {
        if !(1..=12).contains(&self.code_length) {
            return Err(OtpError::InvalidConfig {
                reason: format!("code_length must be in [1, 12], got {}", self.code_length),
            });
        }
        if self.validity.is_zero() {
            return Err(OtpError::InvalidConfig { reason: "validity must be > 0".to_owned() });
        }
        Ok(OtpConfig { code_length: self.code_length, validity: self.validity })
    }
}

// ---------------------------------------------------------------------------
// OtpOutcome
// ---------------------------------------------------------------------------

/// Result of a verification attempt.
///
/// Only [`Verified`](Self::Verified) counts as success; the failure variants
/// exist for logging and collapse to `verified: false` at the request surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpOutcome {
    /// Code matched a live challenge, which is now consumed.
    Verified,
    /// A live challenge exists but the code differs. The challenge is kept.
    Mismatch,
    /// The challenge outlived its validity window and was discarded.
    Expired,
    /// No challenge exists (never issued, or already consumed).
    Absent,
}

impl OtpOutcome {
    /// `true` only for [`OtpOutcome::Verified`].
    #[must_use]
    pub fn is_verified(self) -> bool {
        matches!(self, Self::Verified)
    }
}

// ---------------------------------------------------------------------------
// OtpStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Challenge {
    code: String,
    issued_at: Instant,
}

/// In-process store of live OTP challenges keyed by transaction id.
#[derive(Debug)]
pub struct OtpStore {
    config: OtpConfig,
    entries: DashMap<String, Challenge>,
}

impl OtpStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: OtpConfig) -> Self {
        Self { config, entries: DashMap::new() }
    }

    /// Lifetime of each issued challenge.
    #[must_use]
    pub fn validity(&self) -> Duration {
        self.config.validity
    }

    /// Number of stored challenges, including expired ones not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no challenge is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Issue a fresh code for `transaction_id` and return it.
    ///
    /// Any earlier unconsumed code for the same id is replaced.
    pub fn issue(&self, transaction_id: &str) -> String {
        let code = self.generate_code();
        let replaced = self
            .entries
            .insert(
                transaction_id.to_owned(),
                Challenge { code: code.clone(), issued_at: Instant::now() },
            )
            .is_some();
        tracing::debug!(transaction_id, replaced, "otp.issued");
        code
    }

    /// Check `submitted` (surrounding whitespace ignored) against the live
    /// challenge for `transaction_id`.
    ///
    /// A match consumes the challenge, so at most one concurrent caller can
    /// observe [`OtpOutcome::Verified`]. A mismatch leaves a live challenge
    /// untouched; an expired one is removed and reported as expired.
    pub fn verify(&self, transaction_id: &str, submitted: &str) -> OtpOutcome {
        let submitted = submitted.trim();
        let now = Instant::now();
        let validity = self.config.validity;

        let outcome = if self
            .entries
            .remove_if(transaction_id, |_, c| !is_expired(c, now, validity) && c.code == submitted)
            .is_some()
        {
            OtpOutcome::Verified
        } else if self
            .entries
            .remove_if(transaction_id, |_, c| is_expired(c, now, validity))
            .is_some()
        {
            OtpOutcome::Expired
        } else if self.entries.contains_key(transaction_id) {
            OtpOutcome::Mismatch
        } else {
            OtpOutcome::Absent
        };

        tracing::info!(transaction_id, outcome = ?outcome, "otp.verify");
        outcome
    }

    /// Remove every expired challenge; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let validity = self.config.validity;
        let mut removed = 0usize;
        self.entries.retain(|_, c| {
            let keep = !is_expired(c, now, validity);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            tracing::debug!(removed, "otp.sweep");
        }
        removed
    }

    /// Sweep expired challenges every `every` until `cancel` fires.
    pub async fn run_sweeper(&self, every: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("otp.sweeper.stopped");
                    return;
                }
                () = tokio::time::sleep(every) => {
                    self.sweep_expired();
                }
            }
        }
    }

    fn generate_code(&self) -> String {
        let mut rng = rand::rng();
        (0..self.config.code_length)
            .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
            .collect()
    }
}

fn is_expired(challenge: &Challenge, now: Instant, validity: Duration) -> bool {
    now.saturating_duration_since(challenge.issued_at) >= validity
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::{OtpConfig, OtpError, OtpOutcome, OtpStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn store() -> OtpStore {
        OtpStore::new(OtpConfig::default())
    }

    /// A code guaranteed to differ from `code`.
    fn wrong(code: &str) -> String {
        code.chars()
            .map(|c| if c == '0' { '1' } else { '0' })
            .collect()
    }

    // ------------------------------------------------------------------
    // Config
    // ------------------------------------------------------------------

    #[test]
    fn builder_defaults() {
        let config = OtpConfig::builder().build().unwrap();
        assert_eq!(config.code_length, 6);
        assert_eq!(config.validity, Duration::from_secs(300));
        assert_eq!(config, OtpConfig::default());
    }

    #[test]
    fn builder_rejects_zero_length() {
        let result = OtpConfig::builder().code_length(0).build();
        assert!(matches!(result, Err(OtpError::InvalidConfig { .. })));
    }

    #[test]
    fn builder_rejects_zero_validity() {
        let result = OtpConfig::builder().validity(Duration::ZERO).build();
        assert!(matches!(result, Err(OtpError::InvalidConfig { .. })));
    }

    // ------------------------------------------------------------------
    // Issue
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn issued_code_is_numeric_with_configured_length() {
        let store = OtpStore::new(OtpConfig::builder().code_length(8).build().unwrap());
        let code = store.issue("T1");
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_digit()), "code {code}");
        assert_eq!(store.len(), 1);
    }

    // ------------------------------------------------------------------
    // Verify
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn correct_code_verifies_exactly_once() {
        let store = store();
        let code = store.issue("T1");
        assert_eq!(store.verify("T1", &code), OtpOutcome::Verified);
        assert_eq!(store.verify("T1", &code), OtpOutcome::Absent);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn surrounding_whitespace_is_ignored() {
        let store = store();
        let code = store.issue("T1");
        assert!(store.verify("T1", &format!("  {code}\n")).is_verified());
    }

    #[tokio::test]
    async fn mismatch_keeps_live_challenge() {
        let store = store();
        let code = store.issue("T1");
        assert_eq!(store.verify("T1", &wrong(&code)), OtpOutcome::Mismatch);
        assert_eq!(store.verify("T1", &code), OtpOutcome::Verified);
    }

    #[tokio::test]
    async fn unknown_transaction_is_absent() {
        assert_eq!(store().verify("nope", "123456"), OtpOutcome::Absent);
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let store = store();
        let first = store.issue("T1");
        let mut second = store.issue("T1");
        // Draws can coincide; reissue until the codes differ.
        while second == first {
            second = store.issue("T1");
        }
        assert_eq!(store.verify("T1", &first), OtpOutcome::Mismatch);
        assert_eq!(store.verify("T1", &second), OtpOutcome::Verified);
    }

    #[tokio::test]
    async fn challenges_are_independent_per_transaction() {
        let store = store();
        let a = store.issue("A");
        let b = store.issue("B");
        assert!(store.verify("A", &a).is_verified());
        assert!(store.verify("B", &b).is_verified());
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn code_expires_after_validity_window() {
        let store = store();
        let code = store.issue("T1");
        tokio::time::advance(Duration::from_secs(300)).await;
        assert_eq!(store.verify("T1", &code), OtpOutcome::Expired);
        // Expiry does not reset the window: the entry stays gone.
        assert_eq!(store.verify("T1", &code), OtpOutcome::Absent);
    }

    #[tokio::test(start_paused = true)]
    async fn code_is_valid_just_before_expiry() {
        let store = store();
        let code = store.issue("T1");
        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(store.verify("T1", &code).is_verified());
    }

    #[tokio::test(start_paused = true)]
    async fn wrong_code_after_expiry_reports_expired() {
        let store = store();
        let code = store.issue("T1");
        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(store.verify("T1", &wrong(&code)), OtpOutcome::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let store = store();
        store.issue("old");
        tokio::time::advance(Duration::from_secs(200)).await;
        let fresh = store.issue("fresh");
        tokio::time::advance(Duration::from_secs(150)).await;

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.verify("fresh", &fresh).is_verified());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_runs_until_cancelled() {
        let store = Arc::new(store());
        store.issue("T1");
        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            async move { store.run_sweeper(Duration::from_secs(60), cancel).await }
        });

        tokio::time::sleep(Duration::from_secs(361)).await;
        assert!(store.is_empty(), "sweeper should have removed the expired entry");

        cancel.cancel();
        task.await.unwrap();
    }

    // ------------------------------------------------------------------
    // Concurrency
    // ------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_verify_succeeds_once() {
        let store = Arc::new(store());
        let code = store.issue("T1");

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            let code = code.clone();
            handles.push(tokio::spawn(async move { store.verify("T1", &code) }));
        }

        let mut verified = 0;
        for handle in handles {
            if handle.await.unwrap().is_verified() {
                verified += 1;
            }
        }
        assert_eq!(verified, 1, "exactly one concurrent verify may succeed");
    }
}
