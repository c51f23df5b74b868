// Rust guideline compliant 2026-10-19

//! Per-transaction orchestration of the risk-decision pipeline.
//!
//! [`Pipeline::process`] runs one transaction through scoring and policy,
//! then applies the decision's side effects: an OTP challenge for medium
//! risk, a block notice for high risk, the audit write and the live-feed
//! broadcast. Only a scorer failure aborts the call; every other failure
//! degrades into a log line or a [`PipelineWarning`].
//!
//! [`StreamDriver`] repeats the pipeline on a timer and [`RiskService`] is the
//! transport-agnostic request surface wiring everything together.

mod service;
mod stream;
#[cfg(test)]
mod testing;

pub use service::{Dashboard, OtpVerification, RiskService, ServiceError};
pub use stream::{StreamConfig, StreamControl, StreamDriver, StreamError};

use assessor::{Assessor, AssessorError};
use audit::AuditRecorder;
use broadcast::BroadcastHub;
use challenge::OtpStore;
use chrono::Utc;
use domain::{
    Action, AuditRecord, AuditSink, LiveEvent, NotificationChannel, RiskAssessment, Scorer,
    Subscriber, Transaction,
};
use notifier::NotificationDispatcher;
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// PipelineError / PipelineWarning
// ---------------------------------------------------------------------------

/// Hard failure of one pipeline run. No decision was made.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The scorer failed or returned values outside its contract.
    #[error("scoring failed: {0}")]
    Scorer(#[from] AssessorError),
}

/// Degraded side effect of a run that still produced a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    /// The audit write was not persisted.
    AuditDegraded {
        /// Human-readable description.
        reason: String,
    },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuditDegraded { reason } => write!(f, "audit degraded: {reason}"),
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub transaction: Transaction,
    pub assessment: RiskAssessment,
    /// An OTP challenge was issued for this transaction.
    pub challenge_issued: bool,
    pub warnings: Vec<PipelineWarning>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Scores transactions and fans their decisions out to the side-effect
/// components.
///
/// Generic over the scorer, audit store, notification channel and live
/// subscriber adapters for static dispatch. Safe to share across tasks.
pub struct Pipeline<S, A, C, B> {
    assessor: Assessor<S>,
    otp: OtpStore,
    notifier: Arc<NotificationDispatcher<C>>,
    audit: AuditRecorder<A>,
    hub: BroadcastHub<B>,
}

impl<S, A, C, B> fmt::Debug for Pipeline<S, A, C, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("pending_challenges", &self.otp.len())
            .field("hub", &self.hub)
            .finish_non_exhaustive()
    }
}

impl<S, A, C, B> Pipeline<S, A, C, B>
where
    S: Scorer,
    A: AuditSink,
    C: NotificationChannel + 'static,
    B: Subscriber,
{
    /// Assemble a pipeline from its components.
    #[must_use]
    pub fn new(
        assessor: Assessor<S>,
        otp: OtpStore,
        notifier: NotificationDispatcher<C>,
        audit: AuditRecorder<A>,
        hub: BroadcastHub<B>,
    ) -> Self {
        Self { assessor, otp, notifier: Arc::new(notifier), audit, hub }
    }

    /// The OTP challenge store.
    #[must_use]
    pub fn otp(&self) -> &OtpStore {
        &self.otp
    }

    /// The live-feed hub.
    #[must_use]
    pub fn hub(&self) -> &BroadcastHub<B> {
        &self.hub
    }

    /// The notification dispatcher.
    #[must_use]
    pub fn notifier(&self) -> &Arc<NotificationDispatcher<C>> {
        &self.notifier
    }

    /// The assessor.
    #[must_use]
    pub fn assessor(&self) -> &Assessor<S> {
        &self.assessor
    }

    /// Decide on `tx` and apply the decision's side effects.
    ///
    /// Notifications run in the background. The audit write and the broadcast
    /// run concurrently and both complete before this returns; neither can
    /// fail the call.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Scorer`] when no assessment could be made.
    pub async fn process(&self, tx: Transaction) -> Result<Decision, PipelineError> {
        let assessment = self.assessor.assess(&tx).await?;

        let challenge_issued = match assessment.action {
            Action::Otp => {
                let code = self.otp.issue(&tx.id);
                self.notifier.notify_challenge(&tx, &assessment, &code, self.otp.validity());
                true
            }
            Action::Block => {
                self.notifier.notify_block(&tx, &assessment);
                false
            }
            Action::Allow => false,
        };

        let now = Utc::now();
        let record = AuditRecord { transaction: tx, assessment, recorded_at: now };
        let event = Arc::new(LiveEvent {
            transaction: record.transaction.clone(),
            assessment: record.assessment.clone(),
            challenge_issued,
            processed_at: now,
        });

        let (audited, published) = tokio::join!(self.audit.record(&record), self.hub.publish(event));

        let mut warnings = Vec::new();
        if let Err(e) = audited {
            warnings.push(PipelineWarning::AuditDegraded { reason: e.to_string() });
        }

        tracing::info!(
            transaction_id = %record.transaction.id,
            user_id = record.transaction.user_id,
            score = record.assessment.score,
            action = record.assessment.action.as_str(),
            challenge_issued,
            observers = published.delivered,
            degraded = !warnings.is_empty(),
            "pipeline.decided"
        );

        Ok(Decision {
            transaction: record.transaction,
            assessment: record.assessment,
            challenge_issued,
            warnings,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockScorer, fraud_tx, pipeline, quiet_tx};
    use broadcast::ChannelSubscriber;
    use domain::{AuditReader as _, NoticeKind, RiskTier, RuleCheck, ScorerError};

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn fraud_scenario_blocks_without_challenge() {
        let fixture = pipeline(MockScorer::new(0.9, 3.0));
        let (sub, mut rx) = ChannelSubscriber::channel(8);
        fixture.pipeline.hub().subscribe(sub).unwrap();

        let decision = fixture.pipeline.process(fraud_tx()).await.unwrap();

        assert!((decision.assessment.score - 94.0).abs() < 1e-9, "{}", decision.assessment.score);
        assert_eq!(decision.assessment.tier, RiskTier::High);
        assert_eq!(decision.assessment.action, Action::Block);
        assert!((decision.assessment.signals.rule_component - 15.0).abs() < 1e-9);
        assert_eq!(
            decision.assessment.signals.rules,
            vec![
                RuleCheck::NightTime,
                RuleCheck::DeviceMismatch,
                RuleCheck::FarFromHome,
                RuleCheck::AmountSpike
            ]
        );
        assert!(!decision.challenge_issued);
        assert!(decision.warnings.is_empty());
        assert!(fixture.pipeline.otp().is_empty());

        // Exactly one broadcast.
        let event = rx.recv().await.unwrap();
        assert_eq!(event.transaction.id, decision.transaction.id);
        assert!(!event.challenge_issued);
        assert!(rx.try_recv().is_err());

        // Block notice dispatched.
        fixture.pipeline.notifier().drain().await;
        let sent = fixture.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NoticeKind::Block);

        // Audited with profile update.
        assert_eq!(fixture.store.stats().await.unwrap().blocked, 1);
        let profile = fixture.store.profile(decision.transaction.user_id).await.unwrap().unwrap();
        assert_eq!(profile.block_count, 1);
    }

    #[tokio::test]
    async fn medium_risk_issues_challenge() {
        let fixture = pipeline(MockScorer::new(0.8, 0.0));

        let decision = fixture.pipeline.process(quiet_tx("T-MED")).await.unwrap();

        assert_eq!(decision.assessment.action, Action::Otp);
        assert!(decision.challenge_issued);
        assert_eq!(fixture.pipeline.otp().len(), 1);

        fixture.pipeline.notifier().drain().await;
        let sent = fixture.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, NoticeKind::Challenge);
        assert_eq!(sent[0].transaction_id, "T-MED");
    }

    #[tokio::test]
    async fn low_risk_is_allowed_silently() {
        let fixture = pipeline(MockScorer::new(0.1, 0.0));

        let decision = fixture.pipeline.process(quiet_tx("T-LOW")).await.unwrap();

        assert_eq!(decision.assessment.action, Action::Allow);
        assert!(!decision.challenge_issued);
        assert!(fixture.pipeline.otp().is_empty());
        fixture.pipeline.notifier().drain().await;
        assert!(fixture.sent.lock().unwrap().is_empty());
        assert_eq!(fixture.store.stats().await.unwrap().allowed, 1);
    }

    // ------------------------------------------------------------------
    // Failure handling
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn scorer_failure_aborts_without_side_effects() {
        let fixture = pipeline(MockScorer::failing());
        let (sub, mut rx) = ChannelSubscriber::channel(8);
        fixture.pipeline.hub().subscribe(sub).unwrap();

        let result = fixture.pipeline.process(fraud_tx()).await;

        assert!(matches!(
            result,
            Err(PipelineError::Scorer(AssessorError::Scorer(ScorerError::EvaluationFailed { .. })))
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(fixture.store.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn malformed_scorer_output_is_a_hard_failure() {
        let fixture = pipeline(MockScorer::new(f64::NAN, 0.0));
        let result = fixture.pipeline.process(quiet_tx("T-NAN")).await;
        assert!(matches!(
            result,
            Err(PipelineError::Scorer(AssessorError::Scorer(ScorerError::InvalidOutput { .. })))
        ));
    }

    #[tokio::test]
    async fn channel_failure_does_not_prevent_audit_or_broadcast() {
        let fixture = pipeline(MockScorer::new(0.9, 3.0));
        fixture.channel_fails.store(true, std::sync::atomic::Ordering::SeqCst);
        let (sub, mut rx) = ChannelSubscriber::channel(8);
        fixture.pipeline.hub().subscribe(sub).unwrap();

        let decision = fixture.pipeline.process(fraud_tx()).await.unwrap();
        fixture.pipeline.notifier().drain().await;

        assert!(decision.warnings.is_empty());
        assert_eq!(rx.recv().await.unwrap().transaction.id, decision.transaction.id);
        assert_eq!(fixture.store.stats().await.unwrap().total, 1);
        assert!(fixture.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn audit_failure_degrades_to_warning() {
        let fixture = pipeline(MockScorer::new(0.8, 0.0));
        fixture.store.set_failing(true);
        let (sub, mut rx) = ChannelSubscriber::channel(8);
        fixture.pipeline.hub().subscribe(sub).unwrap();

        let decision = fixture.pipeline.process(quiet_tx("T-AUD")).await.unwrap();

        assert!(matches!(decision.warnings.as_slice(), [PipelineWarning::AuditDegraded { .. }]));
        // Decision, challenge and broadcast still happened.
        assert_eq!(decision.assessment.action, Action::Otp);
        assert!(decision.challenge_issued);
        assert!(rx.recv().await.unwrap().challenge_issued);
    }

    #[tokio::test]
    async fn challenge_code_reaches_channel_and_verifies() {
        let fixture = pipeline(MockScorer::new(0.8, 0.0));

        fixture.pipeline.process(quiet_tx("T-OTP")).await.unwrap();
        fixture.pipeline.notifier().drain().await;

        let code = fixture.last_code().unwrap();
        assert!(fixture.pipeline.otp().verify("T-OTP", &code).is_verified());
    }
}
