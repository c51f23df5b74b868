// Rust guideline compliant 2026-10-19

//! Record builders shared by the audit adapter tests.

use chrono::{DateTime, NaiveDate, Utc};
use domain::{
    Action, AuditRecord, NewTransaction, RiskAssessment, RiskTier, SignalBreakdown,
};

pub(crate) fn record(id: &str, user_id: u32, score: f64, action: Action, at: DateTime<Utc>) -> AuditRecord {
    let when = NaiveDate::from_ymd_opt(2024, 6, 4)
        .and_then(|d| d.and_hms_opt(15, 30, 0))
        .unwrap();
    let tier = match action {
        Action::Allow => RiskTier::Low,
        Action::Otp => RiskTier::Medium,
        Action::Block => RiskTier::High,
    };
    AuditRecord {
        transaction: NewTransaction {
            id: Some(id.to_owned()),
            user_id,
            amount: 2_500.0,
            city: "Jaipur".to_owned(),
            ..NewTransaction::default()
        }
        .into_transaction(when),
        assessment: RiskAssessment {
            score,
            tier,
            action,
            signals: SignalBreakdown {
                classifier_prob: score / 100.0,
                anomaly_score: 0.01,
                anomaly_threshold: 0.05,
                is_anomaly: false,
                classifier_component: score,
                anomaly_component: 0.0,
                rule_component: 0.0,
                rules: Vec::new(),
            },
            attributions: Vec::new(),
            rationale: "unusual pattern".to_owned(),
            model_version: "test".to_owned(),
        },
        recorded_at: at,
    }
}
