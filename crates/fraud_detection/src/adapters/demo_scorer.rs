// Rust guideline compliant 2026-10-19

//! Demo adapter for the `Scorer` port.
//!
//! A linear log-odds classifier over standardized features, so each
//! attribution is exactly `weight * z` and they sum to the logit minus the
//! intercept. The anomaly score is the mean squared z-score, which behaves
//! like an autoencoder reconstruction error on this feature set.

use std::sync::OnceLock;

use domain::{ScoredSignals, Scorer, ScorerAttribution, ScorerError, Transaction};

const MODEL_VERSION: &str = "demo-linear-1";
const INTERCEPT: f64 = -4.0;
const ANOMALY_THRESHOLD: f64 = 3.0;

/// One standardized input of the model.
#[derive(Debug, Clone, Copy)]
struct Feature {
    key: &'static str,
    label: &'static str,
    mean: f64,
    std_dev: f64,
    weight: f64,
    extract: fn(&Transaction) -> f64,
}

impl Feature {
    fn z(&self, tx: &Transaction) -> f64 {
        ((self.extract)(tx) - self.mean) / self.std_dev
    }
}

fn feature_table() -> Vec<Feature> {
    vec![
        Feature {
            key: "amount_vs_avg_ratio",
            label: "Amount vs 7-day average",
            mean: 0.0,
            std_dev: 0.6,
            weight: 0.9,
            extract: |tx| tx.amount_vs_avg_ratio.max(0.01).ln(),
        },
        Feature {
            key: "amount",
            label: "Transaction amount",
            mean: 7.0,
            std_dev: 1.2,
            weight: 0.5,
            extract: |tx| tx.amount.max(0.0).ln_1p(),
        },
        Feature {
            key: "distance_from_home_km",
            label: "Distance from home",
            mean: 60.0,
            std_dev: 150.0,
            weight: 0.6,
            extract: |tx| tx.distance_from_home_km,
        },
        Feature {
            key: "device_mismatch",
            label: "Unrecognised device",
            mean: 0.05,
            std_dev: 0.22,
            weight: 0.5,
            extract: |tx| f64::from(u8::from(tx.device_mismatch)),
        },
        Feature {
            key: "is_night",
            label: "Night-time activity",
            mean: 0.15,
            std_dev: 0.36,
            weight: 0.4,
            extract: |tx| f64::from(u8::from(tx.calendar.is_night)),
        },
        Feature {
            key: "card_age_days",
            label: "Card age",
            mean: 700.0,
            std_dev: 500.0,
            weight: -0.3,
            extract: |tx| f64::from(tx.card_age_days),
        },
        Feature {
            key: "daily_txn_count",
            label: "Transactions today",
            mean: 2.5,
            std_dev: 2.0,
            weight: 0.35,
            extract: |tx| f64::from(tx.daily_txn_count),
        },
    ]
}

/// Concrete adapter for the `domain::Scorer` port.
///
/// Starts unloaded; [`Scorer::load`] installs the feature table once.
#[derive(Debug, Default)]
pub struct DemoScorer {
    features: OnceLock<Vec<Feature>>,
}

impl DemoScorer {
    /// Create an unloaded scorer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scorer for DemoScorer {
    async fn load(&self) -> Result<(), ScorerError> {
        let features = self.features.get_or_init(feature_table);
        if features.iter().any(|f| !f.std_dev.is_finite() || f.std_dev <= 0.0) {
            return Err(ScorerError::LoadFailed { reason: "feature with non-positive deviation".to_owned() });
        }
        tracing::info!(version = MODEL_VERSION, features = features.len(), "demo_scorer.loaded");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.features.get().is_some()
    }

    #[expect(clippy::cast_precision_loss, reason = "the feature table has a handful of entries")]
    async fn evaluate(&self, transaction: &Transaction) -> Result<ScoredSignals, ScorerError> {
        let features = self.features.get().ok_or(ScorerError::NotLoaded)?;

        let mut logit = INTERCEPT;
        let mut squared = 0.0;
        let mut attributions = Vec::with_capacity(features.len());
        for feature in features {
            let z = feature.z(transaction);
            let contribution = feature.weight * z;
            logit += contribution;
            squared += z * z;
            attributions.push(ScorerAttribution {
                feature: feature.key.to_owned(),
                label: feature.label.to_owned(),
                contribution,
            });
        }
        if !logit.is_finite() {
            return Err(ScorerError::EvaluationFailed {
                reason: format!("non-finite logit for {}", transaction.id),
            });
        }
        attributions.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

        let classifier_prob = 1.0 / (1.0 + (-logit).exp());
        let anomaly_score = squared / features.len() as f64;
        tracing::trace!(transaction_id = %transaction.id, classifier_prob, anomaly_score, "demo_scorer.evaluated");
        Ok(ScoredSignals {
            classifier_prob,
            anomaly_score,
            anomaly_threshold: ANOMALY_THRESHOLD,
            attributions,
            model_version: MODEL_VERSION.to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
